//! Tiered Cache
//!
//! The cache service routes every operation to one active storage tier and
//! falls back down the priority list when that tier fails. The library cache
//! layers track and artist semantics (keys, ownership, TTL) on top.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         LibraryCache                                  │
//! │   tracks: user_<id> + owner check + TTL   artists: batched + TTL     │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                         CacheService                                  │
//! │  ┌────────────────┐   ┌────────────────┐   ┌────────────────┐        │
//! │  │ Structured     │ → │ Flat           │ → │ Memory         │        │
//! │  │ (sled trees)   │   │ (JSON file)    │   │ (DashMap)      │        │
//! │  └────────────────┘   └────────────────┘   └────────────────┘        │
//! │            Forward-only promotion on operation failure               │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

mod expiry;
mod library;
mod metrics;
mod service;

pub use expiry::{is_expired, is_expired_at, now_millis};
pub use library::{track_key, ArtistLookup, CacheStats, LibraryCache};
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use service::{CacheService, CacheServiceBuilder};

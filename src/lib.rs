//! trackcache - Multi-Tier Local Cache for Music Library Data
//!
//! Caches a user's track collection and shared artist metadata on the best
//! storage tier the host offers, degrading to simpler tiers when a better one
//! fails.
//!
//! # Architecture
//!
//! ```text
//! LibraryCache (domain keys, TTL) → CacheService (tier routing) → StorageAdapter
//! ```
//!
//! # Tiers
//!
//! - Structured: sled database with one tree per store
//! - Flat: single JSON file with prefixed keys and a size quota
//! - Memory: process-lifetime DashMap, always available
//!
//! # Modules
//!
//! - [`adapters`] - Storage tiers and event publishers implementing domain ports
//! - [`cache`] - Tiered cache service and the track/artist cache
//! - [`config`] - Configuration loading and validation
//! - [`domain`] - Domain layer with ports, events and payload types
//! - [`error`] - Error types

pub mod adapters;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;

// Re-export commonly used types
pub use cache::{ArtistLookup, CacheService, CacheStats, LibraryCache};
pub use config::{CacheConfig, StorageConfig, TtlPolicy};
pub use domain::{Artist, StorageAdapter, StorageTier, Store, Track};
pub use error::{Error, Result};

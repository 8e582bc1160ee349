//! Domain Layer
//!
//! # Architecture
//!
//! The domain layer is organized into:
//!
//! - **Ports** (`ports.rs`) - Storage and event publishing traits
//! - **Events** (`events.rs`) - Tier lifecycle events
//! - **Model** (`model.rs`) - Cached payloads and their persisted entries

pub mod events;
pub mod model;
pub mod ports;

pub use events::DomainEvent;
pub use model::{Artist, ArtistCacheEntry, Track, TrackCacheEntry};
pub use ports::{AdapterStats, EventPublisher, StorageAdapter, StorageTier, Store};

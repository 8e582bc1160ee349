//! Domain Ports (Port/Adapter Pattern)
//!
//! This module defines the abstractions the cache service depends on.
//! Storage adapters in [`crate::adapters`] implement these traits.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Cache Layer                             │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │        StorageAdapter │ EventPublisher               │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │  SledAdapter │ FlatFileAdapter │ MemoryAdapter       │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::events::DomainEvent;
use crate::error::Result;

// =============================================================================
// Value Objects
// =============================================================================

/// Named logical partition of the cache.
///
/// Stores are fixed at compile time; callers cannot create new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Store {
    /// One track collection per user
    Tracks,
    /// Artist metadata shared by every user
    Artists,
}

impl Store {
    /// Every declared store, in schema order.
    pub const ALL: [Store; 2] = [Store::Tracks, Store::Artists];

    /// Store name as used for tree names and key prefixes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Store::Tracks => "tracks",
            Store::Artists => "artists",
        }
    }
}

impl std::fmt::Display for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage tier, ordered by priority (highest first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageTier {
    /// Durable, structured, transactional
    Structured,
    /// Durable, flat key space with a size ceiling
    Flat,
    /// In-memory, process lifetime only
    #[serde(rename = "memory")]
    Volatile,
}

impl StorageTier {
    /// All tiers in probing order.
    pub const ALL: [StorageTier; 3] = [
        StorageTier::Structured,
        StorageTier::Flat,
        StorageTier::Volatile,
    ];

    /// Short name reported by diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageTier::Structured => "structured",
            StorageTier::Flat => "flat",
            StorageTier::Volatile => "memory",
        }
    }
}

impl std::fmt::Display for StorageTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-adapter operation counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdapterStats {
    /// Read operations (single, batched and full scans)
    pub reads: u64,
    /// Successful writes
    pub writes: u64,
    /// Delete operations
    pub deletes: u64,
    /// Corrupt entries removed on read
    pub purged: u64,
    /// Read transactions opened (structured tier only)
    pub transactions: u64,
}

// =============================================================================
// Storage Port
// =============================================================================

/// Key/value contract shared by every storage tier.
///
/// Values cross the boundary as JSON so payload types stay opaque to the
/// adapters. Every method reports failure through [`Result`]; `Ok(None)` on a
/// read is a legitimate miss (including a purged corrupt entry), while `Err`
/// tells the cache service to try the next tier.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Which tier this adapter implements.
    fn tier(&self) -> StorageTier;

    /// Cheap feasibility probe; no I/O beyond metadata checks.
    fn is_available(&self) -> bool;

    /// Open handles and run schema setup. Idempotent once successful.
    async fn init(&self) -> Result<()>;

    /// Read one value.
    async fn get(&self, store: Store, key: &str) -> Result<Option<Value>>;

    /// Write one value, replacing any previous one.
    async fn set(&self, store: Store, key: &str, value: Value) -> Result<()>;

    /// Remove one value. Returns whether a value existed.
    async fn delete(&self, store: Store, key: &str) -> Result<bool>;

    /// Clear one store, or every store when `store` is `None`.
    async fn clear(&self, store: Option<Store>) -> Result<()>;

    /// List keys of a store.
    async fn keys(&self, store: Store) -> Result<Vec<String>>;

    /// Read every value of a store.
    async fn get_all(&self, store: Store) -> Result<Vec<Value>>;

    /// Batched multi-get. Missing or unreadable keys are omitted.
    async fn get_many(&self, store: Store, keys: &[String]) -> Result<HashMap<String, Value>>;

    /// Push buffered writes to durable media. No-op for tiers that write
    /// through.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Operation counters.
    fn stats(&self) -> AdapterStats;
}

// =============================================================================
// Event Publishing Port
// =============================================================================

/// Port for publishing cache lifecycle events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a domain event.
    async fn publish(&self, event: DomainEvent) -> Result<()>;
}

// =============================================================================
// Tests
// =============================================================================

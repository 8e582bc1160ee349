//! Cache Service - Unified Tiered Storage
//!
//! Owns one storage adapter per tier and routes every operation to the
//! single active tier. Tiers are probed in priority order on first use; when
//! the active tier fails an operation the service retries on each lower tier
//! and promotes the first one that succeeds.
//!
//! ```text
//!   get/set/delete/keys/get_all/get_many
//!                  │
//!                  ▼
//!   ┌──────────────────────────────┐   Err    ┌───────────┐   Err    ┌──────────┐
//!   │ active tier (e.g. structured)│ ───────▶ │   flat    │ ───────▶ │  memory  │
//!   └──────────────────────────────┘          └───────────┘          └──────────┘
//!                                         Ok ⇒ promoted           Ok ⇒ promoted
//!
//!   clear ──▶ every tier concurrently
//! ```
//!
//! Promotion only moves down the priority list. The active position is an
//! atomic index advanced with `fetch_max`, so concurrent failures settle on
//! the lowest tier any of them reached.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::expiry;
use super::metrics::{CacheMetrics, MetricsSnapshot};
use crate::adapters::{FlatFileAdapter, FlatFileConfig, LoggingEventPublisher, MemoryAdapter, SledAdapter};
use crate::config::StorageConfig;
use crate::domain::events::DomainEvent;
use crate::domain::ports::{AdapterStats, EventPublisher, StorageAdapter, StorageTier, Store};
use crate::error::Result;

/// One configured tier
struct TierSlot {
    tier: StorageTier,
    adapter: Arc<dyn StorageAdapter>,
}

/// Tiered cache service
pub struct CacheService {
    /// Configured tiers in priority order; the memory tier is always last
    tiers: Vec<TierSlot>,
    /// Position in `tiers` of the active adapter, meaningful once `initialized` is set
    active: AtomicUsize,
    initialized: OnceCell<()>,
    metrics: CacheMetrics,
    events: Arc<dyn EventPublisher>,
}

impl CacheService {
    /// Build the standard tier stack from configuration.
    ///
    /// Without a `data_dir` only the memory tier is configured.
    pub fn new(storage: &StorageConfig) -> Self {
        let mut builder = Self::builder();
        if let Some(path) = storage.structured_path() {
            builder = builder.adapter(Arc::new(SledAdapter::new(path)));
        }
        if let Some(flat) = FlatFileConfig::from_storage(storage) {
            builder = builder.adapter(Arc::new(FlatFileAdapter::new(flat)));
        }
        builder.build()
    }

    /// Service with no durable tiers.
    pub fn memory_only() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> CacheServiceBuilder {
        CacheServiceBuilder::default()
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Probe tiers and select the active one. Always succeeds because the
    /// memory tier cannot fail; repeated and concurrent calls share the first
    /// probe.
    pub async fn init(&self) -> bool {
        self.ensure_initialized().await;
        true
    }

    async fn ensure_initialized(&self) -> usize {
        self.initialized.get_or_init(|| self.probe()).await;
        self.active.load(Ordering::Acquire)
    }

    async fn probe(&self) {
        let mut skipped = Vec::new();
        let last = self.tiers.len() - 1;

        for (pos, slot) in self.tiers.iter().enumerate() {
            if !slot.adapter.is_available() {
                debug!(tier = %slot.tier, "Storage tier not available");
                skipped.push(slot.tier);
                continue;
            }

            match slot.adapter.init().await {
                Ok(()) => {
                    self.active.fetch_max(pos, Ordering::AcqRel);
                    info!(tier = %slot.tier, skipped = ?skipped, "Cache storage initialized");
                    self.publish(DomainEvent::storage_initialized(slot.tier, skipped))
                        .await;
                    return;
                }
                Err(e) => {
                    warn!(tier = %slot.tier, error = %e, "Storage tier failed to initialize");
                    skipped.push(slot.tier);
                }
            }
        }

        // Only reachable if the memory tier refused to start
        self.active.fetch_max(last, Ordering::AcqRel);
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Run `op` against the active tier, falling back down the priority list.
    async fn run<'a, R, F>(&'a self, operation: &'static str, op: F) -> Option<R>
    where
        F: Fn(&'a dyn StorageAdapter) -> BoxFuture<'a, Result<R>>,
    {
        let start = self.ensure_initialized().await;
        let active = &self.tiers[start];

        match op(active.adapter.as_ref()).await {
            Ok(result) => return Some(result),
            Err(e) => {
                warn!(
                    tier = %active.tier,
                    operation,
                    capacity = e.is_capacity(),
                    error = %e,
                    "Active storage tier failed; trying lower tiers"
                );
            }
        }

        for pos in start + 1..self.tiers.len() {
            let slot = &self.tiers[pos];
            self.metrics.record_fallback_attempt();

            if !slot.adapter.is_available() {
                debug!(tier = %slot.tier, operation, "Fallback tier not available");
                continue;
            }
            if let Err(e) = slot.adapter.init().await {
                warn!(tier = %slot.tier, operation, error = %e, "Fallback tier failed to initialize");
                continue;
            }

            match op(slot.adapter.as_ref()).await {
                Ok(result) => {
                    self.promote(pos, operation).await;
                    return Some(result);
                }
                Err(e) => {
                    warn!(tier = %slot.tier, operation, error = %e, "Fallback tier failed");
                }
            }
        }

        self.metrics.record_exhausted();
        warn!(operation, "All storage tiers failed");
        self.publish(DomainEvent::fallback_exhausted(operation)).await;
        None
    }

    async fn promote(&self, pos: usize, operation: &'static str) {
        let previous = self.active.fetch_max(pos, Ordering::AcqRel);
        if previous >= pos {
            return;
        }

        let from = self.tiers[previous].tier;
        let to = self.tiers[pos].tier;
        self.metrics.record_promotion();
        info!(from = %from, to = %to, operation, "Promoted storage tier");
        self.publish(DomainEvent::tier_promoted(from, to, operation))
            .await;
    }

    async fn publish(&self, event: DomainEvent) {
        if let Err(e) = self.events.publish(event).await {
            debug!(error = %e, "Failed to publish cache event");
        }
    }

    fn decode<T: DeserializeOwned>(store: Store, key: &str, value: Value) -> Option<T> {
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(store = %store, key, error = %e, "Cached value has an unexpected shape");
                None
            }
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Read one value. `None` on a miss or when every tier failed.
    pub async fn get<T: DeserializeOwned>(&self, store: Store, key: &str) -> Option<T> {
        let value = self
            .run("get", |adapter| adapter.get(store, key))
            .await
            .flatten();

        match value.and_then(|v| Self::decode(store, key, v)) {
            Some(decoded) => {
                self.metrics.record_hit();
                Some(decoded)
            }
            None => {
                self.metrics.record_miss();
                None
            }
        }
    }

    /// Write one value. `false` when it could not be stored on any tier.
    pub async fn set<T: Serialize + ?Sized>(&self, store: Store, key: &str, value: &T) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!(store = %store, key, error = %e, "Failed to serialize cache value");
                self.metrics.record_write_failure();
                return false;
            }
        };

        let stored = self
            .run("set", |adapter| adapter.set(store, key, value.clone()))
            .await
            .is_some();

        if stored {
            self.metrics.record_write();
        } else {
            self.metrics.record_write_failure();
        }
        stored
    }

    /// Remove one value. `true` when the delete was carried out (whether or
    /// not a value existed).
    pub async fn delete(&self, store: Store, key: &str) -> bool {
        self.run("delete", |adapter| adapter.delete(store, key))
            .await
            .is_some()
    }

    /// Clear one store, or everything, on every tier at once so nothing stale
    /// survives in a tier that is not currently active.
    pub async fn clear(&self, store: Option<Store>) -> bool {
        self.ensure_initialized().await;

        join_all(self.tiers.iter().map(|slot| async move {
            if !slot.adapter.is_available() {
                return;
            }
            if let Err(e) = slot.adapter.init().await {
                debug!(tier = %slot.tier, error = %e, "Skipping clear on unopenable tier");
                return;
            }
            if let Err(e) = slot.adapter.clear(store).await {
                warn!(tier = %slot.tier, store = ?store, error = %e, "Failed to clear storage tier");
            }
        }))
        .await;

        self.publish(DomainEvent::cache_cleared(store)).await;
        true
    }

    /// Flush buffered writes on every initialized tier. Failures are logged.
    pub async fn flush(&self) {
        if self.initialized.get().is_none() {
            return;
        }
        for slot in &self.tiers {
            if let Err(e) = slot.adapter.flush().await {
                warn!(tier = %slot.tier, error = %e, "Failed to flush storage tier");
            }
        }
    }

    /// Keys of a store.
    pub async fn keys(&self, store: Store) -> Vec<String> {
        self.run("keys", |adapter| adapter.keys(store))
            .await
            .unwrap_or_default()
    }

    /// Every decodable value of a store.
    pub async fn get_all<T: DeserializeOwned>(&self, store: Store) -> Vec<T> {
        self.run("get_all", |adapter| adapter.get_all(store))
            .await
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| Self::decode(store, "*", v))
            .collect()
    }

    /// Batched read of many keys in one adapter call. Missing keys are absent
    /// from the result.
    pub async fn get_many<T: DeserializeOwned>(
        &self,
        store: Store,
        keys: &[String],
    ) -> HashMap<String, T> {
        if keys.is_empty() {
            return HashMap::new();
        }

        let found: HashMap<String, T> = self
            .run("get_many", |adapter| adapter.get_many(store, keys))
            .await
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(key, v)| Self::decode(store, &key, v).map(|decoded| (key, decoded)))
            .collect();

        for _ in 0..found.len() {
            self.metrics.record_hit();
        }
        for _ in found.len()..keys.len() {
            self.metrics.record_miss();
        }
        found
    }

    /// See [`expiry::is_expired`].
    pub fn is_expired(cached_at: Option<i64>, ttl: Duration) -> bool {
        expiry::is_expired(cached_at, ttl)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Tier currently serving requests; `None` before initialization.
    pub fn active_storage_type(&self) -> Option<StorageTier> {
        self.initialized
            .get()
            .map(|_| self.tiers[self.active.load(Ordering::Acquire)].tier)
    }

    /// Name of the active tier, or `"uninitialized"`.
    pub fn active_storage_name(&self) -> &'static str {
        self.active_storage_type()
            .map(|tier| tier.as_str())
            .unwrap_or("uninitialized")
    }

    /// Configured tiers in priority order.
    pub fn configured_tiers(&self) -> Vec<StorageTier> {
        self.tiers.iter().map(|slot| slot.tier).collect()
    }

    /// Service-level counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Per-tier adapter counters
    pub fn adapter_stats(&self) -> Vec<(StorageTier, AdapterStats)> {
        self.tiers
            .iter()
            .map(|slot| (slot.tier, slot.adapter.stats()))
            .collect()
    }
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("tiers", &self.configured_tiers())
            .field("active", &self.active_storage_type())
            .finish()
    }
}

/// Assembles a [`CacheService`] from explicit adapters.
///
/// Adapters are tried in the order of the tier each one reports, not the
/// order they were added. The memory tier is always appended as the final
/// fallback.
#[derive(Default)]
pub struct CacheServiceBuilder {
    adapters: Vec<Arc<dyn StorageAdapter>>,
    events: Option<Arc<dyn EventPublisher>>,
}

impl CacheServiceBuilder {
    /// Add a durable tier. A later adapter for the same tier replaces the
    /// earlier one.
    pub fn adapter(mut self, adapter: Arc<dyn StorageAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Destination for tier lifecycle events (defaults to logging)
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(publisher);
        self
    }

    pub fn build(self) -> CacheService {
        let mut by_tier: BTreeMap<StorageTier, Arc<dyn StorageAdapter>> = BTreeMap::new();
        for adapter in self.adapters {
            let tier = adapter.tier();
            if tier == StorageTier::Volatile {
                warn!(tier = %tier, "Ignoring adapter for the built-in memory tier");
                continue;
            }
            if by_tier.insert(tier, adapter).is_some() {
                debug!(tier = %tier, "Replaced adapter registered twice for tier");
            }
        }
        by_tier.insert(StorageTier::Volatile, Arc::new(MemoryAdapter::new()));

        let tiers = by_tier
            .into_iter()
            .map(|(tier, adapter)| TierSlot { tier, adapter })
            .collect();

        CacheService {
            tiers,
            active: AtomicUsize::new(0),
            initialized: OnceCell::new(),
            metrics: CacheMetrics::new(),
            events: self
                .events
                .unwrap_or_else(|| Arc::new(LoggingEventPublisher::new())),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

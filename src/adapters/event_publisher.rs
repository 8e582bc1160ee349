//! Tier Lifecycle Event Sinks
//!
//! [`CacheService`](crate::cache::CacheService) reports tier selection,
//! promotions, exhausted fallbacks and clears as [`DomainEvent`]s. By default
//! they go to the log; tests swap in the collector to assert on them.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::domain::events::DomainEvent;
use crate::domain::ports::EventPublisher;
use crate::error::Result;

/// Writes each event to the `tracing` log at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventPublisher;

impl LoggingEventPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        let at = event.timestamp();
        match &event {
            DomainEvent::StorageInitialized { tier, skipped, .. } => {
                debug!(%at, tier = %tier, skipped = ?skipped, "Storage initialized");
            }
            DomainEvent::TierPromoted {
                from, to, operation, ..
            } => {
                debug!(%at, from = %from, to = %to, operation = %operation, "Tier promoted");
            }
            DomainEvent::FallbackExhausted { operation, .. } => {
                debug!(%at, operation = %operation, "Fallback exhausted");
            }
            DomainEvent::CacheCleared { store, .. } => {
                let store = store.map(|s| s.as_str()).unwrap_or("all");
                debug!(%at, store, "Cache cleared");
            }
        }
        Ok(())
    }
}

/// Keeps every published event in memory, in publish order.
#[derive(Debug, Default)]
pub struct InMemoryEventCollector {
    events: RwLock<Vec<DomainEvent>>,
}

impl InMemoryEventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far.
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.read().clone()
    }

    /// Events whose [`DomainEvent::event_type`] equals `event_type`.
    pub fn events_of_type(&self, event_type: &str) -> Vec<DomainEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventCollector {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        self.events.write().push(event);
        Ok(())
    }
}

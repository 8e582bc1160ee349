//! Domain Events
//!
//! Immutable records of tier lifecycle changes inside the cache service.
//! They feed audit logs and let tests observe promotions without poking at
//! service internals.
//!
//! # Example
//!
//! ```ignore
//! let event = DomainEvent::tier_promoted(StorageTier::Structured, StorageTier::Flat, "set");
//! event_publisher.publish(event).await?;
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ports::{Store, StorageTier};

/// Domain event representing a significant occurrence in the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    /// Initialization settled on an active tier.
    StorageInitialized {
        tier: StorageTier,
        /// Tiers probed before the winner and rejected
        skipped: Vec<StorageTier>,
        timestamp: DateTime<Utc>,
    },

    /// The active tier failed and a lower tier took over.
    TierPromoted {
        from: StorageTier,
        to: StorageTier,
        operation: String,
        timestamp: DateTime<Utc>,
    },

    /// Every tier failed an operation.
    FallbackExhausted {
        operation: String,
        timestamp: DateTime<Utc>,
    },

    /// A clear was dispatched to all tiers.
    CacheCleared {
        /// `None` for a full wipe
        store: Option<Store>,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::StorageInitialized { timestamp, .. } => *timestamp,
            DomainEvent::TierPromoted { timestamp, .. } => *timestamp,
            DomainEvent::FallbackExhausted { timestamp, .. } => *timestamp,
            DomainEvent::CacheCleared { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::StorageInitialized { .. } => "StorageInitialized",
            DomainEvent::TierPromoted { .. } => "TierPromoted",
            DomainEvent::FallbackExhausted { .. } => "FallbackExhausted",
            DomainEvent::CacheCleared { .. } => "CacheCleared",
        }
    }
}

// =============================================================================
// Event Builders
// =============================================================================

impl DomainEvent {
    /// Create a StorageInitialized event.
    pub fn storage_initialized(tier: StorageTier, skipped: Vec<StorageTier>) -> Self {
        DomainEvent::StorageInitialized {
            tier,
            skipped,
            timestamp: Utc::now(),
        }
    }

    /// Create a TierPromoted event.
    pub fn tier_promoted(from: StorageTier, to: StorageTier, operation: impl Into<String>) -> Self {
        DomainEvent::TierPromoted {
            from,
            to,
            operation: operation.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a FallbackExhausted event.
    pub fn fallback_exhausted(operation: impl Into<String>) -> Self {
        DomainEvent::FallbackExhausted {
            operation: operation.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a CacheCleared event.
    pub fn cache_cleared(store: Option<Store>) -> Self {
        DomainEvent::CacheCleared {
            store,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        let event = DomainEvent::tier_promoted(StorageTier::Structured, StorageTier::Flat, "set");
        assert_eq!(event.event_type(), "TierPromoted");

        let event = DomainEvent::cache_cleared(Some(Store::Tracks));
        assert_eq!(event.event_type(), "CacheCleared");
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = DomainEvent::storage_initialized(StorageTier::Volatile, vec![StorageTier::Structured]);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "StorageInitialized");
        assert_eq!(json["tier"], "memory");
        assert_eq!(json["skipped"][0], "structured");
    }
}

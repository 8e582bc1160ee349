//! Error types for trackcache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur inside the cache tiers.
///
/// None of these escape [`crate::cache::LibraryCache`]: the cache service turns
/// every adapter failure into a fallback attempt and, at worst, a miss.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Structured tier backend error
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Adapter used before a successful `init()`
    #[error("Storage tier {tier} is not initialized")]
    NotInitialized { tier: String },

    /// Storage tier cannot be used in this environment
    #[error("Storage tier {tier} is unavailable: {reason}")]
    Unavailable { tier: String, reason: String },

    /// Value exceeds the per-value size ceiling
    #[error("Value for key {key} is {size} bytes, limit is {limit}")]
    ValueTooLarge {
        key: String,
        size: usize,
        limit: usize,
    },

    /// Write would exceed the tier's total quota
    #[error("Quota exceeded: {used} + {requested} bytes over limit of {limit}")]
    QuotaExceeded {
        used: usize,
        requested: usize,
        limit: usize,
    },

    /// On-disk schema is newer than this build understands
    #[error("Unsupported schema version {found} (supported up to {supported})")]
    SchemaVersion { found: u32, supported: u32 },

    /// Backend-specific failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures caused by running out of room in a tier.
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            Error::ValueTooLarge { .. } | Error::QuotaExceeded { .. }
        )
    }
}

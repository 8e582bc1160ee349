//! Cache configuration
//!
//! Loaded from an optional YAML file; the binary then applies CLI and
//! environment overrides on top.
//!
//! ```yaml
//! storage:
//!   data_dir: /var/lib/trackcache
//!   flat_prefix: trackcache_
//!   flat_max_value_bytes: 2097152
//! ttl:
//!   track_ttl_secs: 1800
//!   artist_ttl_secs: 86400
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Key prefix for the flat tier. Keeps our keys apart from unrelated data
/// sharing the same flat file.
pub const DEFAULT_FLAT_PREFIX: &str = "trackcache_";

/// Default per-value ceiling for the flat tier (2 MiB)
pub const DEFAULT_FLAT_MAX_VALUE_BYTES: usize = 2 * 1024 * 1024;

/// Default total quota for the flat tier (5 MiB)
pub const DEFAULT_FLAT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Default track collection TTL (30 minutes)
pub const DEFAULT_TRACK_TTL: Duration = Duration::from_secs(30 * 60);

/// Default artist metadata TTL (24 hours)
pub const DEFAULT_ARTIST_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Directory name of the structured tier inside `data_dir`
pub const STRUCTURED_DIR_NAME: &str = "structured";

/// File name of the flat tier inside `data_dir`
pub const FLAT_FILE_NAME: &str = "flat.json";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub storage: StorageConfig,
    pub ttl: TtlPolicy,
}

/// Storage tier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the durable tiers. `None` leaves only the memory tier usable.
    pub data_dir: Option<PathBuf>,
    /// Key prefix for the flat tier
    pub flat_prefix: String,
    /// Soft per-value ceiling for the flat tier
    pub flat_max_value_bytes: usize,
    /// Total quota for the flat tier
    pub flat_quota_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            flat_prefix: DEFAULT_FLAT_PREFIX.to_string(),
            flat_max_value_bytes: DEFAULT_FLAT_MAX_VALUE_BYTES,
            flat_quota_bytes: DEFAULT_FLAT_QUOTA_BYTES,
        }
    }
}

impl StorageConfig {
    /// Storage rooted at `dir`.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(dir.into()),
            ..Default::default()
        }
    }

    /// Path of the structured tier database, if durable storage is enabled.
    pub fn structured_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|d| d.join(STRUCTURED_DIR_NAME))
    }

    /// Path of the flat tier file, if durable storage is enabled.
    pub fn flat_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|d| d.join(FLAT_FILE_NAME))
    }
}

/// Time-to-live per store kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlPolicy {
    #[serde(rename = "track_ttl_secs", with = "duration_secs")]
    pub tracks: Duration,
    #[serde(rename = "artist_ttl_secs", with = "duration_secs")]
    pub artists: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            tracks: DEFAULT_TRACK_TTL,
            artists: DEFAULT_ARTIST_TTL,
        }
    }
}

impl CacheConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&raw)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: CacheConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make a tier unusable or every entry expire.
    pub fn validate(&self) -> Result<()> {
        if self.ttl.tracks.is_zero() {
            return Err(Error::Config("track TTL must be greater than zero".into()));
        }
        if self.ttl.artists.is_zero() {
            return Err(Error::Config("artist TTL must be greater than zero".into()));
        }
        if self.storage.flat_max_value_bytes == 0 {
            return Err(Error::Config(
                "flat_max_value_bytes must be greater than zero".into(),
            ));
        }
        if self.storage.flat_max_value_bytes > self.storage.flat_quota_bytes {
            return Err(Error::Config(format!(
                "flat_max_value_bytes ({}) exceeds flat_quota_bytes ({})",
                self.storage.flat_max_value_bytes, self.storage.flat_quota_bytes
            )));
        }
        if self.storage.flat_prefix.is_empty() {
            return Err(Error::Config("flat_prefix must not be empty".into()));
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert!(config.storage.data_dir.is_none());
        assert_eq!(config.storage.flat_prefix, "trackcache_");
        assert_eq!(config.ttl.tracks, Duration::from_secs(1800));
        assert_eq!(config.ttl.artists, Duration::from_secs(86400));
        config.validate().unwrap();
    }

    #[test]
    fn test_yaml_partial_override() {
        let config = CacheConfig::from_yaml_str(
            r#"
storage:
  data_dir: /tmp/trackcache
ttl:
  track_ttl_secs: 600
"#,
        )
        .unwrap();

        assert_eq!(config.storage.data_dir, Some(PathBuf::from("/tmp/trackcache")));
        assert_eq!(config.ttl.tracks, Duration::from_secs(600));
        assert_eq!(config.ttl.artists, DEFAULT_ARTIST_TTL);
        assert_eq!(
            config.storage.structured_path(),
            Some(PathBuf::from("/tmp/trackcache/structured"))
        );
        assert_eq!(
            config.storage.flat_path(),
            Some(PathBuf::from("/tmp/trackcache/flat.json"))
        );
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let err = CacheConfig::from_yaml_str("ttl:\n  artist_ttl_secs: 0\n").unwrap_err();
        assert_matches!(err, Error::Config(_));
    }

    #[test]
    fn test_value_ceiling_above_quota_rejected() {
        let mut config = CacheConfig::default();
        config.storage.flat_max_value_bytes = config.storage.flat_quota_bytes + 1;
        assert_matches!(config.validate(), Err(Error::Config(_)));
    }

    #[test]
    fn test_malformed_yaml() {
        let err = CacheConfig::from_yaml_str("ttl: [not, a, map]").unwrap_err();
        assert_matches!(err, Error::ConfigParse(_));
    }
}

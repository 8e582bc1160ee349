//! Flat Tier - Single-File Key/Value Storage
//!
//! A flat map persisted as one JSON object file. The file may be shared with
//! unrelated data, so every key we own carries the configured prefix and the
//! store name: `<prefix><store>_<key>`. Our values are JSON text held in a
//! JSON string; entries outside the prefix are carried through untouched
//! whatever their type.
//!
//! # Design
//!
//! - Synchronous file I/O behind the async adapter trait
//! - Whole-file rewrite via temp file + rename on every mutation
//! - Soft per-value ceiling and total quota, both reported as errors
//!   before anything touches disk
//! - Unparseable values under our prefix are purged on read

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::StorageConfig;
use crate::domain::ports::{AdapterStats, StorageAdapter, StorageTier, Store};
use crate::error::{Error, Result};

type FlatMap = BTreeMap<String, Value>;

/// Flat tier configuration
#[derive(Debug, Clone)]
pub struct FlatFileConfig {
    /// File holding the flat map
    pub path: PathBuf,
    /// Global key prefix
    pub prefix: String,
    /// Reject serialized values larger than this
    pub max_value_bytes: usize,
    /// Reject writes that would grow the file beyond this
    pub quota_bytes: usize,
}

impl FlatFileConfig {
    /// Build from storage config. `None` when durable storage is disabled.
    pub fn from_storage(storage: &StorageConfig) -> Option<Self> {
        storage.flat_path().map(|path| Self {
            path,
            prefix: storage.flat_prefix.clone(),
            max_value_bytes: storage.flat_max_value_bytes,
            quota_bytes: storage.flat_quota_bytes,
        })
    }
}

/// Flat-file adapter
pub struct FlatFileAdapter {
    config: FlatFileConfig,
    /// Loaded map; `None` until `init()` succeeds
    state: Mutex<Option<FlatMap>>,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    purged: AtomicU64,
}

impl FlatFileAdapter {
    /// Create a new adapter. Nothing is read until `init()`.
    pub fn new(config: FlatFileConfig) -> Self {
        Self {
            config,
            state: Mutex::new(None),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            purged: AtomicU64::new(0),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn store_prefix(&self, store: Store) -> String {
        format!("{}{}_", self.config.prefix, store.as_str())
    }

    fn full_key(&self, store: Store, key: &str) -> String {
        format!("{}{}", self.store_prefix(store), key)
    }

    fn not_initialized(&self) -> Error {
        Error::NotInitialized {
            tier: StorageTier::Flat.to_string(),
        }
    }

    /// Bytes one pair occupies in the file, escaping included.
    fn entry_size(key: &str, value: &Value) -> Result<usize> {
        // colon and comma
        Ok(serde_json::to_string(key)?.len() + serde_json::to_string(value)?.len() + 2)
    }

    /// On-disk size of the map (upper bound by the final comma).
    fn footprint(map: &FlatMap) -> Result<usize> {
        let mut total = 2;
        for (key, value) in map {
            total += Self::entry_size(key, value)?;
        }
        Ok(total)
    }

    fn load(path: &Path) -> Result<FlatMap> {
        if !path.exists() {
            return Ok(FlatMap::new());
        }

        let raw = std::fs::read_to_string(path)?;
        if raw.trim().is_empty() {
            return Ok(FlatMap::new());
        }

        match serde_json::from_str::<FlatMap>(&raw) {
            Ok(map) => Ok(map),
            Err(e) => {
                let aside = path.with_extension("json.corrupt");
                warn!(
                    path = %path.display(),
                    moved_to = %aside.display(),
                    error = %e,
                    "Flat cache file is unreadable; starting empty"
                );
                std::fs::rename(path, &aside)?;
                Ok(FlatMap::new())
            }
        }
    }

    fn persist(&self, map: &FlatMap) -> Result<()> {
        let body = serde_json::to_vec(map)?;
        let tmp = self.config.path.with_extension("json.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.config.path)?;
        Ok(())
    }

    /// Parse a stored value, purging it from `map` if it is corrupt.
    /// Returns whether the map changed.
    fn decode_or_purge(&self, map: &mut FlatMap, full_key: &str) -> (Option<Value>, bool) {
        let decoded = match map.get(full_key) {
            None => return (None, false),
            Some(Value::String(raw)) => {
                serde_json::from_str::<Value>(raw).map_err(|e| e.to_string())
            }
            Some(other) => Err(format!("expected JSON text, found {}", other)),
        };

        match decoded {
            Ok(value) => (Some(value), false),
            Err(reason) => {
                warn!(key = %full_key, reason = %reason, "Purging corrupt flat cache entry");
                map.remove(full_key);
                self.purged.fetch_add(1, Ordering::Relaxed);
                (None, true)
            }
        }
    }

    /// Write back after purges. A failed write is only logged: the value is
    /// already gone from memory and will be dropped by the next persist.
    fn persist_after_purge(&self, map: &FlatMap) {
        if let Err(e) = self.persist(map) {
            warn!(error = %e, "Failed to persist flat cache after purge");
        }
    }
}

#[async_trait]
impl StorageAdapter for FlatFileAdapter {
    fn tier(&self) -> StorageTier {
        StorageTier::Flat
    }

    fn is_available(&self) -> bool {
        if self.config.path.is_dir() {
            return false;
        }
        match self.config.path.parent() {
            Some(parent) if parent.exists() => std::fs::metadata(parent)
                .map(|m| m.is_dir() && !m.permissions().readonly())
                .unwrap_or(false),
            // Parent is created during init
            Some(_) => true,
            None => false,
        }
    }

    async fn init(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.is_some() {
            return Ok(());
        }

        if self.config.path.is_dir() {
            return Err(Error::Unavailable {
                tier: StorageTier::Flat.to_string(),
                reason: format!("{} is a directory", self.config.path.display()),
            });
        }
        if let Some(parent) = self.config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let map = Self::load(&self.config.path)?;

        // Prove the file is writable now rather than on the first set
        self.persist(&map)?;

        debug!(
            path = %self.config.path.display(),
            entries = map.len(),
            "Flat cache tier opened"
        );
        *state = Some(map);
        Ok(())
    }

    async fn get(&self, store: Store, key: &str) -> Result<Option<Value>> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock();
        let map = state.as_mut().ok_or_else(|| self.not_initialized())?;

        let full_key = self.full_key(store, key);
        let (value, purged) = self.decode_or_purge(map, &full_key);
        if purged {
            self.persist_after_purge(map);
        }
        Ok(value)
    }

    async fn set(&self, store: Store, key: &str, value: Value) -> Result<()> {
        let full_key = self.full_key(store, key);
        let serialized = serde_json::to_string(&value)?;

        if serialized.len() > self.config.max_value_bytes {
            return Err(Error::ValueTooLarge {
                key: full_key,
                size: serialized.len(),
                limit: self.config.max_value_bytes,
            });
        }

        let mut state = self.state.lock();
        let map = state.as_mut().ok_or_else(|| self.not_initialized())?;

        let stored = Value::String(serialized);
        let used = Self::footprint(map)?;
        let replaced = match map.get(&full_key) {
            Some(old) => Self::entry_size(&full_key, old)?,
            None => 0,
        };
        let requested = Self::entry_size(&full_key, &stored)?;
        if used - replaced + requested > self.config.quota_bytes {
            return Err(Error::QuotaExceeded {
                used,
                requested,
                limit: self.config.quota_bytes,
            });
        }

        let previous = map.insert(full_key.clone(), stored);
        if let Err(e) = self.persist(map) {
            match previous {
                Some(old) => map.insert(full_key, old),
                None => map.remove(&full_key),
            };
            return Err(e);
        }

        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, store: Store, key: &str) -> Result<bool> {
        self.deletes.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock();
        let map = state.as_mut().ok_or_else(|| self.not_initialized())?;

        let full_key = self.full_key(store, key);
        match map.remove(&full_key) {
            Some(old) => {
                if let Err(e) = self.persist(map) {
                    map.insert(full_key, old);
                    return Err(e);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear(&self, store: Option<Store>) -> Result<()> {
        let prefix = match store {
            Some(store) => self.store_prefix(store),
            None => self.config.prefix.clone(),
        };

        let mut state = self.state.lock();
        let map = state.as_mut().ok_or_else(|| self.not_initialized())?;

        let before = map.len();
        map.retain(|k, _| !k.starts_with(&prefix));
        if map.len() != before {
            self.persist(map)?;
        }
        Ok(())
    }

    async fn keys(&self, store: Store) -> Result<Vec<String>> {
        let prefix = self.store_prefix(store);

        let state = self.state.lock();
        let map = state.as_ref().ok_or_else(|| self.not_initialized())?;

        Ok(map
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    async fn get_all(&self, store: Store) -> Result<Vec<Value>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let prefix = self.store_prefix(store);

        let mut state = self.state.lock();
        let map = state.as_mut().ok_or_else(|| self.not_initialized())?;

        let owned: Vec<String> = map
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();

        let mut values = Vec::with_capacity(owned.len());
        let mut dirty = false;
        for full_key in owned {
            let (value, purged) = self.decode_or_purge(map, &full_key);
            dirty |= purged;
            values.extend(value);
        }
        if dirty {
            self.persist_after_purge(map);
        }
        Ok(values)
    }

    async fn get_many(&self, store: Store, keys: &[String]) -> Result<HashMap<String, Value>> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock();
        let map = state.as_mut().ok_or_else(|| self.not_initialized())?;

        let mut found = HashMap::with_capacity(keys.len());
        let mut dirty = false;
        for key in keys {
            let (value, purged) = self.decode_or_purge(map, &self.full_key(store, key));
            dirty |= purged;
            if let Some(value) = value {
                found.insert(key.clone(), value);
            }
        }
        if dirty {
            self.persist_after_purge(map);
        }
        Ok(found)
    }

    fn stats(&self) -> AdapterStats {
        AdapterStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
            transactions: 0,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

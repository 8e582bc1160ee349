//! Structured Tier - sled Database
//!
//! Durable tier with one tree per store and a schema version kept in the
//! default tree. Records are stored as an `{ id, payload }` envelope so the
//! caller's payload never has to carry its own key.
//!
//! # Design
//!
//! - Explicit async open; a newer on-disk schema makes the tier unavailable
//! - Batched reads run inside a single read transaction
//! - Undecodable records are removed and reported as absent

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sled::transaction::{ConflictableTransactionResult, TransactionalTree};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::domain::ports::{AdapterStats, StorageAdapter, StorageTier, Store};
use crate::error::{Error, Result};

/// Current on-disk schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Key of the schema version in the default tree
const SCHEMA_VERSION_KEY: &[u8] = b"__schema_version";

/// Stored record. `id` always equals the tree key.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    id: String,
    payload: Value,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    id: &'a str,
    payload: &'a Value,
}

/// Open database plus one tree per store
struct SledHandle {
    db: sled::Db,
    trees: HashMap<Store, sled::Tree>,
}

impl SledHandle {
    fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path)?;

        let found = match db.get(SCHEMA_VERSION_KEY)? {
            Some(raw) => {
                let bytes = <[u8; 4]>::try_from(&raw[..]).map_err(|_| {
                    Error::Backend("schema version record is malformed".to_string())
                })?;
                Some(u32::from_be_bytes(bytes))
            }
            None => None,
        };

        if let Some(found) = found {
            if found > SCHEMA_VERSION {
                return Err(Error::SchemaVersion {
                    found,
                    supported: SCHEMA_VERSION,
                });
            }
        }

        let mut trees = HashMap::with_capacity(Store::ALL.len());
        for store in Store::ALL {
            trees.insert(store, db.open_tree(store.as_str())?);
        }

        if found != Some(SCHEMA_VERSION) {
            info!(
                path = %path.display(),
                from = ?found,
                to = SCHEMA_VERSION,
                "Upgrading structured cache schema"
            );
            db.insert(SCHEMA_VERSION_KEY, SCHEMA_VERSION.to_be_bytes().to_vec())?;
            db.flush()?;
        }

        Ok(Self { db, trees })
    }

    fn tree(&self, store: Store) -> Result<&sled::Tree> {
        self.trees
            .get(&store)
            .ok_or_else(|| Error::Internal(format!("store {} was not declared", store)))
    }
}

/// sled-backed adapter
pub struct SledAdapter {
    path: PathBuf,
    handle: OnceCell<SledHandle>,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    purged: AtomicU64,
    transactions: AtomicU64,
}

impl SledAdapter {
    /// Create an adapter for the database directory at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            handle: OnceCell::new(),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            purged: AtomicU64::new(0),
            transactions: AtomicU64::new(0),
        }
    }

    /// Database directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read transactions opened so far
    pub fn transactions_opened(&self) -> u64 {
        self.transactions.load(Ordering::Relaxed)
    }

    fn handle(&self) -> Result<&SledHandle> {
        self.handle.get().ok_or_else(|| Error::NotInitialized {
            tier: StorageTier::Structured.to_string(),
        })
    }

    fn tree(&self, store: Store) -> Result<&sled::Tree> {
        self.handle()?.tree(store)
    }

    /// Decode a record; `None` when it is corrupt or filed under the wrong key.
    fn decode(key: &str, raw: &[u8]) -> Option<Value> {
        match serde_json::from_slice::<Envelope>(raw) {
            Ok(envelope) if envelope.id == key => Some(envelope.payload),
            Ok(envelope) => {
                warn!(key, found = %envelope.id, "Structured cache record has mismatched id");
                None
            }
            Err(e) => {
                warn!(key, error = %e, "Structured cache record is undecodable");
                None
            }
        }
    }

    fn purge(&self, tree: &sled::Tree, key: &str) {
        self.purged.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = tree.remove(key.as_bytes()) {
            warn!(key, error = %e, "Failed to purge corrupt structured cache record");
        }
    }
}

#[async_trait]
impl StorageAdapter for SledAdapter {
    fn tier(&self) -> StorageTier {
        StorageTier::Structured
    }

    fn is_available(&self) -> bool {
        if self.path.is_file() {
            return false;
        }
        match self.path.parent() {
            Some(parent) if parent.exists() => std::fs::metadata(parent)
                .map(|m| m.is_dir() && !m.permissions().readonly())
                .unwrap_or(false),
            Some(_) => true,
            None => false,
        }
    }

    async fn init(&self) -> Result<()> {
        self.handle
            .get_or_try_init(|| async {
                if self.path.is_file() {
                    return Err(Error::Unavailable {
                        tier: StorageTier::Structured.to_string(),
                        reason: format!("{} is a file", self.path.display()),
                    });
                }
                let handle = SledHandle::open(&self.path)?;
                debug!(path = %self.path.display(), "Structured cache tier opened");
                Ok::<_, Error>(handle)
            })
            .await?;
        Ok(())
    }

    async fn get(&self, store: Store, key: &str) -> Result<Option<Value>> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        let tree = self.tree(store)?;
        let Some(raw) = tree.get(key.as_bytes())? else {
            return Ok(None);
        };

        match Self::decode(key, &raw) {
            Some(value) => Ok(Some(value)),
            None => {
                self.purge(tree, key);
                Ok(None)
            }
        }
    }

    async fn set(&self, store: Store, key: &str, value: Value) -> Result<()> {
        let tree = self.tree(store)?;
        let record = serde_json::to_vec(&EnvelopeRef {
            id: key,
            payload: &value,
        })?;

        tree.insert(key.as_bytes(), record)?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, store: Store, key: &str) -> Result<bool> {
        self.deletes.fetch_add(1, Ordering::Relaxed);

        let tree = self.tree(store)?;
        Ok(tree.remove(key.as_bytes())?.is_some())
    }

    async fn clear(&self, store: Option<Store>) -> Result<()> {
        let handle = self.handle()?;
        let stores: Vec<Store> = match store {
            Some(store) => vec![store],
            None => Store::ALL.to_vec(),
        };

        for store in stores {
            handle.tree(store)?.clear()?;
        }
        handle.db.flush()?;
        Ok(())
    }

    async fn keys(&self, store: Store) -> Result<Vec<String>> {
        let tree = self.tree(store)?;

        let mut keys = Vec::with_capacity(tree.len());
        for key in tree.iter().keys() {
            keys.push(String::from_utf8_lossy(&key?).into_owned());
        }
        Ok(keys)
    }

    async fn get_all(&self, store: Store) -> Result<Vec<Value>> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        let tree = self.tree(store)?;
        let mut values = Vec::with_capacity(tree.len());
        let mut corrupt = Vec::new();

        for item in tree.iter() {
            let (key, raw) = item?;
            let key = String::from_utf8_lossy(&key).into_owned();
            match Self::decode(&key, &raw) {
                Some(value) => values.push(value),
                None => corrupt.push(key),
            }
        }

        for key in corrupt {
            self.purge(tree, &key);
        }
        Ok(values)
    }

    async fn get_many(&self, store: Store, keys: &[String]) -> Result<HashMap<String, Value>> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        let tree = self.tree(store)?;
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        self.transactions.fetch_add(1, Ordering::Relaxed);
        let collected = tree.transaction(
            |tx: &TransactionalTree| -> ConflictableTransactionResult<Vec<(usize, sled::IVec)>, ()> {
                let mut found = Vec::with_capacity(keys.len());
                for (i, key) in keys.iter().enumerate() {
                    if let Some(raw) = tx.get(key.as_bytes())? {
                        found.push((i, raw));
                    }
                }
                Ok(found)
            },
        );

        let collected = match collected {
            Ok(collected) => collected,
            Err(e) => {
                warn!(
                    store = %store,
                    keys = keys.len(),
                    error = ?e,
                    "Structured cache batch read failed"
                );
                return Ok(HashMap::new());
            }
        };

        let mut found = HashMap::with_capacity(collected.len());
        for (i, raw) in collected {
            let key = &keys[i];
            match Self::decode(key, &raw) {
                Some(value) => {
                    found.insert(key.clone(), value);
                }
                None => self.purge(tree, key),
            }
        }
        Ok(found)
    }

    async fn flush(&self) -> Result<()> {
        if let Some(handle) = self.handle.get() {
            handle.db.flush()?;
        }
        Ok(())
    }

    fn stats(&self) -> AdapterStats {
        AdapterStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
            transactions: self.transactions.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

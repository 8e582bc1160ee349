//! Volatile Tier - In-Memory Storage
//!
//! Last-resort tier: always available, always succeeds, gone when the
//! process exits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::domain::ports::{AdapterStats, StorageAdapter, StorageTier, Store};
use crate::error::Result;

/// In-memory adapter.
/// Uses DashMap for lock-free concurrent access instead of a single RwLock.
#[derive(Default)]
pub struct MemoryAdapter {
    /// Storage (store -> key -> value)
    storage: DashMap<Store, DashMap<String, Value>>,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryAdapter {
    /// Create a new in-memory adapter
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of values held across all stores.
    pub fn len(&self) -> usize {
        self.storage.iter().map(|s| s.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    fn tier(&self) -> StorageTier {
        StorageTier::Volatile
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, store: Store, key: &str) -> Result<Option<Value>> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        Ok(self
            .storage
            .get(&store)
            .and_then(|s| s.get(key).map(|v| v.value().clone())))
    }

    async fn set(&self, store: Store, key: &str, value: Value) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);

        self.storage
            .entry(store)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, store: Store, key: &str) -> Result<bool> {
        self.deletes.fetch_add(1, Ordering::Relaxed);

        Ok(self
            .storage
            .get(&store)
            .map(|s| s.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn clear(&self, store: Option<Store>) -> Result<()> {
        match store {
            Some(store) => {
                self.storage.remove(&store);
            }
            None => self.storage.clear(),
        }
        Ok(())
    }

    async fn keys(&self, store: Store) -> Result<Vec<String>> {
        Ok(self
            .storage
            .get(&store)
            .map(|s| s.iter().map(|e| e.key().clone()).collect())
            .unwrap_or_default())
    }

    async fn get_all(&self, store: Store) -> Result<Vec<Value>> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        Ok(self
            .storage
            .get(&store)
            .map(|s| s.iter().map(|e| e.value().clone()).collect())
            .unwrap_or_default())
    }

    async fn get_many(&self, store: Store, keys: &[String]) -> Result<HashMap<String, Value>> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        let mut found = HashMap::with_capacity(keys.len());
        if let Some(s) = self.storage.get(&store) {
            for key in keys {
                if let Some(v) = s.get(key) {
                    found.insert(key.clone(), v.value().clone());
                }
            }
        }
        Ok(found)
    }

    fn stats(&self) -> AdapterStats {
        AdapterStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            purged: 0,
            transactions: 0,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_set_get() {
        let adapter = MemoryAdapter::new();
        adapter.init().await.unwrap();

        adapter
            .set(Store::Tracks, "user_1", json!({"userId": "1"}))
            .await
            .unwrap();

        let value = adapter.get(Store::Tracks, "user_1").await.unwrap();
        assert_eq!(value, Some(json!({"userId": "1"})));

        // Stores are separate namespaces
        assert!(adapter.get(Store::Artists, "user_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_delete() {
        let adapter = MemoryAdapter::new();
        adapter.set(Store::Artists, "a1", json!(1)).await.unwrap();

        assert!(adapter.delete(Store::Artists, "a1").await.unwrap());
        assert!(!adapter.delete(Store::Artists, "a1").await.unwrap());
        assert!(!adapter.delete(Store::Tracks, "missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_clear_single_store() {
        let adapter = MemoryAdapter::new();
        adapter.set(Store::Tracks, "user_1", json!(1)).await.unwrap();
        adapter.set(Store::Artists, "a1", json!(2)).await.unwrap();

        adapter.clear(Some(Store::Tracks)).await.unwrap();

        assert!(adapter.keys(Store::Tracks).await.unwrap().is_empty());
        assert_eq!(adapter.keys(Store::Artists).await.unwrap(), vec!["a1"]);

        adapter.clear(None).await.unwrap();
        assert!(adapter.is_empty());
    }

    #[tokio::test]
    async fn test_memory_get_many_omits_missing() {
        let adapter = MemoryAdapter::new();
        adapter.set(Store::Artists, "a1", json!("x")).await.unwrap();
        adapter.set(Store::Artists, "a3", json!("z")).await.unwrap();

        let keys = vec!["a1".to_string(), "a2".to_string(), "a3".to_string()];
        let found = adapter.get_many(Store::Artists, &keys).await.unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found["a1"], json!("x"));
        assert!(!found.contains_key("a2"));
    }

    #[tokio::test]
    async fn test_memory_get_all_and_stats() {
        let adapter = MemoryAdapter::new();
        adapter.set(Store::Artists, "a1", json!(1)).await.unwrap();
        adapter.set(Store::Artists, "a2", json!(2)).await.unwrap();

        let mut all = adapter.get_all(Store::Artists).await.unwrap();
        all.sort_by_key(|v| v.as_i64());
        assert_eq!(all, vec![json!(1), json!(2)]);

        let stats = adapter.stats();
        assert_eq!(stats.writes, 2);
        assert_eq!(stats.reads, 1);
        assert_eq!(stats.transactions, 0);
    }
}

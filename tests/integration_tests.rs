//! trackcache Integration Tests
//!
//! End-to-end behaviour of the library cache over real storage tiers:
//! - Tier selection on startup
//! - Track and artist round trips
//! - Batched artist lookups
//! - Persistence and cold starts

use std::sync::Arc;

use trackcache::adapters::{InMemoryEventCollector, SledAdapter};
use trackcache::{
    Artist, CacheConfig, CacheService, LibraryCache, StorageConfig, StorageTier, Track, TtlPolicy,
};

fn durable_config(dir: &std::path::Path) -> CacheConfig {
    CacheConfig {
        storage: StorageConfig::at(dir),
        ttl: TtlPolicy::default(),
    }
}

fn ids(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// Tier Selection
// =============================================================================

mod tier_selection_tests {
    use super::*;

    #[tokio::test]
    async fn test_structured_tier_preferred() {
        let dir = tempfile::tempdir().unwrap();
        let service = CacheService::new(&StorageConfig::at(dir.path()));

        assert!(service.init().await);
        assert_eq!(service.active_storage_type(), Some(StorageTier::Structured));
        assert_eq!(service.active_storage_name(), "structured");
    }

    #[tokio::test]
    async fn test_flat_tier_when_structured_path_blocked() {
        let dir = tempfile::tempdir().unwrap();
        // A plain file where the database directory should go
        std::fs::write(dir.path().join("structured"), b"occupied").unwrap();

        let service = CacheService::new(&StorageConfig::at(dir.path()));
        service.init().await;

        assert_eq!(service.active_storage_type(), Some(StorageTier::Flat));
    }

    #[tokio::test]
    async fn test_memory_tier_without_data_dir() {
        let service = CacheService::new(&StorageConfig::default());
        service.init().await;

        assert_eq!(service.active_storage_type(), Some(StorageTier::Volatile));
        assert_eq!(service.configured_tiers(), vec![StorageTier::Volatile]);
    }

    #[tokio::test]
    async fn test_concurrent_init_settles_on_one_tier() {
        let dir = tempfile::tempdir().unwrap();
        let events = Arc::new(InMemoryEventCollector::new());
        let service = CacheService::builder()
            .adapter(Arc::new(SledAdapter::new(dir.path().join("structured"))))
            .event_publisher(events.clone())
            .build();
        let cache = Arc::new(LibraryCache::new(Arc::new(service), TtlPolicy::default()));

        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    cache.init().await;
                } else {
                    cache.get_cached_tracks("nobody").await;
                }
                cache.service().active_storage_type()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Some(StorageTier::Structured));
        }
        assert_eq!(events.events_of_type("StorageInitialized").len(), 1);
    }
}

// =============================================================================
// Library Cache
// =============================================================================

mod library_tests {
    use super::*;

    #[tokio::test]
    async fn test_track_round_trip_on_durable_tier() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LibraryCache::from_config(&durable_config(dir.path()));

        let mut track = Track::new("t1", "Song", 64);
        track.artist_ids = ids(&["a1", "a2"]);
        track
            .extra
            .insert("durationMs".to_string(), serde_json::json!(215000));

        assert!(cache.cache_tracks("u1", &[track.clone()]).await);

        let cached = cache.get_cached_tracks("u1").await.unwrap();
        assert_eq!(cached, vec![track]);
        assert_eq!(cached[0].extra["durationMs"], 215000);
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let cache = LibraryCache::from_config(&CacheConfig::default());

        cache.cache_tracks("alice", &[Track::new("t1", "A", 1)]).await;
        cache.cache_tracks("bob", &[Track::new("t2", "B", 2)]).await;

        assert_eq!(cache.get_cached_tracks("alice").await.unwrap()[0].id, "t1");
        assert_eq!(cache.get_cached_tracks("bob").await.unwrap()[0].id, "t2");

        cache.invalidate_track_cache("alice").await;
        assert!(cache.get_cached_tracks("alice").await.is_none());
        assert!(cache.get_cached_tracks("bob").await.is_some());
    }

    #[tokio::test]
    async fn test_artist_partitioning() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LibraryCache::from_config(&durable_config(dir.path()));

        let mut a = Artist::new("A", "Alpha");
        a.genres = vec!["jazz".to_string()];
        assert!(cache.cache_artists(&[a.clone(), Artist::new("B", "Beta")]).await);

        let lookup = cache.get_cached_artists(&ids(&["A", "B", "C"])).await;

        assert_eq!(lookup.cached_artists.len(), 2);
        assert_eq!(lookup.cached_artists["A"], a);
        assert_eq!(lookup.uncached_ids, ids(&["C"]));
    }

    #[tokio::test]
    async fn test_batched_lookup_uses_one_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let sled = Arc::new(SledAdapter::new(dir.path().join("structured")));
        let service = CacheService::builder().adapter(sled.clone()).build();
        let cache = LibraryCache::new(Arc::new(service), TtlPolicy::default());

        let artists: Vec<Artist> = (0..250)
            .map(|i| Artist::new(format!("artist{}", i), format!("Artist {}", i)))
            .collect();
        assert!(cache.cache_artists(&artists).await);

        let wanted: Vec<String> = (0..500).map(|i| format!("artist{}", i)).collect();
        let lookup = cache.get_cached_artists(&wanted).await;

        assert_eq!(lookup.cached_artists.len(), 250);
        assert_eq!(lookup.uncached_ids.len(), 250);
        assert_eq!(lookup.uncached_ids[0], "artist250");
        assert_eq!(sled.transactions_opened(), 1);
    }

    #[tokio::test]
    async fn test_clear_all_caches_scope() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LibraryCache::from_config(&durable_config(dir.path()));

        cache.cache_tracks("u1", &[]).await;
        cache.cache_tracks("u2", &[]).await;
        cache.cache_artists(&[Artist::new("A", "Alpha")]).await;

        assert!(cache.clear_all_caches().await);

        let stats = cache.stats().await;
        assert_eq!(stats.storage_type, "structured");
        assert_eq!(stats.track_cache_count, 0);
        assert_eq!(stats.artist_cache_count, 1);
    }
}

// =============================================================================
// Persistence
// =============================================================================

mod persistence_tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cold_start_does_not_survive() {
        let first = LibraryCache::from_config(&CacheConfig::default());
        first.cache_tracks("u1", &[Track::new("t1", "One", 1)]).await;
        assert!(first.get_cached_tracks("u1").await.is_some());

        let second = LibraryCache::from_config(&CacheConfig::default());
        assert!(second.get_cached_tracks("u1").await.is_none());
        assert_eq!(second.service().active_storage_name(), "memory");
    }

    #[tokio::test]
    async fn test_durable_tier_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = LibraryCache::from_config(&durable_config(dir.path()));
            cache.cache_tracks("u1", &[Track::new("t1", "One", 1)]).await;
            cache.service().flush().await;
        }

        let reopened = LibraryCache::from_config(&durable_config(dir.path()));
        let tracks = reopened.get_cached_tracks("u1").await.unwrap();
        assert_eq!(tracks[0].id, "t1");
    }

    #[tokio::test]
    async fn test_config_file_drives_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = format!(
            "storage:\n  data_dir: {}\nttl:\n  track_ttl_secs: 5\n",
            dir.path().display()
        );
        let config = CacheConfig::from_yaml_str(&yaml).unwrap();
        let cache = LibraryCache::from_config(&config);

        let stats = cache.stats().await;
        assert_eq!(stats.track_ttl.as_secs(), 5);
        assert_eq!(stats.artist_ttl, TtlPolicy::default().artists);
    }
}

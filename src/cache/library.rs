//! Library Cache
//!
//! Read-through cache for a user's track collection and for shared artist
//! metadata, built on [`CacheService`]. Callers never see a storage error:
//! every outcome is an `Option`, a `bool` or a partitioned lookup.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use super::expiry::{is_expired, is_expired_at, now_millis};
use super::service::CacheService;
use crate::config::{CacheConfig, TtlPolicy};
use crate::domain::model::{Artist, ArtistCacheEntry, Track, TrackCacheEntry};
use crate::domain::ports::Store;

/// Key of a user's track collection in the tracks store.
pub fn track_key(user_id: &str) -> String {
    format!("user_{}", user_id)
}

/// Result of a batched artist lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistLookup {
    /// Fresh entries by artist id
    pub cached_artists: HashMap<String, Artist>,
    /// Ids that were missing or expired, in request order
    pub uncached_ids: Vec<String>,
}

/// Diagnostic summary of the cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub storage_type: String,
    pub track_cache_count: usize,
    pub artist_cache_count: usize,
    #[serde(rename = "trackTtlSecs", serialize_with = "as_secs")]
    pub track_ttl: Duration,
    #[serde(rename = "artistTtlSecs", serialize_with = "as_secs")]
    pub artist_ttl: Duration,
}

fn as_secs<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_secs())
}

/// Domain-keyed cache for tracks and artists.
#[derive(Debug, Clone)]
pub struct LibraryCache {
    service: Arc<CacheService>,
    ttl: TtlPolicy,
}

impl LibraryCache {
    pub fn new(service: Arc<CacheService>, ttl: TtlPolicy) -> Self {
        Self { service, ttl }
    }

    /// Build the standard tier stack described by `config`.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Arc::new(CacheService::new(&config.storage)), config.ttl)
    }

    /// Underlying tiered service
    pub fn service(&self) -> &Arc<CacheService> {
        &self.service
    }

    pub fn ttl(&self) -> TtlPolicy {
        self.ttl
    }

    pub async fn init(&self) -> bool {
        self.service.init().await
    }

    // =========================================================================
    // Tracks
    // =========================================================================

    /// A user's cached tracks, if present, fresh and owned by that user.
    pub async fn get_cached_tracks(&self, user_id: &str) -> Option<Vec<Track>> {
        let key = track_key(user_id);
        let entry: TrackCacheEntry = self.service.get(Store::Tracks, &key).await?;

        if entry.user_id != user_id {
            warn!(key = %key, owner = %entry.user_id, "Track entry belongs to another user");
            return None;
        }
        if is_expired(entry.cached_at, self.ttl.tracks) {
            debug!(user_id, "Track cache expired");
            return None;
        }
        Some(entry.items)
    }

    /// Replace a user's cached tracks.
    pub async fn cache_tracks(&self, user_id: &str, tracks: &[Track]) -> bool {
        let entry = TrackCacheEntry {
            user_id: user_id.to_string(),
            items: tracks.to_vec(),
            cached_at: Some(now_millis()),
        };
        self.service
            .set(Store::Tracks, &track_key(user_id), &entry)
            .await
    }

    pub async fn invalidate_track_cache(&self, user_id: &str) -> bool {
        self.service.delete(Store::Tracks, &track_key(user_id)).await
    }

    /// Drop everything cached for one user. Artist metadata is shared and
    /// stays.
    pub async fn invalidate_user_cache(&self, user_id: &str) -> bool {
        self.invalidate_track_cache(user_id).await
    }

    // =========================================================================
    // Artists
    // =========================================================================

    /// Partition `artist_ids` into fresh cached entries and ids to fetch.
    pub async fn get_cached_artists(&self, artist_ids: &[String]) -> ArtistLookup {
        let mut seen = HashSet::with_capacity(artist_ids.len());
        let ids: Vec<String> = artist_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        if ids.is_empty() {
            return ArtistLookup::default();
        }

        let mut entries: HashMap<String, ArtistCacheEntry> =
            self.service.get_many(Store::Artists, &ids).await;
        let now = now_millis();

        let mut lookup = ArtistLookup::default();
        for id in ids {
            match entries.remove(&id) {
                Some(entry) if !is_expired_at(entry.cached_at, self.ttl.artists, now) => {
                    lookup.cached_artists.insert(id, entry.artist);
                }
                _ => lookup.uncached_ids.push(id),
            }
        }

        debug!(
            cached = lookup.cached_artists.len(),
            uncached = lookup.uncached_ids.len(),
            "Artist lookup"
        );
        lookup
    }

    /// Cache each artist under its id. `true` only if every write succeeded.
    pub async fn cache_artists(&self, artists: &[Artist]) -> bool {
        let cached_at = Some(now_millis());

        let writes = artists.iter().map(|artist| {
            let entry = ArtistCacheEntry {
                artist: artist.clone(),
                cached_at,
            };
            async move { self.service.set(Store::Artists, &artist.id, &entry).await }
        });

        join_all(writes).await.into_iter().all(|stored| stored)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Drop every user's tracks.
    pub async fn clear_all_caches(&self) -> bool {
        self.service.clear(Some(Store::Tracks)).await
    }

    /// Drop every store on every tier.
    pub async fn wipe(&self) -> bool {
        self.service.clear(None).await
    }

    pub async fn stats(&self) -> CacheStats {
        let track_cache_count = self.service.keys(Store::Tracks).await.len();
        let artist_cache_count = self.service.keys(Store::Artists).await.len();

        CacheStats {
            storage_type: self.service.active_storage_name().to_string(),
            track_cache_count,
            artist_cache_count,
            track_ttl: self.ttl.tracks,
            artist_ttl: self.ttl.artists,
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

    fn memory_cache(ttl: TtlPolicy) -> LibraryCache {
        LibraryCache::new(Arc::new(CacheService::memory_only()), ttl)
    }

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_tracks_round_trip() {
        let cache = memory_cache(TtlPolicy::default());
        let tracks = vec![Track::new("t1", "One", 50), Track::new("t2", "Two", 80)];

        assert!(cache.cache_tracks("u1", &tracks).await);
        assert_eq!(cache.get_cached_tracks("u1").await, Some(tracks));
        assert_eq!(cache.get_cached_tracks("u2").await, None);
    }

    #[tokio::test]
    async fn test_tracks_overwrite() {
        let cache = memory_cache(TtlPolicy::default());
        cache.cache_tracks("u1", &[Track::new("t1", "One", 1)]).await;
        cache.cache_tracks("u1", &[]).await;

        assert_eq!(cache.get_cached_tracks("u1").await, Some(vec![]));
    }

    #[tokio::test]
    async fn test_owner_mismatch_is_miss() {
        let cache = memory_cache(TtlPolicy::default());
        let forged = json!({
            "userId": "someone-else",
            "items": [],
            "cachedAt": now_millis(),
        });
        cache
            .service()
            .set(Store::Tracks, &track_key("u1"), &forged)
            .await;

        assert_eq!(cache.get_cached_tracks("u1").await, None);
    }

    #[tokio::test]
    async fn test_expired_tracks_are_miss() {
        let cache = memory_cache(TtlPolicy::default());
        let stale = TrackCacheEntry {
            user_id: "u1".to_string(),
            items: vec![Track::new("t1", "One", 1)],
            cached_at: Some(now_millis() - 31 * 60 * 1000),
        };
        cache
            .service()
            .set(Store::Tracks, &track_key("u1"), &stale)
            .await;

        assert_eq!(cache.get_cached_tracks("u1").await, None);
    }

    #[tokio::test]
    async fn test_missing_timestamp_is_miss() {
        let cache = memory_cache(TtlPolicy::default());
        let raw = json!({ "userId": "u1", "items": [] });
        cache.service().set(Store::Tracks, &track_key("u1"), &raw).await;

        assert_eq!(cache.get_cached_tracks("u1").await, None);
    }

    #[tokio::test]
    async fn test_invalidate_user_keeps_artists() {
        let cache = memory_cache(TtlPolicy::default());
        cache.cache_tracks("u1", &[Track::new("t1", "One", 1)]).await;
        cache.cache_tracks("u2", &[Track::new("t2", "Two", 2)]).await;
        cache.cache_artists(&[Artist::new("a1", "A")]).await;

        assert!(cache.invalidate_user_cache("u1").await);

        assert_eq!(cache.get_cached_tracks("u1").await, None);
        assert!(cache.get_cached_tracks("u2").await.is_some());
        let lookup = cache.get_cached_artists(&ids(&["a1"])).await;
        assert!(lookup.cached_artists.contains_key("a1"));
    }

    #[tokio::test]
    async fn test_artist_partitioning() {
        let cache = memory_cache(TtlPolicy::default());
        cache
            .cache_artists(&[Artist::new("A", "Alpha"), Artist::new("B", "Beta")])
            .await;

        let lookup = cache.get_cached_artists(&ids(&["A", "B", "C"])).await;

        assert_eq!(lookup.cached_artists.len(), 2);
        assert_eq!(lookup.cached_artists["B"].name, "Beta");
        assert_eq!(lookup.uncached_ids, ids(&["C"]));
    }

    #[tokio::test]
    async fn test_artist_lookup_collapses_duplicates_in_order() {
        let cache = memory_cache(TtlPolicy::default());

        let lookup = cache.get_cached_artists(&ids(&["z", "a", "z", "m"])).await;

        assert!(lookup.cached_artists.is_empty());
        assert_eq!(lookup.uncached_ids, ids(&["z", "a", "m"]));
    }

    #[tokio::test]
    async fn test_expired_artist_is_uncached() {
        let cache = memory_cache(TtlPolicy::default());
        let stale = ArtistCacheEntry {
            artist: Artist::new("A", "Alpha"),
            cached_at: Some(now_millis() - 25 * 60 * 60 * 1000),
        };
        cache.service().set(Store::Artists, "A", &stale).await;

        let lookup = cache.get_cached_artists(&ids(&["A"])).await;
        assert!(lookup.cached_artists.is_empty());
        assert_eq!(lookup.uncached_ids, ids(&["A"]));
    }

    #[tokio::test]
    async fn test_artist_lookup_mixes_fresh_expired_and_missing() {
        let cache = memory_cache(TtlPolicy::default());
        assert!(cache.cache_artists(&[Artist::new("A", "Alpha")]).await);
        let stale = ArtistCacheEntry {
            artist: Artist::new("B", "Beta"),
            cached_at: Some(now_millis() - 25 * 60 * 60 * 1000),
        };
        assert!(cache.service().set(Store::Artists, "B", &stale).await);

        let lookup = cache.get_cached_artists(&ids(&["A", "B", "C"])).await;

        assert_eq!(lookup.cached_artists.len(), 1);
        assert_eq!(lookup.cached_artists["A"].name, "Alpha");
        assert_eq!(lookup.uncached_ids, ids(&["B", "C"]));
    }

    #[tokio::test]
    async fn test_empty_inputs() {
        let cache = memory_cache(TtlPolicy::default());

        assert!(cache.cache_artists(&[]).await);
        assert_eq!(cache.get_cached_artists(&[]).await, ArtistLookup::default());
    }

    #[tokio::test]
    async fn test_clear_all_caches_keeps_artists() {
        let cache = memory_cache(TtlPolicy::default());
        cache.cache_tracks("u1", &[]).await;
        cache.cache_artists(&[Artist::new("A", "Alpha")]).await;

        assert!(cache.clear_all_caches().await);

        let stats = cache.stats().await;
        assert_eq!(stats.track_cache_count, 0);
        assert_eq!(stats.artist_cache_count, 1);

        assert!(cache.wipe().await);
        assert_eq!(cache.stats().await.artist_cache_count, 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let ttl = TtlPolicy {
            tracks: Duration::from_secs(60),
            artists: Duration::from_secs(120),
        };
        let cache = memory_cache(ttl);
        cache.cache_tracks("u1", &[]).await;

        let stats = cache.stats().await;
        assert_eq!(stats.storage_type, "memory");
        assert_eq!(stats.track_cache_count, 1);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["trackTtlSecs"], 60);
        assert_eq!(json["artistTtlSecs"], 120);
    }
}

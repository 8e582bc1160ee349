//! Cached payload types.
//!
//! `Track` and `Artist` mirror the upstream API records closely enough to be
//! useful, but the cache never interprets them: unknown upstream fields are
//! kept in `extra` and written back untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A saved track as returned by the upstream API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Popularity score (0-100)
    pub popularity: u32,
    #[serde(default)]
    pub artist_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Track {
    pub fn new(id: impl Into<String>, name: impl Into<String>, popularity: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            popularity,
            artist_ids: Vec::new(),
            added_at: None,
            extra: Map::new(),
        }
    }
}

/// Artist metadata, shared across users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artist {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popularity: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Artist {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            genres: Vec::new(),
            popularity: None,
            extra: Map::new(),
        }
    }
}

/// Persisted form of one user's track collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackCacheEntry {
    pub user_id: String,
    pub items: Vec<Track>,
    /// Epoch milliseconds at write time
    #[serde(default)]
    pub cached_at: Option<i64>,
}

/// Persisted form of one artist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistCacheEntry {
    pub artist: Artist,
    /// Epoch milliseconds at write time
    #[serde(default)]
    pub cached_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_track_keeps_unknown_fields() {
        let raw = json!({
            "id": "t1",
            "name": "Song",
            "popularity": 71,
            "artistIds": ["a1"],
            "durationMs": 201000,
            "explicit": false
        });

        let track: Track = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(track.popularity, 71);
        assert_eq!(track.extra.get("durationMs"), Some(&json!(201000)));

        let back = serde_json::to_value(&track).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn test_entry_field_names() {
        let entry = TrackCacheEntry {
            user_id: "u1".to_string(),
            items: vec![Track::new("t1", "Song", 50)],
            cached_at: Some(1_700_000_000_000),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["cachedAt"], 1_700_000_000_000i64);
        assert!(json["items"].is_array());
    }

    #[test]
    fn test_missing_cached_at_defaults_to_none() {
        let entry: ArtistCacheEntry =
            serde_json::from_value(json!({ "artist": { "id": "a1" } })).unwrap();
        assert_eq!(entry.cached_at, None);
        assert_eq!(entry.artist.id, "a1");
        assert!(entry.artist.genres.is_empty());
    }
}

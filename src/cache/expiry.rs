//! TTL checks shared by every store.

use std::time::Duration;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// True if an entry written at `cached_at` is no longer valid under `ttl`.
///
/// Entries without a timestamp and a zero TTL are always expired.
pub fn is_expired(cached_at: Option<i64>, ttl: Duration) -> bool {
    is_expired_at(cached_at, ttl, now_millis())
}

/// [`is_expired`] against an explicit `now` (epoch milliseconds).
pub fn is_expired_at(cached_at: Option<i64>, ttl: Duration, now: i64) -> bool {
    let Some(cached_at) = cached_at else {
        return true;
    };
    if ttl.is_zero() {
        return true;
    }
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now.saturating_sub(cached_at) > ttl_ms
}

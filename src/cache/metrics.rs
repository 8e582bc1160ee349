//! Cache Metrics Collection
//!
//! Counters for the cache service plus Prometheus text exposition.

use std::sync::atomic::{AtomicU64, Ordering};

use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Error, Result};

/// Cache service metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,

    // Tier failover
    fallback_attempts: AtomicU64,
    promotions: AtomicU64,
    exhausted: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback_attempt(&self) {
        self.fallback_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let total = hits + self.misses.load(Ordering::Relaxed) as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            hit_ratio: self.hit_ratio(),
            writes: self.writes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            fallback_attempts: self.fallback_attempts.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CacheMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub writes: u64,
    pub write_failures: u64,
    pub fallback_attempts: u64,
    pub promotions: u64,
    pub exhausted: u64,
}

impl MetricsSnapshot {
    /// Render in the Prometheus text exposition format.
    ///
    /// `active_tier` is exported as a labelled gauge set to 1.
    pub fn to_prometheus(&self, active_tier: &str) -> Result<String> {
        let registry = Registry::new_custom(Some("trackcache".to_string()), None)
            .map_err(|e| Error::Internal(format!("metrics registry: {}", e)))?;

        let counters = [
            ("hits_total", "Cache reads that returned a value", self.hits),
            ("misses_total", "Cache reads that found nothing", self.misses),
            ("writes_total", "Successful cache writes", self.writes),
            (
                "write_failures_total",
                "Writes that failed on every tier",
                self.write_failures,
            ),
            (
                "fallback_attempts_total",
                "Operations retried on a lower tier",
                self.fallback_attempts,
            ),
            (
                "promotions_total",
                "Active tier changes after a failure",
                self.promotions,
            ),
            (
                "exhausted_total",
                "Operations that failed on every tier",
                self.exhausted,
            ),
        ];

        for (name, help, value) in counters {
            let counter = IntCounter::new(name, help)
                .map_err(|e| Error::Internal(format!("metric {}: {}", name, e)))?;
            counter.inc_by(value);
            registry
                .register(Box::new(counter))
                .map_err(|e| Error::Internal(format!("metric {}: {}", name, e)))?;
        }

        let tier = IntGauge::with_opts(
            Opts::new("active_tier", "Storage tier currently serving requests")
                .const_label("tier", active_tier),
        )
        .map_err(|e| Error::Internal(format!("metric active_tier: {}", e)))?;
        tier.set(1);
        registry
            .register(Box::new(tier))
            .map_err(|e| Error::Internal(format!("metric active_tier: {}", e)))?;

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .map_err(|e| Error::Internal(format!("metrics encoding: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
    }
}

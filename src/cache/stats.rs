//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, evictions and the
//! compute time saved by serving memoized values.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    /// Entries removed to stay within capacity
    pub evictions: u64,
    /// Entries removed because their TTL elapsed
    pub expirations: u64,
    /// Entries removed by explicit invalidation
    pub invalidations: u64,
    /// Number of values stored
    pub sets: u64,
    /// Current number of entries in the cache
    pub size: usize,
    /// Callers that found another caller already computing their key
    pub lock_contentions: u64,
    /// Eviction passes abandoned because the policy offered no usable victim
    pub stuck_evictions: u64,
    /// Sum of recorded compute durations credited on hits, in milliseconds
    pub compute_time_saved_ms: f64,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Stats Recorder ==
/// Monotonic counters shared by every caller of a store.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
    sets: AtomicU64,
    lock_contentions: AtomicU64,
    stuck_evictions: AtomicU64,
    time_saved_nanos: AtomicU64,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expirations(&self, count: u64) {
        self.expirations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_invalidations(&self, count: u64) {
        self.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_contention(&self) {
        self.lock_contentions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stuck_eviction(&self) {
        self.stuck_evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Credits the recorded cost of a value that was served from cache.
    pub fn record_time_saved(&self, saved: Duration) {
        let nanos = u64::try_from(saved.as_nanos()).unwrap_or(u64::MAX);
        // Saturate rather than wrap
        let _ = self
            .time_saved_nanos
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |total| {
                Some(total.saturating_add(nanos))
            });
    }

    /// Copies the counters into a snapshot.
    pub fn snapshot(&self, size: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            size,
            lock_contentions: self.lock_contentions.load(Ordering::Relaxed),
            stuck_evictions: self.stuck_evictions.load(Ordering::Relaxed),
            compute_time_saved_ms: self.time_saved_nanos.load(Ordering::Relaxed) as f64
                / 1_000_000.0,
        }
    }
}

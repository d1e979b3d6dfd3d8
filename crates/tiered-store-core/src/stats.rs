//! Lock-free observability counters shared by the manifest provider and the
//! chunk cache. Counting is atomic rather than behind a mutex so a hot fetch
//! path never blocks on stats bookkeeping.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Why an entry left the cache, recorded on [`CacheStats::record_eviction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionCause {
    Expired,
    Size,
    Invalidated,
}

#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    load_successes: AtomicU64,
    load_failures: AtomicU64,
    evictions_expired: AtomicU64,
    evictions_size: AtomicU64,
    evictions_invalidated: AtomicU64,
}

impl CacheStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_success(&self) {
        self.load_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_failure(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self, cause: EvictionCause) {
        let counter = match cause {
            EvictionCause::Expired => &self.evictions_expired,
            EvictionCause::Size => &self.evictions_size,
            EvictionCause::Invalidated => &self.evictions_invalidated,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            load_successes: self.load_successes.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            evictions_expired: self.evictions_expired.load(Ordering::Relaxed),
            evictions_size: self.evictions_size.load(Ordering::Relaxed),
            evictions_invalidated: self.evictions_invalidated.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub load_successes: u64,
    pub load_failures: u64,
    pub evictions_expired: u64,
    pub evictions_size: u64,
    pub evictions_invalidated: u64,
}

impl CacheStatsSnapshot {
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

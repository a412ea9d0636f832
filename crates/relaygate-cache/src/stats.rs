use std::sync::atomic::{AtomicU64, Ordering};

/// Cache statistics (spec.md §4.C). Plain atomics so the data path never
/// blocks on a lock just to bump a counter.
#[derive(Default)]
pub struct CacheStats {
    local_hits: AtomicU64,
    remote_hits: AtomicU64,
    misses: AtomicU64,
    backfills: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CacheStatsSnapshot {
    pub local_hits: u64,
    pub remote_hits: u64,
    pub misses: u64,
    pub backfills: u64,
    pub hit_rate: f64,
}

impl CacheStats {
    pub fn record_local_hit(&self) {
        self.local_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remote_hit(&self) {
        self.remote_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backfill(&self) {
        self.backfills.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        let local_hits = self.local_hits.load(Ordering::Relaxed);
        let remote_hits = self.remote_hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let backfills = self.backfills.load(Ordering::Relaxed);
        let total = local_hits + remote_hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            (local_hits + remote_hits) as f64 / total as f64
        };
        CacheStatsSnapshot {
            local_hits,
            remote_hits,
            misses,
            backfills,
            hit_rate,
        }
    }
}

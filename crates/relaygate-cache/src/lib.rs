//! Dual-tier (local + remote) cache with request-coalescing throttle
//! (spec.md §4.C). Used by governance/token lookups.

mod local;
mod remote;
mod stats;
mod throttle;

pub use local::LocalCache;
pub use remote::{NoopRemote, RedisRemote, RemoteBackend, RemoteError};
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use throttle::ThrottleMap;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use relaygate_common::CacheConfig;

pub struct DualTierCache<R: RemoteBackend> {
    local: LocalCache,
    remote: Option<Arc<R>>,
    throttle: ThrottleMap,
    stats: CacheStats,
    local_ttl: Duration,
    remote_ttl: Duration,
}

impl<R: RemoteBackend> DualTierCache<R> {
    pub fn new(config: &CacheConfig, remote: Option<Arc<R>>) -> Self {
        let local_ttl = Duration::from_secs(config.local_ttl_s.max(1));
        let remote_ttl = Duration::from_secs(config.remote_ttl_s.max(1));
        Self {
            local: LocalCache::new(local_ttl),
            remote,
            throttle: ThrottleMap::new(
                Duration::from_millis(config.batch_throttle_ms.max(1)),
                config.max_throttle_entries.max(1),
            ),
            stats: CacheStats::default(),
            local_ttl,
            remote_ttl,
        }
    }

    /// Local first; on miss, query remote (if configured); on remote hit,
    /// backfill local best-effort (a local write failure must not change the
    /// result we return).
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        if let Some(value) = self.local.get(key) {
            self.stats.record_local_hit();
            return Some(value);
        }

        let Some(remote) = &self.remote else {
            self.stats.record_miss();
            return None;
        };

        match remote.get(key).await {
            Ok(Some(value)) => {
                self.stats.record_remote_hit();
                self.local.set(key.to_string(), value.clone(), Some(self.local_ttl));
                self.stats.record_backfill();
                Some(value)
            }
            Ok(None) => {
                self.stats.record_miss();
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, "remote cache get failed, treating as miss");
                self.stats.record_miss();
                None
            }
        }
    }

    /// Write local then remote. A remote write error is surfaced to the
    /// caller; a local write failure is not recoverable at this layer and is
    /// therefore treated as fatal (the local tier is in-process memory, so a
    /// failure here indicates a programming error, not a transient fault).
    pub async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), RemoteError> {
        self.local.set(key.to_string(), value.clone(), ttl.or(Some(self.local_ttl)));
        if let Some(remote) = &self.remote {
            remote.set(key, value, ttl.unwrap_or(self.remote_ttl)).await?;
        }
        Ok(())
    }

    /// Write only the local tier (spec.md §4.C `SetLocalOnly`) — used when a
    /// value is cheap to recompute and not worth sharing across replicas.
    pub fn set_local_only(&self, key: &str, value: Bytes, ttl: Option<Duration>) {
        self.local.set(key.to_string(), value, ttl.or(Some(self.local_ttl)));
    }

    pub async fn delete(&self, key: &str) -> Result<(), RemoteError> {
        self.local.delete(key);
        if let Some(remote) = &self.remote {
            remote.delete(key).await?;
        }
        Ok(())
    }

    /// Batch read with request coalescing: local covers all keys first; only
    /// throttle-eligible misses are sent to remote, and every key actually
    /// queried gets stamped regardless of hit/miss (spec.md §4.C).
    pub async fn get_multi(&self, keys: &[String]) -> HashMap<String, Bytes> {
        let mut result = self.local.get_multi(keys);
        for key in keys {
            if result.contains_key(key) {
                self.stats.record_local_hit();
            }
        }

        let still_missing: Vec<String> = keys
            .iter()
            .filter(|k| !result.contains_key(k.as_str()))
            .cloned()
            .collect();
        if still_missing.is_empty() {
            return result;
        }

        let Some(remote) = &self.remote else {
            self.stats
                .record_miss_n(still_missing.len());
            return result;
        };

        let allowed = self.throttle.filter_allowed(&still_missing);
        if allowed.is_empty() {
            self.stats.record_miss_n(still_missing.len());
            return result;
        }

        match remote.get_multi(&allowed).await {
            Ok(hits) => {
                self.throttle.stamp(&allowed);
                for (key, value) in &hits {
                    self.stats.record_remote_hit();
                    self.local.set(key.clone(), value.clone(), Some(self.local_ttl));
                    self.stats.record_backfill();
                }
                let misses = still_missing.len().saturating_sub(hits.len());
                self.stats.record_miss_n(misses);
                result.extend(hits);
                result
            }
            Err(err) => {
                tracing::warn!(error = %err, "remote cache get_multi failed");
                self.stats.record_miss_n(still_missing.len());
                result
            }
        }
    }

    pub async fn set_pipeline(&self, items: &[(String, Bytes, Duration)]) -> Result<(), RemoteError> {
        for (key, value, ttl) in items {
            self.local.set(key.clone(), value.clone(), Some(*ttl));
        }
        if let Some(remote) = &self.remote {
            remote.set_pipeline(items).await?;
        }
        Ok(())
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn throttle_len(&self) -> usize {
        self.throttle.len()
    }

    /// No persistent resources to release for the local tier; present for
    /// symmetry with the remote backend's connection lifecycle (spec.md
    /// §4.C `Close`).
    pub async fn close(&self) {
        self.local.sweep_expired();
    }
}

impl CacheStats {
    fn record_miss_n(&self, n: usize) {
        for _ in 0..n {
            self.record_miss();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_hit_never_touches_remote() {
        let cache: DualTierCache<NoopRemote> =
            DualTierCache::new(&CacheConfig::default(), Some(Arc::new(NoopRemote)));
        cache.set("k", Bytes::from_static(b"v"), None).await.unwrap();
        assert_eq!(cache.get("k").await, Some(Bytes::from_static(b"v")));
        assert_eq!(cache.stats().local_hits, 1);
    }

    #[tokio::test]
    async fn miss_without_remote_is_recorded() {
        let cache: DualTierCache<NoopRemote> = DualTierCache::new(&CacheConfig::default(), None);
        assert!(cache.get("missing").await.is_none());
        assert_eq!(cache.stats().misses, 1);
    }
}

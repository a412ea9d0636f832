//! Picks between a local-only cache and a Redis-backed dual-tier one at
//! startup. `relaygate_common::CacheConfig` carries only TTL/throttle
//! knobs, not a connection string, so the remote tier is selected here via
//! a CLI/env flag instead (spec.md §4.F names the dual-tier cache; it
//! leaves the remote backend's connection details to the deployer).

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use relaygate_cache::{CacheStatsSnapshot, DualTierCache, NoopRemote, RedisRemote, RemoteError};
use relaygate_common::CacheConfig;

pub enum CacheBackend {
    Local(DualTierCache<NoopRemote>),
    Remote(DualTierCache<RedisRemote>),
}

impl CacheBackend {
    pub fn local(config: &CacheConfig) -> Self {
        CacheBackend::Local(DualTierCache::new(config, None))
    }

    pub async fn connect(config: &CacheConfig, redis_url: &str) -> anyhow::Result<Self> {
        let remote = RedisRemote::connect(redis_url).await?;
        Ok(CacheBackend::Remote(DualTierCache::new(config, Some(Arc::new(remote)))))
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        match self {
            CacheBackend::Local(cache) => cache.get(key).await,
            CacheBackend::Remote(cache) => cache.get(key).await,
        }
    }

    pub async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), RemoteError> {
        match self {
            CacheBackend::Local(cache) => cache.set(key, value, ttl).await,
            CacheBackend::Remote(cache) => cache.set(key, value, ttl).await,
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), RemoteError> {
        match self {
            CacheBackend::Local(cache) => cache.delete(key).await,
            CacheBackend::Remote(cache) => cache.delete(key).await,
        }
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        match self {
            CacheBackend::Local(cache) => cache.stats(),
            CacheBackend::Remote(cache) => cache.stats(),
        }
    }

    pub async fn close(&self) {
        match self {
            CacheBackend::Local(cache) => cache.close().await,
            CacheBackend::Remote(cache) => cache.close().await,
        }
    }
}

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote cache backend unavailable: {0}")]
    Unavailable(String),
}

/// The "remote" (L2, shared) tier of the dual-tier cache. Spec.md §4.C names
/// this only as a backend the local tier backfills from; the Redis
/// implementation below is the concrete instance this workspace ships, since
/// the cache itself (unlike the persistent entity store) is in scope.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, RemoteError>;
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), RemoteError>;
    async fn delete(&self, key: &str) -> Result<(), RemoteError>;
    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Bytes>, RemoteError>;
    async fn set_pipeline(&self, items: &[(String, Bytes, Duration)]) -> Result<(), RemoteError>;
}

pub struct RedisRemote {
    manager: redis::aio::ConnectionManager,
}

impl RedisRemote {
    pub async fn connect(url: &str) -> Result<Self, RemoteError> {
        let client = redis::Client::open(url).map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl RemoteBackend for RedisRemote {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, RemoteError> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), RemoteError> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value.as_ref())
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), RemoteError> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))
    }

    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Bytes>, RemoteError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let mut conn = self.manager.clone();
        let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        Ok(keys
            .iter()
            .zip(values)
            .filter_map(|(k, v)| v.map(|v| (k.clone(), Bytes::from(v))))
            .collect())
    }

    async fn set_pipeline(&self, items: &[(String, Bytes, Duration)]) -> Result<(), RemoteError> {
        if items.is_empty() {
            return Ok(());
        }
        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        for (key, value, ttl) in items {
            pipe.cmd("SET")
                .arg(key)
                .arg(value.as_ref())
                .arg("PX")
                .arg(ttl.as_millis() as u64)
                .ignore();
        }
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))
    }
}

/// Reference in-memory stand-in used by tests and by deployments that run
/// with no remote tier configured; `Get` always misses, `Set`/`Delete` are
/// accepted no-ops.
#[derive(Default)]
pub struct NoopRemote;

#[async_trait]
impl RemoteBackend for NoopRemote {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>, RemoteError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn get_multi(&self, _keys: &[String]) -> Result<HashMap<String, Bytes>, RemoteError> {
        Ok(HashMap::new())
    }

    async fn set_pipeline(&self, _items: &[(String, Bytes, Duration)]) -> Result<(), RemoteError> {
        Ok(())
    }
}

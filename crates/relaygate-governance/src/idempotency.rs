use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum IdempotencyError {
    #[error("idempotency backend unavailable: {0}")]
    Unavailable(String),
}

/// `PutIfAbsent` semantics keyed on `request_id` (spec.md §4.H Account):
/// the first caller to claim a key gets `true`; everyone else within the
/// TTL window gets `false` and must skip all accounting writes.
#[async_trait::async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn put_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, IdempotencyError>;
}

#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    seen: Mutex<HashMap<String, Instant>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn put_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, IdempotencyError> {
        let now = Instant::now();
        let mut seen = self.seen.lock().expect("idempotency mutex poisoned");
        seen.retain(|_, expires_at| *expires_at > now);
        if seen.contains_key(key) {
            return Ok(false);
        }
        seen.insert(key.to_string(), now + ttl);
        Ok(true)
    }
}

/// Redis-backed `SET NX PX` implementation for multi-replica deployments.
pub struct RedisIdempotencyStore {
    manager: redis::aio::ConnectionManager,
}

impl RedisIdempotencyStore {
    pub async fn connect(url: &str) -> Result<Self, IdempotencyError> {
        let client = redis::Client::open(url).map_err(|e| IdempotencyError::Unavailable(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| IdempotencyError::Unavailable(e.to_string()))?;
        Ok(Self { manager })
    }
}

#[async_trait::async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn put_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, IdempotencyError> {
        let mut conn = self.manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| IdempotencyError::Unavailable(e.to_string()))?;
        Ok(reply.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_claim_within_window_is_rejected() {
        let store = InMemoryIdempotencyStore::new();
        assert!(store.put_if_absent("req-1", Duration::from_secs(60)).await.unwrap());
        assert!(!store.put_if_absent("req-1", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn claim_expires_after_ttl() {
        let store = InMemoryIdempotencyStore::new();
        assert!(store.put_if_absent("req-1", Duration::from_millis(10)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.put_if_absent("req-1", Duration::from_secs(60)).await.unwrap());
    }
}

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use bytes::Bytes;

struct Entry {
    value: Bytes,
    expires_at: Instant,
}

/// In-process L1 tier: a single `RwLock<HashMap>` with per-entry TTL, matching
/// the teacher's habit of protecting small in-memory maps with one lock
/// rather than reaching for a cache crate (spec.md §5 "Cache throttle map
/// under a single mutex; read path under a read lock").
pub struct LocalCache {
    entries: RwLock<HashMap<String, Entry>>,
    default_ttl: Duration,
}

impl LocalCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        let guard = self.entries.read().expect("local cache lock poisoned");
        guard.get(key).and_then(|entry| {
            if entry.expires_at > now {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    pub fn set(&self, key: String, value: Bytes, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut guard = self.entries.write().expect("local cache lock poisoned");
        guard.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn delete(&self, key: &str) {
        let mut guard = self.entries.write().expect("local cache lock poisoned");
        guard.remove(key);
    }

    pub fn get_multi(&self, keys: &[String]) -> HashMap<String, Bytes> {
        let now = Instant::now();
        let guard = self.entries.read().expect("local cache lock poisoned");
        keys.iter()
            .filter_map(|key| {
                guard.get(key).and_then(|entry| {
                    if entry.expires_at > now {
                        Some((key.clone(), entry.value.clone()))
                    } else {
                        None
                    }
                })
            })
            .collect()
    }

    /// Evict entries whose TTL has elapsed. Not required for correctness
    /// (reads already check `expires_at`) but bounds unbounded growth under
    /// sustained write load, matching the capacity-eviction note in spec.md
    /// §4.C.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        let mut guard = self.entries.write().expect("local cache lock poisoned");
        guard.retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("local cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = LocalCache::new(Duration::from_millis(1));
        cache.set("k".to_string(), Bytes::from_static(b"v"), None);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn get_multi_filters_misses() {
        let cache = LocalCache::new(Duration::from_secs(60));
        cache.set("a".to_string(), Bytes::from_static(b"1"), None);
        let result = cache.get_multi(&["a".to_string(), "b".to_string()]);
        assert_eq!(result.len(), 1);
        assert!(result.contains_key("a"));
    }
}

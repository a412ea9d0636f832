use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Request-coalescing throttle for the `GetMulti` batch path (spec.md §4.C):
/// remembers the last time each key was queried against the remote tier so a
/// burst of misses for the same key doesn't hammer the remote backend.
pub struct ThrottleMap {
    last_query: Mutex<HashMap<String, Instant>>,
    batch_throttle: Duration,
    max_entries: usize,
}

impl ThrottleMap {
    pub fn new(batch_throttle: Duration, max_entries: usize) -> Self {
        Self {
            last_query: Mutex::new(HashMap::new()),
            batch_throttle,
            max_entries,
        }
    }

    /// Given candidate miss keys, return the subset that's allowed through to
    /// the remote tier right now (i.e. not queried within `batch_throttle`).
    pub fn filter_allowed(&self, keys: &[String]) -> Vec<String> {
        let now = Instant::now();
        let guard = self.last_query.lock().expect("throttle mutex poisoned");
        keys.iter()
            .filter(|key| match guard.get(key.as_str()) {
                Some(last) => now.duration_since(*last) >= self.batch_throttle,
                None => true,
            })
            .cloned()
            .collect()
    }

    /// Stamp every key that was actually queried, and opportunistically evict
    /// stale entries once the map grows past `max_entries`.
    pub fn stamp(&self, keys: &[String]) {
        let now = Instant::now();
        let mut guard = self.last_query.lock().expect("throttle mutex poisoned");
        for key in keys {
            guard.insert(key.clone(), now);
        }
        if guard.len() > self.max_entries {
            let cutoff = self.batch_throttle * 2;
            guard.retain(|_, last| now.duration_since(*last) < cutoff);
        }
    }

    pub fn len(&self) -> usize {
        self.last_query.lock().expect("throttle mutex poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recently_queried_keys_are_throttled() {
        let map = ThrottleMap::new(Duration::from_millis(50), 100);
        let keys = vec!["a".to_string()];
        map.stamp(&keys);
        let allowed = map.filter_allowed(&keys);
        assert!(allowed.is_empty());
        std::thread::sleep(Duration::from_millis(60));
        let allowed = map.filter_allowed(&keys);
        assert_eq!(allowed, keys);
    }

    #[test]
    fn evicts_stale_entries_past_capacity() {
        let map = ThrottleMap::new(Duration::from_millis(1), 2);
        map.stamp(&["a".to_string()]);
        std::thread::sleep(Duration::from_millis(5));
        map.stamp(&["b".to_string(), "c".to_string()]);
        assert!(map.len() <= 3);
    }
}

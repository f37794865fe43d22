//! TTL cache for enrichment lookups.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// A keyed cache whose entries expire after a fixed time-to-live.
///
/// Expiry is lazy: stale entries are discarded on access, never by a
/// background task. Timestamps come from `tokio::time`, so tests under a
/// paused clock can advance time deterministically.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    /// Creates an empty cache with the given time-to-live.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the fresh value under `key`, discarding it if stale.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((stored, value)) if stored.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores `value` under `key` with a fresh timestamp.
    pub fn insert(&self, key: K, value: V) {
        self.entries.lock().insert(key, (Instant::now(), value));
    }

    /// Number of entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = TtlCache::new(Duration::from_secs(300));
        cache.insert("U1".to_string(), "alice".to_string());

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get(&"U1".to_string()).as_deref(), Some("alice"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get(&"U1".to_string()), None);
        // The stale entry was discarded on access.
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn insert_refreshes_the_clock() {
        let cache = TtlCache::new(Duration::from_secs(10));
        cache.insert(1, "a");
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.insert(1, "b");
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get(&1), Some("b"));
    }
}

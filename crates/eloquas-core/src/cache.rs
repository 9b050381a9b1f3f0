// Process-local TTL cache used for platform lookups and LinkedIn OAuth
// state. Entries vanish on restart.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    /// Remove and return a live entry. Used for one-shot values such as
    /// OAuth state tokens.
    pub fn take(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.lock();
        let (stored_at, value) = entries.remove(key)?;
        (now.duration_since(stored_at) < self.ttl).then_some(value)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some((stored_at, value)) if now.duration_since(*stored_at) < self.ttl => {
                Some(value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn insert_at(&self, key: K, value: V, now: Instant) {
        let ttl = self.ttl;
        let mut entries = self.lock();
        entries.retain(|_, (stored_at, _)| now.duration_since(*stored_at) < ttl);
        entries.insert(key, (now, value));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, (Instant, V)>> {
        self.entries.lock().expect("cache mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entries_are_returned() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("acme".to_string(), 42);
        assert_eq!(cache.get(&"acme".to_string()), Some(42));
        assert_eq!(cache.get(&"globex".to_string()), None);
    }

    #[test]
    fn stale_entries_are_dropped_on_read() {
        let cache = TtlCache::new(Duration::from_secs(10));
        let start = Instant::now();
        cache.insert_at("k", 1, start);
        assert_eq!(cache.get_at(&"k", start + Duration::from_secs(5)), Some(1));
        assert_eq!(cache.get_at(&"k", start + Duration::from_secs(11)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn insert_sweeps_expired_entries() {
        let cache = TtlCache::new(Duration::from_secs(10));
        let start = Instant::now();
        cache.insert_at("old", 1, start);
        cache.insert_at("new", 2, start + Duration::from_secs(20));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn take_is_one_shot() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("state", "user-1");
        assert_eq!(cache.take(&"state"), Some("user-1"));
        assert_eq!(cache.take(&"state"), None);
    }
}

//! TTL cache keyed by any hashable id.
//!
//! Entries are stamped with the injected clock on insert and treated as
//! absent once older than the TTL. A stale read removes nothing; the next
//! insert overwrites it. A disabled cache never stores anything.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;

use super::clock::Clock;

#[derive(Debug)]
pub struct TtlCache<K, V> {
    name: &'static str,
    data: RwLock<HashMap<K, (V, DateTime<Utc>)>>,
    ttl: Duration,
    enabled: bool,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    pub fn new(name: &'static str, ttl: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            data: RwLock::new(HashMap::new()),
            ttl: Duration::from_std(ttl).unwrap_or(Duration::MAX),
            enabled: true,
            clock,
        }
    }

    /// Cache that always misses
    pub fn disabled(name: &'static str, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            data: RwLock::new(HashMap::new()),
            ttl: Duration::zero(),
            enabled: false,
            clock,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        if !self.enabled {
            return None;
        }

        let now = self.clock.now();
        let cache = self.data.read();
        match cache.get(key) {
            Some((value, cached_at)) if now - *cached_at < self.ttl => {
                debug!(cache = self.name, ?key, "Cache hit");
                Some(value.clone())
            }
            Some(_) => {
                debug!(cache = self.name, ?key, "Cache entry expired");
                None
            }
            None => {
                debug!(cache = self.name, ?key, "Cache miss");
                None
            }
        }
    }

    pub fn insert(&self, key: K, value: V) {
        if !self.enabled {
            return;
        }
        let now = self.clock.now();
        self.data.write().insert(key, (value, now));
    }

    pub fn invalidate(&self, key: &K) {
        if self.data.write().remove(key).is_some() {
            debug!(cache = self.name, ?key, "Invalidated cache entry");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;

    fn cache_with_clock(ttl_secs: u64) -> (TtlCache<i64, usize>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let cache = TtlCache::new(
            "workload",
            std::time::Duration::from_secs(ttl_secs),
            clock.clone(),
        );
        (cache, clock)
    }

    #[test]
    fn test_entry_expires_lazily() {
        let (cache, clock) = cache_with_clock(30);
        cache.insert(7, 3);
        assert_eq!(cache.get(&7), Some(3));

        clock.advance(Duration::seconds(29));
        assert_eq!(cache.get(&7), Some(3));

        clock.advance(Duration::seconds(1));
        assert_eq!(cache.get(&7), None);
    }

    #[test]
    fn test_invalidate_and_reinsert() {
        let (cache, _clock) = cache_with_clock(30);
        cache.insert(1, 10);
        cache.invalidate(&1);
        assert_eq!(cache.get(&1), None);
        cache.insert(1, 11);
        assert_eq!(cache.get(&1), Some(11));
    }

    #[test]
    fn test_disabled_cache_never_hits() {
        let cache: TtlCache<i64, usize> =
            TtlCache::disabled("roles", Arc::new(ManualClock::default()));
        cache.insert(1, 1);
        assert_eq!(cache.get(&1), None);
        assert!(!cache.is_enabled());
    }
}

//! TTL-bounded response cache.
//!
//! Values past their TTL are never returned. Access is guarded by a mutex;
//! the cache is shared across all workers of a service instance. Capacity
//! is bounded: when full, the entry closest to expiry is evicted.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheSlot<V> {
    value: V,
    expires_at: Instant,
}

/// A concurrent cache whose entries expire after a per-entry TTL.
pub struct TtlCache<K, V> {
    slots: Mutex<HashMap<K, CacheSlot<V>>>,
    max_entries: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    /// Create a cache bounded to `max_entries` live entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// Fetch a live value. Expired entries are removed and reported as
    /// misses.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut slots = self.slots.lock().expect("cache lock poisoned");
        match slots.get(key) {
            Some(slot) if slot.expires_at > Instant::now() => Some(slot.value.clone()),
            Some(_) => {
                slots.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert a value with the given TTL, evicting the soonest-to-expire
    /// entry if the cache is full.
    pub fn insert(&self, key: K, value: V, ttl: Duration) {
        let mut slots = self.slots.lock().expect("cache lock poisoned");
        let now = Instant::now();
        slots.retain(|_, slot| slot.expires_at > now);
        if slots.len() >= self.max_entries && !slots.contains_key(&key) {
            if let Some(evict) = slots
                .iter()
                .min_by_key(|(_, slot)| slot.expires_at)
                .map(|(k, _)| k.clone())
            {
                slots.remove(&evict);
            }
        }
        slots.insert(
            key,
            CacheSlot {
                value,
                expires_at: now + ttl,
            },
        );
    }

    /// Number of entries currently stored (live or not yet swept).
    pub fn len(&self) -> usize {
        self.slots.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.slots.lock().expect("cache lock poisoned").clear();
    }
}

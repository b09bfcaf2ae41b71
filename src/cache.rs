//! In-process key/value cache with per-entry TTL, bounded by LRU capacity.

use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    /// Monotonic deadline.
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
pub struct TtlCache<K: Hash + Eq, V> {
    entries: LruCache<K, CacheEntry<V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Value for `key` if present and not expired. Expired entries are dropped on read.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                self.entries.pop(key);
                None
            }
            None => None,
        }
    }

    /// Stores `value`. On a full cache expired entries go first, then the least recently used.
    pub fn set(&mut self, key: K, value: V, ttl: Duration) {
        if !self.entries.contains(&key) && self.entries.len() >= self.entries.cap().get() {
            self.purge_expired();
        }
        if let Some((evicted, _)) = self.entries.push(key.clone(), CacheEntry::new(value, ttl))
            && evicted != key
        {
            trace!("evicted least recently used cache entry");
        }
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.pop(key).map(|e| e.value)
    }

    /// Number of stored entries, including ones that expired but were not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.entries.pop(key);
        }
        if !expired.is_empty() {
            trace!(purged = expired.len(), "purged expired cache entries");
        }
        expired.len()
    }
}

/// Cloneable, thread-safe handle over a [`TtlCache`].
#[derive(Debug)]
pub struct SharedTtlCache<K: Hash + Eq, V> {
    inner: Arc<Mutex<TtlCache<K, V>>>,
}

impl<K: Hash + Eq, V> Clone for SharedTtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> SharedTtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TtlCache::new(max_entries))),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.with(|c| c.get(key))
    }

    pub fn set(&self, key: K, value: V, ttl: Duration) {
        self.with(|c| c.set(key, value, ttl))
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.with(|c| c.remove(key))
    }

    pub fn len(&self) -> usize {
        self.with(|c| c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.with(|c| c.is_empty())
    }

    fn with<R>(&self, f: impl FnOnce(&mut TtlCache<K, V>) -> R) -> R {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

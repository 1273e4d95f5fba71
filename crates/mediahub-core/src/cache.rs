/*!
 * Bounded cache with a fixed time-to-live per entry.
 *
 * Entries expire a fixed duration after they were inserted, no matter how
 * often they are read. When the cache is full, expired entries are dropped
 * first and then the least recently used entry makes room for the new one.
 *
 * The cache itself is not synchronized; owners wrap it in a mutex and keep
 * the critical section free of I/O.
 */
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Longest lifetime a cache entry may be given
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

struct Expiring<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> Expiring<V> {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.inserted_at) >= ttl
    }
}

/// A TTL cache with least-recently-used eviction
pub struct ExpiringCache<K: Hash + Eq, V> {
    entries: LruCache<K, Expiring<V>>,
    ttl: Duration,
}

impl<K: Hash + Eq, V> fmt::Debug for ExpiringCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.entries.cap())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl<K: Hash + Eq + Clone, V> ExpiringCache<K, V> {
    /// Create a cache holding at most `capacity` entries for `ttl` each
    pub fn new(capacity: usize, ttl: Duration) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| Error::config("cache capacity must be at least 1"))?;
        if ttl.is_zero() {
            return Err(Error::config("cache ttl must be greater than zero"));
        }
        if ttl > MAX_TTL {
            return Err(Error::config(format!(
                "cache ttl must not exceed {} seconds",
                MAX_TTL.as_secs()
            )));
        }

        Ok(Self {
            entries: LruCache::new(capacity),
            ttl,
        })
    }

    /// The fixed lifetime of every entry
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a live entry and mark it as most recently used
    ///
    /// An expired entry is removed and reported as absent. Reading never
    /// extends the lifetime of an entry.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let now = Instant::now();
        let ttl = self.ttl;
        if self
            .entries
            .peek(key)
            .map_or(false, |entry| entry.is_expired(now, ttl))
        {
            self.entries.pop(key);
            return None;
        }

        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Whether a live entry exists, without touching recency
    pub fn contains(&self, key: &K) -> bool {
        let now = Instant::now();
        self.entries
            .peek(key)
            .map_or(false, |entry| !entry.is_expired(now, self.ttl))
    }

    /// Insert or overwrite an entry with a fresh lifetime
    ///
    /// Returns the entries that had to leave the cache to admit the new one:
    /// expired entries first, then the least recently used live entry if the
    /// cache was still full. Overwriting an existing key displaces nothing.
    pub fn insert(&mut self, key: K, value: V) -> Vec<(K, V)> {
        let entry = Expiring {
            value,
            inserted_at: Instant::now(),
        };

        if self.entries.contains(&key) {
            self.entries.put(key, entry);
            return Vec::new();
        }

        let mut displaced = Vec::new();
        if self.entries.len() >= self.capacity() {
            displaced = self.purge_expired();
        }

        if let Some((evicted_key, evicted)) = self.entries.push(key, entry) {
            displaced.push((evicted_key, evicted.value));
        }

        displaced
    }

    /// Remove a live entry and hand it to the caller
    ///
    /// An expired entry is dropped and reported as absent.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let now = Instant::now();
        let entry = self.entries.pop(key)?;
        if entry.is_expired(now, self.ttl) {
            None
        } else {
            Some(entry.value)
        }
    }

    /// Remove every expired entry and return them
    pub fn purge_expired(&mut self) -> Vec<(K, V)> {
        let now = Instant::now();
        let ttl = self.ttl;
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now, ttl))
            .map(|(key, _)| key.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|key| self.entries.pop(&key).map(|entry| (key, entry.value)))
            .collect()
    }
}

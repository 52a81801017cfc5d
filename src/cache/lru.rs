//! In-memory LRU cache with a byte budget and per-entry TTL
//!
//! Recency is tracked with a monotonically increasing access tick: every
//! `get` or `put` moves the entry to a fresh tick, and eviction pops the
//! smallest tick from an ordered map. Both operations are O(log n).
//!
//! All bookkeeping happens under one mutex that is never held across I/O or
//! an `.await`. Values are cloned out, so callers own what they receive.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Approximate in-memory footprint of a cached value, in bytes
pub trait CacheWeight {
    fn weight(&self) -> usize;
}

impl CacheWeight for Vec<u8> {
    fn weight(&self) -> usize {
        self.len()
    }
}

impl CacheWeight for String {
    fn weight(&self) -> usize {
        self.len()
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to make room
    pub evictions: u64,
    /// Entries dropped because their TTL passed
    pub expirations: u64,
    /// Entries refused because they exceed the whole budget
    pub rejections: u64,
    pub current_size: usize,
    pub entry_count: usize,
}

impl CacheStats {
    /// Hit ratio in `[0, 1]`, 0 before any lookup
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Entry<V> {
    value: V,
    size: usize,
    created_at: Instant,
    ttl: Duration,
    tick: u64,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    order: BTreeMap<u64, K>,
    next_tick: u64,
    current_size: usize,
    stats: CacheStats,
}

impl<K: Eq + Hash + Clone, V> Inner<K, V> {
    fn tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &K) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.tick);
        self.current_size -= entry.size;
        Some(entry)
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        self.stats.expirations += expired.len() as u64;
        expired.len()
    }

    fn evict_lru(&mut self) -> bool {
        let Some((_, key)) = self.order.pop_first() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.current_size -= entry.size;
        }
        self.stats.evictions += 1;
        true
    }
}

/// Thread-safe LRU cache bounded by total byte weight
pub struct LruCache<K, V> {
    max_bytes: usize,
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: CacheWeight + Clone,
{
    /// Create a cache holding at most `max_bytes` of values
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_tick: 0,
                current_size: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        // Bookkeeping stays consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Byte budget
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Look up a value, refreshing its recency
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.lock();

        let expired = match inner.entries.get(key) {
            None => {
                inner.stats.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            inner.remove(key);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            tracing::debug!(?key, "Cache entry expired");
            return None;
        }

        let tick = inner.tick();
        let entry = inner.entries.get_mut(key)?;
        let old_tick = std::mem::replace(&mut entry.tick, tick);
        let value = entry.value.clone();
        inner.order.remove(&old_tick);
        inner.order.insert(tick, key.clone());
        inner.stats.hits += 1;
        Some(value)
    }

    /// Insert or replace a value with a time-to-live
    ///
    /// Makes room by dropping expired entries first, then least-recently-used
    /// ones until the value fits. Returns false (and stores nothing) when the
    /// value alone exceeds the budget.
    pub fn put(&self, key: K, value: V, ttl: Duration) -> bool {
        let size = value.weight();
        let mut inner = self.lock();

        if size > self.max_bytes {
            inner.stats.rejections += 1;
            tracing::warn!(
                ?key,
                size,
                budget = self.max_bytes,
                "Cache entry larger than the whole budget, not cached"
            );
            return false;
        }

        inner.remove(&key);
        if inner.current_size + size > self.max_bytes {
            let purged = inner.purge_expired(Instant::now());
            if purged > 0 {
                tracing::debug!(purged, "Dropped expired cache entries to make room");
            }
        }
        while inner.current_size + size > self.max_bytes {
            if !inner.evict_lru() {
                break;
            }
        }

        let tick = inner.tick();
        inner.order.insert(tick, key.clone());
        inner.current_size += size;
        inner.entries.insert(
            key,
            Entry {
                value,
                size,
                created_at: Instant::now(),
                ttl,
                tick,
            },
        );
        true
    }

    /// Remove an entry, returning whether it was present
    pub fn remove(&self, key: &K) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Whether a live entry exists, without touching recency or counters
    pub fn contains(&self, key: &K) -> bool {
        let now = Instant::now();
        self.lock()
            .entries
            .get(key)
            .map(|e| !e.is_expired(now))
            .unwrap_or(false)
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
        inner.current_size = 0;
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counter snapshot
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            current_size: inner.current_size,
            entry_count: inner.entries.len(),
            ..inner.stats
        }
    }
}

//! Per-key single-flight locks
//!
//! Concurrent computations of the same cache key queue behind one async
//! mutex; the first computes and fills the cache, the rest re-check the
//! cache once they get the lock.
//!
//! The map only holds weak handles. A key's entry dies with the last guard
//! or queued waiter holding its mutex, including a waiter whose future was
//! dropped mid-wait, and dead entries are swept on the next `lock`.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Weak<AsyncMutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

/// Held while computing a key; removes the lock entry when uncontended
pub struct FlightGuard<'a, K: Eq + Hash + Clone> {
    owner: &'a KeyedLocks<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<K, Weak<AsyncMutex<()>>>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &K) -> FlightGuard<'_, K> {
        let mutex = {
            let mut locks = self.map();
            locks.retain(|_, m| m.strong_count() > 0);
            match locks.get(key).and_then(Weak::upgrade) {
                Some(mutex) => mutex,
                None => {
                    let mutex = Arc::new(AsyncMutex::new(()));
                    locks.insert(key.clone(), Arc::downgrade(&mutex));
                    mutex
                }
            }
        };
        let guard = mutex.lock_owned().await;
        FlightGuard {
            owner: self,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    /// Keys with a computation in flight or queued
    pub fn in_flight(&self) -> usize {
        self.map().values().filter(|m| m.strong_count() > 0).count()
    }
}

impl<K: Eq + Hash + Clone> Drop for FlightGuard<'_, K> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.owner.map();
        // Nobody holds or waits on the mutex any more
        if locks.get(&self.key).map_or(false, |m| m.strong_count() == 0) {
            locks.remove(&self.key);
        }
    }
}

//! Memory-first cache with an optional disk tier behind it
//!
//! Lookups try memory, then disk; a disk hit is promoted into memory with
//! whatever TTL it has left. Writes go to both tiers. Disk failures are
//! logged and degrade to a miss, they never fail a query.

use crate::cache::disk::DiskCache;
use crate::cache::key::CacheKey;
use crate::cache::lru::{CacheStats, CacheWeight, LruCache};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Stats for both tiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct TieredStats {
    pub memory: CacheStats,
    pub disk: Option<CacheStats>,
}

pub struct TieredCache<V> {
    memory: LruCache<CacheKey, V>,
    disk: Option<Arc<DiskCache<V>>>,
}

impl<V> TieredCache<V>
where
    V: CacheWeight + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Memory-only cache
    pub fn memory(max_bytes: usize) -> Self {
        Self {
            memory: LruCache::new(max_bytes),
            disk: None,
        }
    }

    /// Memory cache backed by a disk tier
    pub fn with_disk(max_bytes: usize, disk: DiskCache<V>) -> Self {
        Self {
            memory: LruCache::new(max_bytes),
            disk: Some(Arc::new(disk)),
        }
    }

    pub fn has_disk(&self) -> bool {
        self.disk.is_some()
    }

    /// Look up a value in memory, then on disk
    pub async fn get(&self, key: &CacheKey) -> Option<V> {
        if let Some(value) = self.memory.get(key) {
            tracing::debug!(%key, "Memory cache hit");
            return Some(value);
        }

        let disk = Arc::clone(self.disk.as_ref()?);
        let fingerprint = key.fingerprint();
        let found = tokio::task::spawn_blocking(move || disk.get(&fingerprint)).await;

        match found {
            Ok(Ok(Some((value, remaining)))) => {
                tracing::debug!(%key, "Disk cache hit, promoting");
                self.memory.put(key.clone(), value.clone(), remaining);
                Some(value)
            }
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                tracing::warn!(%key, "Disk cache read failed: {}", e);
                None
            }
            Err(e) => {
                tracing::warn!(%key, "Disk cache task failed: {}", e);
                None
            }
        }
    }

    /// Store a value in both tiers
    ///
    /// Returns whether the memory tier accepted it.
    pub async fn put(&self, key: CacheKey, value: V, ttl: Duration) -> bool {
        let disk_write = self.disk.as_ref().map(|disk| {
            let disk = Arc::clone(disk);
            let fingerprint = key.fingerprint();
            let value = value.clone();
            tokio::task::spawn_blocking(move || disk.put(&fingerprint, &value, ttl))
        });

        let accepted = self.memory.put(key.clone(), value, ttl);

        if let Some(handle) = disk_write {
            match handle.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!(%key, "Disk cache write failed: {}", e),
                Err(e) => tracing::warn!(%key, "Disk cache task failed: {}", e),
            }
        }
        accepted
    }

    /// Drop an entry from both tiers
    pub async fn remove(&self, key: &CacheKey) {
        self.memory.remove(key);
        if let Some(disk) = &self.disk {
            let disk = Arc::clone(disk);
            let fingerprint = key.fingerprint();
            if let Ok(Err(e)) = tokio::task::spawn_blocking(move || disk.remove(&fingerprint)).await {
                tracing::warn!("Disk cache remove failed: {}", e);
            }
        }
    }

    /// Drop everything from both tiers
    pub async fn clear(&self) {
        self.memory.clear();
        if let Some(disk) = &self.disk {
            let disk = Arc::clone(disk);
            if let Ok(Err(e)) = tokio::task::spawn_blocking(move || disk.clear()).await {
                tracing::warn!("Disk cache clear failed: {}", e);
            }
        }
    }

    /// Whether memory holds a live entry (no counters touched)
    pub fn contains_in_memory(&self, key: &CacheKey) -> bool {
        self.memory.contains(key)
    }

    pub fn memory_stats(&self) -> CacheStats {
        self.memory.stats()
    }

    pub async fn stats(&self) -> TieredStats {
        let disk = match &self.disk {
            Some(disk) => {
                let disk = Arc::clone(disk);
                match tokio::task::spawn_blocking(move || disk.stats()).await {
                    Ok(Ok(stats)) => Some(stats),
                    _ => None,
                }
            }
            None => None,
        };
        TieredStats {
            memory: self.memory.stats(),
            disk,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EntityFilter;
    use crate::resolution::{PlanSegment, ResolutionTier, SegmentSource};
    use crate::storage::{Domain, TimeRange};
    use tempfile::tempdir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn key(end: i64) -> CacheKey {
        CacheKey::new(
            Domain::Price,
            "price_by_region",
            &EntityFilter::All,
            vec![PlanSegment::new(
                TimeRange::try_new(0, end).unwrap(),
                SegmentSource::Tier(ResolutionTier::Coarse),
            )],
        )
    }

    #[tokio::test]
    async fn test_memory_only() {
        let cache: TieredCache<String> = TieredCache::memory(1024);
        assert!(cache.get(&key(1)).await.is_none());
        assert!(cache.put(key(1), "v".to_string(), HOUR).await);
        assert_eq!(cache.get(&key(1)).await.as_deref(), Some("v"));
        assert!(cache.stats().await.disk.is_none());
    }

    #[tokio::test]
    async fn test_disk_hit_is_promoted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let disk = DiskCache::open(&path, 1 << 20).unwrap();
            let cache: TieredCache<String> = TieredCache::with_disk(1024, disk);
            cache.put(key(5), "persisted".to_string(), HOUR).await;
        }

        // Fresh memory tier over the same disk file
        let disk = DiskCache::open(&path, 1 << 20).unwrap();
        let cache: TieredCache<String> = TieredCache::with_disk(1024, disk);
        assert!(!cache.contains_in_memory(&key(5)));

        assert_eq!(cache.get(&key(5)).await.as_deref(), Some("persisted"));
        assert!(cache.contains_in_memory(&key(5)));

        let stats = cache.stats().await;
        assert_eq!(stats.disk.unwrap().hits, 1);
    }

    #[tokio::test]
    async fn test_remove_and_clear_both_tiers() {
        let dir = tempdir().unwrap();
        let disk = DiskCache::open(dir.path().join("cache.db"), 1 << 20).unwrap();
        let cache: TieredCache<String> = TieredCache::with_disk(1024, disk);

        cache.put(key(1), "a".to_string(), HOUR).await;
        cache.put(key(2), "b".to_string(), HOUR).await;
        cache.remove(&key(1)).await;
        assert!(cache.get(&key(1)).await.is_none());

        cache.clear().await;
        assert!(cache.get(&key(2)).await.is_none());
        assert_eq!(cache.stats().await.disk.unwrap().entry_count, 0);
    }
}

//! SQLite-backed second cache tier
//!
//! Entries survive restarts. Each payload is stored as
//! `lz4(bincode(value))` together with a CRC32 of the compressed bytes;
//! a row whose checksum or encoding does not verify is deleted and treated
//! as a miss.
//!
//! TTL and the byte budget behave as in the memory tier. Recency is a
//! persisted access counter, so eviction order is stable across restarts.
//!
//! All calls are blocking. Async callers go through `spawn_blocking`.

use crate::cache::lru::CacheStats;
use crate::cache::{CacheError, CacheResult};
use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

struct DiskInner {
    conn: Connection,
    next_tick: i64,
    stats: CacheStats,
}

/// Persistent cache of serialisable values keyed by fingerprint
pub struct DiskCache<V> {
    path: PathBuf,
    max_bytes: usize,
    inner: Mutex<DiskInner>,
    _marker: PhantomData<fn() -> V>,
}

impl<V: Serialize + DeserializeOwned> DiskCache<V> {
    /// Open or create the cache database at `path`
    pub fn open(path: impl Into<PathBuf>, max_bytes: usize) -> CacheResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            CREATE TABLE IF NOT EXISTS cache_entries (
                key         TEXT PRIMARY KEY,
                payload     BLOB NOT NULL,
                checksum    INTEGER NOT NULL,
                size        INTEGER NOT NULL,
                created_at  INTEGER NOT NULL,
                ttl_ms      INTEGER NOT NULL,
                last_access INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_last_access ON cache_entries(last_access);
            ",
        )?;

        let next_tick: i64 =
            conn.query_row("SELECT COALESCE(MAX(last_access), 0) FROM cache_entries", [], |r| {
                r.get(0)
            })?;

        tracing::info!("Opened disk cache at {:?} (budget {} bytes)", path, max_bytes);

        Ok(Self {
            path,
            max_bytes,
            inner: Mutex::new(DiskInner {
                conn,
                next_tick,
                stats: CacheStats::default(),
            }),
            _marker: PhantomData,
        })
    }

    fn lock(&self) -> MutexGuard<'_, DiskInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a value and its remaining time-to-live
    pub fn get(&self, key: &str) -> CacheResult<Option<(V, Duration)>> {
        let now = Utc::now().timestamp_millis();
        let mut inner = self.lock();

        let row: Option<(Vec<u8>, i64, i64, i64)> = inner
            .conn
            .query_row(
                "SELECT payload, checksum, created_at, ttl_ms FROM cache_entries WHERE key = ?1",
                params![key],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()?;

        let Some((payload, checksum, created_at, ttl_ms)) = row else {
            inner.stats.misses += 1;
            return Ok(None);
        };

        let age = now - created_at;
        if age >= ttl_ms {
            inner
                .conn
                .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            return Ok(None);
        }

        let value = match decode::<V>(&payload, checksum) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, "Dropping corrupt disk cache entry: {}", e);
                inner
                    .conn
                    .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
                inner.stats.misses += 1;
                return Ok(None);
            }
        };

        inner.next_tick += 1;
        let tick = inner.next_tick;
        inner.conn.execute(
            "UPDATE cache_entries SET last_access = ?1 WHERE key = ?2",
            params![tick, key],
        )?;
        inner.stats.hits += 1;

        let remaining = Duration::from_millis((ttl_ms - age).max(0) as u64);
        Ok(Some((value, remaining)))
    }

    /// Store a value, evicting least-recently-used rows to stay in budget
    ///
    /// Returns `Ok(false)` when the encoded value alone exceeds the budget.
    pub fn put(&self, key: &str, value: &V, ttl: Duration) -> CacheResult<bool> {
        let payload = encode(value)?;
        let size = payload.len();
        let checksum = crc32fast::hash(&payload) as i64;
        let now = Utc::now().timestamp_millis();

        let mut inner = self.lock();
        if size > self.max_bytes {
            inner.stats.rejections += 1;
            tracing::warn!(key, size, budget = self.max_bytes, "Disk cache entry too large");
            return Ok(false);
        }

        inner.next_tick += 1;
        let tick = inner.next_tick;

        let tx = inner.conn.transaction()?;
        tx.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;

        let mut evicted = 0u64;
        loop {
            let used: i64 =
                tx.query_row("SELECT COALESCE(SUM(size), 0) FROM cache_entries", [], |r| r.get(0))?;
            if used as usize + size <= self.max_bytes {
                break;
            }
            let removed = tx.execute(
                "DELETE FROM cache_entries WHERE key =
                    (SELECT key FROM cache_entries ORDER BY last_access ASC LIMIT 1)",
                [],
            )?;
            if removed == 0 {
                break;
            }
            evicted += 1;
        }

        tx.execute(
            "INSERT INTO cache_entries (key, payload, checksum, size, created_at, ttl_ms, last_access)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                key,
                payload,
                checksum,
                size as i64,
                now,
                ttl.as_millis() as i64,
                tick
            ],
        )?;
        tx.commit()?;

        inner.stats.evictions += evicted;
        Ok(true)
    }

    pub fn remove(&self, key: &str) -> CacheResult<bool> {
        let inner = self.lock();
        let n = inner
            .conn
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        Ok(n > 0)
    }

    pub fn clear(&self) -> CacheResult<()> {
        self.lock().conn.execute("DELETE FROM cache_entries", [])?;
        Ok(())
    }

    /// Counter snapshot, with size and count read from the table
    pub fn stats(&self) -> CacheResult<CacheStats> {
        let inner = self.lock();
        let (size, count): (i64, i64) = inner.conn.query_row(
            "SELECT COALESCE(SUM(size), 0), COUNT(*) FROM cache_entries",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        Ok(CacheStats {
            current_size: size as usize,
            entry_count: count as usize,
            ..inner.stats
        })
    }
}

fn encode<V: Serialize>(value: &V) -> CacheResult<Vec<u8>> {
    let serialized = bincode::serialize(value)?;
    Ok(lz4_flex::compress_prepend_size(&serialized))
}

fn decode<V: DeserializeOwned>(payload: &[u8], checksum: i64) -> CacheResult<V> {
    let computed = crc32fast::hash(payload) as i64;
    if computed != checksum {
        return Err(CacheError::Corrupt(format!(
            "checksum mismatch: expected {:08x}, got {:08x}",
            checksum, computed
        )));
    }
    let decompressed = lz4_flex::decompress_size_prepended(payload)
        .map_err(|e| CacheError::Corrupt(format!("decompression failed: {}", e)))?;
    Ok(bincode::deserialize(&decompressed)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_put_get_roundtrip() {
        let dir = tempdir().unwrap();
        let cache: DiskCache<Vec<f64>> = DiskCache::open(dir.path().join("c.db"), 1 << 20).unwrap();

        assert!(cache.put("k", &vec![1.5, 2.5], HOUR).unwrap());
        let (value, remaining) = cache.get("k").unwrap().unwrap();
        assert_eq!(value, vec![1.5, 2.5]);
        assert!(remaining <= HOUR);
        assert!(cache.get("other").unwrap().is_none());

        let stats = cache.stats().unwrap();
        assert_eq!((stats.hits, stats.misses, stats.entry_count), (1, 1, 1));
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.db");
        {
            let cache: DiskCache<String> = DiskCache::open(&path, 1 << 20).unwrap();
            cache.put("k", &"persisted".to_string(), HOUR).unwrap();
        }
        let cache: DiskCache<String> = DiskCache::open(&path, 1 << 20).unwrap();
        assert_eq!(cache.get("k").unwrap().unwrap().0, "persisted");
    }

    #[test]
    fn test_expiry() {
        let dir = tempdir().unwrap();
        let cache: DiskCache<String> = DiskCache::open(dir.path().join("c.db"), 1 << 20).unwrap();
        cache
            .put("k", &"v".to_string(), Duration::from_millis(10))
            .unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get("k").unwrap().is_none());
        assert_eq!(cache.stats().unwrap().entry_count, 0);
    }

    #[test]
    fn test_corrupt_row_is_a_miss() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.db");
        let cache: DiskCache<String> = DiskCache::open(&path, 1 << 20).unwrap();
        cache.put("k", &"value".to_string(), HOUR).unwrap();

        let raw = Connection::open(&path).unwrap();
        raw.execute("UPDATE cache_entries SET checksum = checksum + 1", [])
            .unwrap();
        drop(raw);

        assert!(cache.get("k").unwrap().is_none());
        assert_eq!(cache.stats().unwrap().entry_count, 0);
    }

    #[test]
    fn test_budget_evicts_least_recent() {
        let dir = tempdir().unwrap();
        let probe = encode(&vec![0u8; 64]).unwrap().len();
        let cache: DiskCache<Vec<u8>> =
            DiskCache::open(dir.path().join("c.db"), probe * 2).unwrap();

        cache.put("a", &vec![0u8; 64], HOUR).unwrap();
        cache.put("b", &vec![0u8; 64], HOUR).unwrap();
        // Touch a, so b is evicted next
        assert!(cache.get("a").unwrap().is_some());
        cache.put("c", &vec![0u8; 64], HOUR).unwrap();

        assert!(cache.get("a").unwrap().is_some());
        assert!(cache.get("b").unwrap().is_none());
        assert!(cache.get("c").unwrap().is_some());
        let stats = cache.stats().unwrap();
        assert_eq!(stats.evictions, 1);
        assert!(stats.current_size <= probe * 2);
    }

    #[test]
    fn test_oversized_rejected() {
        let dir = tempdir().unwrap();
        let cache: DiskCache<Vec<u8>> = DiskCache::open(dir.path().join("c.db"), 8).unwrap();
        let noisy: Vec<u8> = (0..255).collect();
        assert!(!cache.put("k", &noisy, HOUR).unwrap());
        assert_eq!(cache.stats().unwrap().rejections, 1);
    }
}

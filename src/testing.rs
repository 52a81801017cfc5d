//! Test fixtures
//!
//! - `FactWriter`: seeds fact tables in a SQLite file
//! - `MemoryStore`: in-memory [`AnalyticalStore`] with fault injection
//! - grid helpers and a small entity catalog

use crate::catalog::{EntityCatalog, EntityInfo};
use crate::resolution::ResolutionTier;
use crate::storage::{AnalyticalStore, ScanRequest, StorageError, StorageResult, TimeRange, TimeSeriesPoint};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const MIN: i64 = 60 * 1000;
pub const HOUR: i64 = 60 * MIN;
pub const DAY: i64 = 24 * HOUR;

/// Writes fact tables into a SQLite file; tables are created on first insert
pub struct FactWriter {
    conn: Connection,
}

impl FactWriter {
    pub fn create(path: &Path) -> rusqlite::Result<Self> {
        Ok(Self {
            conn: Connection::open(path)?,
        })
    }

    pub fn insert(&self, table: &str, points: &[TimeSeriesPoint]) -> rusqlite::Result<()> {
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                ts        INTEGER NOT NULL,
                entity_id TEXT    NOT NULL,
                value     REAL    NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_ts ON {table}(ts);"
        ))?;

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt =
                tx.prepare(&format!("INSERT INTO {table} (ts, entity_id, value) VALUES (?1, ?2, ?3)"))?;
            for p in points {
                stmt.execute(params![p.timestamp, p.entity_id, p.value])?;
            }
        }
        tx.commit()
    }
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    Transient(usize),
    Persistent,
}

/// In-memory analytical store
///
/// Faults and delays apply to `scan` only, so planning probes stay
/// unaffected while segment fetches can be made to fail.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<TimeSeriesPoint>>>,
    faults: Mutex<HashMap<String, Fault>>,
    delays: Mutex<HashMap<String, Duration>>,
    scans: AtomicUsize,
    stamp_reads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append points to a table, creating it if needed
    pub fn insert(&self, table: &str, points: Vec<TimeSeriesPoint>) {
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        rows.extend(points);
        rows.sort_by(|a, b| (a.timestamp, &a.entity_id).cmp(&(b.timestamp, &b.entity_id)));
    }

    /// Make the next `times` scans of `table` fail with a transient error
    pub fn fail_transient(&self, table: &str, times: usize) {
        self.faults
            .lock()
            .unwrap()
            .insert(table.to_string(), Fault::Transient(times));
    }

    /// Make every scan of `table` fail with a transient error
    pub fn fail_always(&self, table: &str) {
        self.faults
            .lock()
            .unwrap()
            .insert(table.to_string(), Fault::Persistent);
    }

    /// Delay every scan of `table`
    pub fn delay(&self, table: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(table.to_string(), delay);
    }

    /// Number of scans issued so far
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    /// Number of timestamp scans issued so far
    pub fn timestamp_scans(&self) -> usize {
        self.stamp_reads.load(Ordering::SeqCst)
    }

    fn check_fault(&self, table: &str) -> StorageResult<()> {
        let mut faults = self.faults.lock().unwrap();
        match faults.get_mut(table) {
            Some(Fault::Persistent) => Err(StorageError::Transient(format!("{} unavailable", table))),
            Some(Fault::Transient(n)) if *n > 0 => {
                *n -= 1;
                Err(StorageError::Transient(format!("{} busy", table)))
            }
            _ => Ok(()),
        }
    }

    fn rows(&self, table: &str) -> StorageResult<Vec<TimeSeriesPoint>> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .ok_or_else(|| StorageError::MissingTable(table.to_string()))
    }
}

#[async_trait]
impl AnalyticalStore for MemoryStore {
    async fn scan(&self, request: &ScanRequest) -> StorageResult<Vec<TimeSeriesPoint>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.lock().unwrap().get(&request.table).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_fault(&request.table)?;

        Ok(self
            .rows(&request.table)?
            .into_iter()
            .filter(|p| request.range.contains(p.timestamp))
            .filter(|p| {
                request
                    .entities
                    .as_ref()
                    .map_or(true, |set| set.contains(&p.entity_id))
            })
            .collect())
    }

    async fn timestamps(&self, table: &str, range: TimeRange) -> StorageResult<Vec<i64>> {
        self.stamp_reads.fetch_add(1, Ordering::SeqCst);
        let mut ts: Vec<i64> = self
            .rows(table)?
            .into_iter()
            .map(|p| p.timestamp)
            .filter(|t| range.contains(*t))
            .collect();
        ts.dedup();
        Ok(ts)
    }

    async fn time_bounds(&self, table: &str) -> StorageResult<Option<(i64, i64)>> {
        let rows = self.rows(table)?;
        Ok(rows
            .first()
            .zip(rows.last())
            .map(|(a, b)| (a.timestamp, b.timestamp)))
    }
}

/// One point per grid timestamp of `tier` in `range`
pub fn grid(tier: ResolutionTier, range: TimeRange, entity: &str, value: f64) -> Vec<TimeSeriesPoint> {
    let step = tier.interval_millis();
    let mut ts = tier.align_up(range.start);
    let mut points = Vec::new();
    while ts < range.end {
        points.push(TimeSeriesPoint::new(ts, entity, value));
        ts += step;
    }
    points
}

/// `[start_day, end_day)` in days since the epoch
pub fn days(start_day: i64, end_day: i64) -> TimeRange {
    TimeRange::try_new(start_day * DAY, end_day * DAY).unwrap()
}

/// Three registered units in two regions
pub fn sample_catalog() -> EntityCatalog {
    EntityCatalog::from_entries(vec![
        EntityInfo::new("BAYSW1", "Bayswater", "Coal", "NSW1").capacity(660.0),
        EntityInfo::new("ER01", "Eraring", "Coal", "NSW1").capacity(720.0),
        EntityInfo::new("HDWF1", "Hornsdale Wind Farm", "Wind", "SA1").capacity(315.0),
    ])
    .unwrap()
}

//! SQLite-backed analytical store
//!
//! Every fact table shares one shape:
//!
//! ```text
//! CREATE TABLE <name> (
//!     ts        INTEGER NOT NULL,   -- interval start, Unix ms
//!     entity_id TEXT    NOT NULL,
//!     value     REAL    NOT NULL
//! )
//! ```
//!
//! Each request opens its own read-only connection on a blocking thread, so
//! concurrent readers never share a handle and no connection pool is kept.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::store::AnalyticalStore;
use crate::storage::types::{ScanRequest, TimeRange, TimeSeriesPoint};
use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Read-only store over a SQLite database file
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Open a store over an existing database file
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("database not found: {}", path.display()),
            )));
        }

        Ok(Self {
            path,
            busy_timeout: Duration::from_millis(250),
        })
    }

    /// Set how long SQLite waits on a locked database before reporting busy
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(path: &Path, busy_timeout: Duration) -> StorageResult<Connection> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(busy_timeout)?;
        Ok(conn)
    }

    /// Run a blocking closure against a fresh read-only connection
    async fn with_connection<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
    {
        let path = self.path.clone();
        let busy_timeout = self.busy_timeout;
        tokio::task::spawn_blocking(move || {
            let conn = Self::connect(&path, busy_timeout)?;
            f(&conn)
        })
        .await?
    }
}

/// Reject anything that is not a plain identifier before it reaches SQL text
fn checked_table(table: &str) -> StorageResult<String> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !table.starts_with(|c: char| c.is_ascii_digit());

    if valid {
        Ok(table.to_string())
    } else {
        Err(StorageError::MissingTable(table.to_string()))
    }
}

/// WHERE clause and bound values selecting a time range
fn range_predicate(range: &TimeRange) -> (String, Vec<Value>) {
    if range.is_point() {
        ("ts = ?".to_string(), vec![Value::Integer(range.start)])
    } else {
        (
            "ts >= ? AND ts < ?".to_string(),
            vec![Value::Integer(range.start), Value::Integer(range.end)],
        )
    }
}

#[async_trait]
impl AnalyticalStore for SqliteStore {
    async fn scan(&self, request: &ScanRequest) -> StorageResult<Vec<TimeSeriesPoint>> {
        let table = checked_table(&request.table)?;
        let (mut clause, mut values) = range_predicate(&request.range);

        if let Some(entities) = &request.entities {
            if entities.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; entities.len()].join(", ");
            clause.push_str(&format!(" AND entity_id IN ({})", placeholders));
            values.extend(entities.iter().cloned().map(Value::Text));
        }

        let sql = format!(
            "SELECT ts, entity_id, value FROM {} WHERE {} ORDER BY ts, entity_id",
            table, clause
        );

        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
                Ok(TimeSeriesPoint {
                    timestamp: row.get(0)?,
                    entity_id: row.get(1)?,
                    value: row.get(2)?,
                })
            })?;

            let mut points = Vec::new();
            for row in rows {
                points.push(row?);
            }
            Ok(points)
        })
        .await
    }

    async fn timestamps(&self, table: &str, range: TimeRange) -> StorageResult<Vec<i64>> {
        let table = checked_table(table)?;
        let (clause, values) = range_predicate(&range);
        let sql = format!(
            "SELECT DISTINCT ts FROM {} WHERE {} ORDER BY ts",
            table, clause
        );

        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), |row| row.get(0))?;

            let mut timestamps = Vec::new();
            for row in rows {
                timestamps.push(row?);
            }
            Ok(timestamps)
        })
        .await
    }

    async fn time_bounds(&self, table: &str) -> StorageResult<Option<(i64, i64)>> {
        let table = checked_table(table)?;
        let sql = format!("SELECT MIN(ts), MAX(ts) FROM {}", table);

        self.with_connection(move |conn| {
            let bounds: (Option<i64>, Option<i64>) =
                conn.query_row(&sql, [], |row| Ok((row.get(0)?, row.get(1)?)))?;
            Ok(match bounds {
                (Some(min), Some(max)) => Some((min, max)),
                _ => None,
            })
        })
        .await
    }
}

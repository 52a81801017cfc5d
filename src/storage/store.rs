//! Analytical store interface
//!
//! The engine talks to the column store only through this trait. Every
//! operation is a read; nothing here writes.

use crate::storage::error::StorageResult;
use crate::storage::types::{ScanRequest, TimeRange, TimeSeriesPoint};
use async_trait::async_trait;

/// Read-only access to the analytical store
///
/// Implementations must be safe for concurrent use: the engine issues
/// independent requests from several tasks at once.
#[async_trait]
pub trait AnalyticalStore: Send + Sync {
    /// Read the facts matching a scan, sorted by `(timestamp, entity_id)`
    async fn scan(&self, request: &ScanRequest) -> StorageResult<Vec<TimeSeriesPoint>>;

    /// Distinct timestamps present in `table` within `range`, ascending
    async fn timestamps(&self, table: &str, range: TimeRange) -> StorageResult<Vec<i64>>;

    /// Earliest and latest timestamp in `table`, None when empty
    async fn time_bounds(&self, table: &str) -> StorageResult<Option<(i64, i64)>>;
}

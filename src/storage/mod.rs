//! Analytical storage access
//!
//! The engine never writes facts. This module describes what it reads and
//! how:
//!
//! - **types**: facts, domains, time ranges, scan requests
//! - **layout**: which logical table holds each `(domain, tier)`
//! - **store**: the [`AnalyticalStore`] trait
//! - **sqlite**: the SQLite implementation
//! - **error**: `StorageError`
//!
//! # Read Path
//!
//! ```text
//! ScanRequest → spawn_blocking → read-only connection → SELECT → points
//! ```

pub mod error;
pub mod layout;
pub mod sqlite;
pub mod store;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use layout::TableLayout;
pub use sqlite::SqliteStore;
pub use store::AnalyticalStore;
pub use types::{Domain, ScanRequest, TimeRange, TimeSeriesPoint};

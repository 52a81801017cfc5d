//! Query Engine
//!
//! The consumer-facing read path:
//!
//! - **descriptor**: what a consumer asks for
//! - **manager**: plan → cache → fetch → merge
//! - **result**: tabular results with coverage annotations
//! - **retry**: exponential backoff for transient storage errors
//! - **inflight**: per-key single-flight locks
//! - **error**: `QueryError`
//!
//! # Example
//!
//! ```rust,ignore
//! let ctx = Arc::new(EngineContext::from_config(&Config::load_default())?);
//! let prices = ctx.query_manager(Domain::Price);
//!
//! let descriptor = QueryDescriptor::builder(Domain::Price)
//!     .range(TimeRange::last_days(2))
//!     .filter(EntityFilter::region("NSW1"))
//!     .build()?;
//! let result = prices.query(&descriptor).await?;
//! println!("{} rows, coverage {:.0}%", result.len(), result.coverage.ratio * 100.0);
//! ```

pub mod descriptor;
pub mod error;
pub mod inflight;
pub mod manager;
pub mod result;
pub mod retry;

pub use descriptor::{Completeness, QueryDescriptor, QueryDescriptorBuilder, ResolutionHint};
pub use error::{QueryError, QueryResult};
pub use inflight::KeyedLocks;
pub use manager::QueryManager;
pub use result::{
    format_timestamp, ColumnKind, ColumnSpec, Coverage, Row, SegmentOutcome, SegmentReport,
    TabularResult,
};
pub use retry::RetryPolicy;

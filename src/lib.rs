//! # GridLens
//!
//! Multi-resolution query and caching engine for electricity market time
//! series. Facts (unit generation, regional prices, interconnector flows,
//! rooftop solar) are stored at 5-minute, 30-minute and daily resolution;
//! GridLens picks the right tier for each request, fills gaps from other
//! tiers, aggregates through declarative views and caches the results.
//!
//! ## Modules
//!
//! - [`storage`]: read-only access to the analytical store
//! - [`catalog`]: entity metadata and filters
//! - [`resolution`]: tier math, coverage and planning
//! - [`views`]: aggregation recipes and their executor
//! - [`cache`]: memory and disk result caches
//! - [`query`]: descriptors, the query manager and results
//! - [`config`] / [`context`]: startup wiring
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gridlens::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let ctx = Arc::new(EngineContext::from_config(&config)?);
//!
//!     let generation = ctx.query_manager(Domain::Generation);
//!     let descriptor = QueryDescriptor::builder(Domain::Generation)
//!         .view("revenue_by_fuel")
//!         .range(TimeRange::last_days(2))
//!         .filter(EntityFilter::region("NSW1"))
//!         .build()?;
//!
//!     let result = generation.query(&descriptor).await?;
//!     println!("{}", result.to_csv()?);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod context;
pub mod query;
pub mod resolution;
pub mod storage;
pub mod views;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheKey, CacheStats, DiskCache, LruCache, TieredCache, TtlPolicy};
pub use catalog::{EntityCatalog, EntityFilter, EntityInfo};
pub use config::{Config, ConfigError};
pub use context::{EngineContext, EngineError};
pub use query::{
    Completeness, Coverage, QueryDescriptor, QueryError, QueryManager, QueryResult,
    ResolutionHint, RetryPolicy, Row, SegmentOutcome, TabularResult,
};
pub use resolution::{ResolutionManager, ResolutionPlan, ResolutionTier, SegmentSource};
pub use storage::{
    AnalyticalStore, Domain, SqliteStore, StorageError, StorageResult, TableLayout, TimeRange,
};
pub use views::{AggregationView, ViewRegistry};

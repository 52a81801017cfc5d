//! Aggregation views
//!
//! - **definition**: declarative view recipes and the built-in set
//! - **registry**: named views, bound to a tier on request
//! - **executor**: runs a bound view against the analytical store
//!
//! A recipe is written once and runs unchanged at every tier it supports;
//! the tier-specific parts (tables, interval length) come from binding.
//!
//! ```rust,ignore
//! let registry = ViewRegistry::with_builtin(TableLayout::default());
//! let plan = registry.get_view("revenue_by_fuel", ResolutionTier::Coarse)?;
//! let rows = executor.execute(&plan, range, &EntityFilter::All).await?;
//! ```

pub mod definition;
pub mod executor;
pub mod registry;

pub use definition::{
    builtin_views, default_view, AggregationView, Dimension, JoinSpec, MeasureKind, MeasureSpec,
};
pub use executor::ViewExecutor;
pub use registry::{ViewError, ViewPlan, ViewRegistry};

//! Multi-resolution planning
//!
//! Facts are stored at three tiers (5-minute, 30-minute, daily). This module
//! decides which tier serves which part of a requested range:
//!
//! - **tier / interval**: tier grid math and period counting
//! - **coverage**: which grid timestamps a tier actually holds
//! - **strategy**: pluggable tier selection and gap filling
//! - **plan**: the resulting ordered segments
//! - **manager**: ties the above to the store and view registry
//!
//! ```text
//! descriptor ─▶ select primary ─▶ probe coverage ─┬─ ≥ threshold ─▶ single segment
//!                                                 └─ gaps ─▶ fill from alternates
//! ```

pub mod coverage;
pub mod interval;
pub mod manager;
pub mod plan;
pub mod strategy;
pub mod tier;

pub use coverage::TierPresence;
pub use interval::{
    detect_tier, detect_tier_strict, expected_periods, hours_per_interval, periods_for_days,
    periods_for_hours,
};
pub use manager::ResolutionManager;
pub use plan::{PlanError, PlanSegment, ResolutionPlan, SegmentSource};
pub use strategy::{
    fallback_order, FillContext, GapFiller, HybridGapFiller, NoFallback, SpanThresholdSelector,
    TierSelector,
};
pub use tier::ResolutionTier;

//! Resolution plans
//!
//! A plan says, for every part of a requested range, which tier to read.
//! Segments are in time order and tile the range exactly.

use crate::resolution::tier::ResolutionTier;
use crate::storage::TimeRange;
use serde::{Deserialize, Serialize};

/// Where a plan segment's rows come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentSource {
    /// Read at this tier
    Tier(ResolutionTier),
    /// No tier holds data here
    NoData,
}

impl SegmentSource {
    pub fn tier(&self) -> Option<ResolutionTier> {
        match self {
            SegmentSource::Tier(t) => Some(*t),
            SegmentSource::NoData => None,
        }
    }
}

impl std::fmt::Display for SegmentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentSource::Tier(t) => write!(f, "{}", t),
            SegmentSource::NoData => write!(f, "no-data"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlanSegment {
    pub range: TimeRange,
    pub source: SegmentSource,
}

impl PlanSegment {
    pub fn new(range: TimeRange, source: SegmentSource) -> Self {
        Self { range, source }
    }
}

/// Violations of the tiling invariant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("plan has no segments")]
    Empty,
    #[error("first segment starts at {found}, expected {expected}")]
    BadStart { expected: i64, found: i64 },
    #[error("last segment ends at {found}, expected {expected}")]
    BadEnd { expected: i64, found: i64 },
    #[error("segment {index} does not end where the next one starts")]
    NotContiguous { index: usize },
    #[error("segment {index} is empty")]
    EmptySegment { index: usize },
}

/// Mapping from sub-ranges of a request to tiers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolutionPlan {
    /// Tier preferred for the whole range
    pub primary_tier: ResolutionTier,
    /// Time-ordered, contiguous segments covering the range
    pub segments: Vec<PlanSegment>,
}

impl ResolutionPlan {
    /// A plan reading the whole range at one tier
    pub fn single(range: TimeRange, tier: ResolutionTier) -> Self {
        Self {
            primary_tier: tier,
            segments: vec![PlanSegment::new(range, SegmentSource::Tier(tier))],
        }
    }

    /// A plan for a range no tier holds
    pub fn no_data(range: TimeRange, primary_tier: ResolutionTier) -> Self {
        Self {
            primary_tier,
            segments: vec![PlanSegment::new(range, SegmentSource::NoData)],
        }
    }

    /// Overall range covered by the plan
    pub fn range(&self) -> Option<TimeRange> {
        let first = self.segments.first()?;
        let last = self.segments.last()?;
        TimeRange::try_new(first.range.start, last.range.end)
    }

    /// Whether any part of the range falls back away from the primary tier
    pub fn is_mixed(&self) -> bool {
        self.segments
            .iter()
            .any(|s| s.source != SegmentSource::Tier(self.primary_tier))
    }

    /// Whether every segment is NoData
    pub fn is_all_no_data(&self) -> bool {
        self.segments
            .iter()
            .all(|s| s.source == SegmentSource::NoData)
    }

    pub fn has_no_data(&self) -> bool {
        self.segments
            .iter()
            .any(|s| s.source == SegmentSource::NoData)
    }

    /// Check that the segments tile `range` exactly
    pub fn validate(&self, range: &TimeRange) -> Result<(), PlanError> {
        let first = self.segments.first().ok_or(PlanError::Empty)?;
        if first.range.start != range.start {
            return Err(PlanError::BadStart {
                expected: range.start,
                found: first.range.start,
            });
        }

        for (index, pair) in self.segments.windows(2).enumerate() {
            if pair[0].range.end != pair[1].range.start {
                return Err(PlanError::NotContiguous { index });
            }
        }

        if !range.is_point() {
            if let Some(index) = self.segments.iter().position(|s| s.range.is_point()) {
                return Err(PlanError::EmptySegment { index });
            }
        }

        let last = self.segments.last().ok_or(PlanError::Empty)?;
        if last.range.end != range.end {
            return Err(PlanError::BadEnd {
                expected: range.end,
                found: last.range.end,
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for ResolutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "primary={}", self.primary_tier)?;
        for seg in &self.segments {
            write!(f, " {}:{}", seg.range, seg.source)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: i64, end: i64) -> TimeRange {
        TimeRange::try_new(start, end).unwrap()
    }

    #[test]
    fn test_single_plan_is_valid() {
        let r = range(0, 100);
        let plan = ResolutionPlan::single(r, ResolutionTier::Fine);
        assert!(plan.validate(&r).is_ok());
        assert!(!plan.is_mixed());
        assert_eq!(plan.range(), Some(r));
    }

    #[test]
    fn test_validate_detects_gaps_and_overlaps() {
        let r = range(0, 100);
        let gap = ResolutionPlan {
            primary_tier: ResolutionTier::Fine,
            segments: vec![
                PlanSegment::new(range(0, 40), SegmentSource::Tier(ResolutionTier::Fine)),
                PlanSegment::new(range(50, 100), SegmentSource::Tier(ResolutionTier::Fine)),
            ],
        };
        assert_eq!(gap.validate(&r), Err(PlanError::NotContiguous { index: 0 }));

        let short = ResolutionPlan::single(range(0, 90), ResolutionTier::Fine);
        assert!(matches!(short.validate(&r), Err(PlanError::BadEnd { .. })));

        let empty = ResolutionPlan {
            primary_tier: ResolutionTier::Fine,
            segments: vec![],
        };
        assert_eq!(empty.validate(&r), Err(PlanError::Empty));
    }

    #[test]
    fn test_point_plan() {
        let p = TimeRange::point(300_000);
        let plan = ResolutionPlan::single(p, ResolutionTier::Fine);
        assert!(plan.validate(&p).is_ok());
    }

    #[test]
    fn test_no_data_flags() {
        let plan = ResolutionPlan::no_data(range(0, 10), ResolutionTier::Coarse);
        assert!(plan.is_all_no_data());
        assert!(plan.has_no_data());
        assert!(plan.is_mixed());
    }
}

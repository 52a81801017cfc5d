//! Resolution strategies
//!
//! Tier selection and gap filling are pluggable so the single query path can
//! be tuned by configuration:
//!
//! - [`TierSelector`]: picks the primary tier for a request
//! - [`GapFiller`]: turns primary coverage holes into fallback segments

use crate::resolution::coverage::TierPresence;
use crate::resolution::plan::{PlanSegment, ResolutionPlan, SegmentSource};
use crate::resolution::tier::ResolutionTier;
use crate::storage::TimeRange;

/// Chooses the primary tier for a range
pub trait TierSelector: Send + Sync {
    /// Pick among `available` tiers (finest first); None when empty
    fn select(&self, range: &TimeRange, available: &[ResolutionTier]) -> Option<ResolutionTier>;

    fn name(&self) -> &'static str;
}

/// Picks by span length: short spans read fine data, long spans daily
#[derive(Debug, Clone, Copy)]
pub struct SpanThresholdSelector {
    pub fine_max_days: f64,
    pub coarse_max_days: f64,
}

impl Default for SpanThresholdSelector {
    fn default() -> Self {
        Self {
            fine_max_days: 7.0,
            coarse_max_days: 365.0,
        }
    }
}

impl SpanThresholdSelector {
    pub fn new(fine_max_days: f64, coarse_max_days: f64) -> Self {
        Self {
            fine_max_days,
            coarse_max_days,
        }
    }

    /// Tier the span would use if every tier were available
    pub fn ideal(&self, range: &TimeRange) -> ResolutionTier {
        let days = range.duration_days();
        if days < self.fine_max_days {
            ResolutionTier::Fine
        } else if days < self.coarse_max_days {
            ResolutionTier::Coarse
        } else {
            ResolutionTier::Daily
        }
    }
}

impl TierSelector for SpanThresholdSelector {
    fn select(&self, range: &TimeRange, available: &[ResolutionTier]) -> Option<ResolutionTier> {
        let ideal = self.ideal(range) as i32;
        // Nearest available tier, finer on ties
        available
            .iter()
            .copied()
            .min_by_key(|tier| ((*tier as i32 - ideal).abs(), *tier))
    }

    fn name(&self) -> &'static str {
        "span-threshold"
    }
}

/// Order in which alternate tiers are tried for a primary tier's gaps
pub fn fallback_order(primary: ResolutionTier) -> [ResolutionTier; 2] {
    match primary {
        ResolutionTier::Fine => [ResolutionTier::Coarse, ResolutionTier::Daily],
        ResolutionTier::Coarse => [ResolutionTier::Fine, ResolutionTier::Daily],
        ResolutionTier::Daily => [ResolutionTier::Coarse, ResolutionTier::Fine],
    }
}

/// Inputs to gap filling
#[derive(Debug)]
pub struct FillContext<'a> {
    pub range: TimeRange,
    pub primary: &'a TierPresence,
    /// Alternate tiers in fallback order
    pub alternates: &'a [TierPresence],
    pub coverage_threshold: f64,
    pub min_gap_periods: usize,
}

/// Builds a plan from primary coverage and alternates
pub trait GapFiller: Send + Sync {
    fn fill(&self, ctx: &FillContext<'_>) -> ResolutionPlan;

    /// Whether `fill` looks at alternate tiers (skip probing them if not)
    fn uses_alternates(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str;
}

/// Reads the primary tier only, holes and all
///
/// The range is NoData only when the primary tier holds nothing at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFallback;

impl GapFiller for NoFallback {
    fn fill(&self, ctx: &FillContext<'_>) -> ResolutionPlan {
        if ctx.primary.is_empty() {
            ResolutionPlan::no_data(ctx.range, ctx.primary.tier)
        } else {
            ResolutionPlan::single(ctx.range, ctx.primary.tier)
        }
    }

    fn uses_alternates(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "no-fallback"
    }
}

/// Fills primary gaps from the first alternate tier that covers them
///
/// Each gap is widened to the candidate tier's grid so the fallback segment
/// holds whole intervals of that tier. A candidate passing the coverage
/// threshold wins outright. Otherwise the best candidate with any data
/// serves the stretches it holds, and whatever part of the gap it lacks
/// becomes NoData, as does a gap no tier covers at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct HybridGapFiller;

impl HybridGapFiller {
    fn assign(&self, gap: TimeRange, ctx: &FillContext<'_>) -> Vec<PlanSegment> {
        let mut best: Option<(f64, &TierPresence, TimeRange)> = None;

        for alt in ctx.alternates {
            let snapped = TimeRange {
                start: alt.tier.align_down(gap.start),
                end: alt.tier.align_up(gap.end),
            }
            .clamp_to(&ctx.range);

            let coverage = alt.coverage(&snapped);
            if coverage >= ctx.coverage_threshold {
                return vec![PlanSegment::new(snapped, SegmentSource::Tier(alt.tier))];
            }
            if coverage > 0.0 && best.map_or(true, |(c, _, _)| coverage > c) {
                best = Some((coverage, alt, snapped));
            }
        }

        match best {
            Some((_, alt, snapped)) => split_partial(gap, alt, snapped),
            None => vec![PlanSegment::new(gap, SegmentSource::NoData)],
        }
    }
}

/// Serve `snapped` from `alt` where it holds data, NoData where it doesn't
///
/// Holes are only marked inside the primary gap; any part of a hole outside
/// it is left to the primary tier.
fn split_partial(gap: TimeRange, alt: &TierPresence, snapped: TimeRange) -> Vec<PlanSegment> {
    let source = SegmentSource::Tier(alt.tier);
    let mut out = Vec::new();
    let mut cursor = snapped.start;

    for hole in alt.within(snapped).gaps(1) {
        if hole.start > cursor {
            out.push(PlanSegment::new(
                TimeRange {
                    start: cursor,
                    end: hole.start,
                },
                source,
            ));
        }
        if let Some(missing) = hole.intersection(&gap) {
            out.push(PlanSegment::new(missing, SegmentSource::NoData));
        }
        cursor = hole.end;
    }
    if cursor < snapped.end {
        out.push(PlanSegment::new(
            TimeRange {
                start: cursor,
                end: snapped.end,
            },
            source,
        ));
    }
    out
}

impl GapFiller for HybridGapFiller {
    fn fill(&self, ctx: &FillContext<'_>) -> ResolutionPlan {
        let primary = ctx.primary.tier;
        let gaps = ctx.primary.gaps(ctx.min_gap_periods);
        if gaps.is_empty() {
            return ResolutionPlan::single(ctx.range, primary);
        }

        let mut assigned: Vec<PlanSegment> = gaps.into_iter().flat_map(|g| self.assign(g, ctx)).collect();
        assigned.sort();
        let fills = merge(assigned);

        let mut segments = Vec::with_capacity(fills.len() * 2 + 1);
        let mut cursor = ctx.range.start;
        for fill in fills {
            if fill.range.start > cursor {
                segments.push(PlanSegment::new(
                    TimeRange {
                        start: cursor,
                        end: fill.range.start,
                    },
                    SegmentSource::Tier(primary),
                ));
            }
            cursor = fill.range.end;
            segments.push(fill);
        }
        if cursor < ctx.range.end {
            segments.push(PlanSegment::new(
                TimeRange {
                    start: cursor,
                    end: ctx.range.end,
                },
                SegmentSource::Tier(primary),
            ));
        }

        for seg in segments.iter().filter(|s| s.source != SegmentSource::Tier(primary)) {
            tracing::debug!(
                %primary,
                range = %seg.range,
                source = %seg.source,
                "Filling gap from fallback"
            );
        }

        ResolutionPlan {
            primary_tier: primary,
            segments,
        }
    }

    fn name(&self) -> &'static str {
        "hybrid"
    }
}

/// Merge sorted fill segments into a non-overlapping sequence
///
/// Touching or overlapping segments with the same source join; where
/// different sources overlap the earlier segment keeps the shared stretch.
fn merge(sorted: Vec<PlanSegment>) -> Vec<PlanSegment> {
    let mut out: Vec<PlanSegment> = Vec::with_capacity(sorted.len());
    for mut seg in sorted {
        if let Some(last) = out.last_mut() {
            if seg.range.start <= last.range.end && seg.source == last.source {
                last.range.end = last.range.end.max(seg.range.end);
                continue;
            }
            if seg.range.start < last.range.end {
                seg.range.start = last.range.end;
                if seg.range.start >= seg.range.end {
                    continue;
                }
            }
        }
        out.push(seg);
    }
    out
}

//! Tier coverage
//!
//! Coverage of a tier over a range is the share of its grid timestamps that
//! actually hold data. Gaps are maximal runs of missing grid timestamps.

use crate::resolution::interval::expected_periods;
use crate::resolution::tier::ResolutionTier;
use crate::storage::TimeRange;
use std::collections::BTreeSet;

/// Timestamps present for one tier over a probed range
#[derive(Debug, Clone, PartialEq)]
pub struct TierPresence {
    pub tier: ResolutionTier,
    pub range: TimeRange,
    timestamps: BTreeSet<i64>,
}

impl TierPresence {
    /// Keep the on-grid timestamps inside `range`
    pub fn new(tier: ResolutionTier, range: TimeRange, timestamps: impl IntoIterator<Item = i64>) -> Self {
        let timestamps = timestamps
            .into_iter()
            .filter(|ts| range.contains(*ts) && tier.is_aligned(*ts))
            .collect();
        Self {
            tier,
            range,
            timestamps,
        }
    }

    /// Presence for a tier with no data at all
    pub fn empty(tier: ResolutionTier, range: TimeRange) -> Self {
        Self {
            tier,
            range,
            timestamps: BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Fraction of expected periods in `range` that hold data, in `[0, 1]`
    ///
    /// Zero when the range contains no grid timestamp of this tier.
    pub fn coverage(&self, range: &TimeRange) -> f64 {
        let expected = expected_periods(range, self.tier);
        if expected == 0 {
            return 0.0;
        }
        let present = if range.is_point() {
            usize::from(self.timestamps.contains(&range.start))
        } else {
            self.timestamps.range(range.start..range.end).count()
        };
        (present as f64 / expected as f64).min(1.0)
    }

    /// Coverage over the whole probed range
    pub fn total_coverage(&self) -> f64 {
        self.coverage(&self.range)
    }

    /// The same tier's presence restricted to a sub-range
    pub fn within(&self, range: TimeRange) -> TierPresence {
        let timestamps = if range.is_point() {
            self.timestamps.get(&range.start).copied().into_iter().collect()
        } else {
            self.timestamps.range(range.start..range.end).copied().collect()
        };
        Self {
            tier: self.tier,
            range,
            timestamps,
        }
    }

    /// Runs of at least `min_periods` missing grid timestamps
    ///
    /// A run touching either end of the probed range extends to that end,
    /// so gaps plus present stretches always tile the range.
    pub fn gaps(&self, min_periods: usize) -> Vec<TimeRange> {
        let step = self.tier.interval_millis();
        let first = self.tier.align_up(self.range.start);
        let min_periods = min_periods.max(1);

        let mut gaps = Vec::new();
        let mut run: Option<(i64, usize)> = None;
        let mut ts = first;

        while ts < self.range.end {
            if self.timestamps.contains(&ts) {
                if let Some((start, len)) = run.take() {
                    if len >= min_periods {
                        gaps.push(self.gap_range(start, ts, first));
                    }
                }
            } else {
                run = match run {
                    Some((start, len)) => Some((start, len + 1)),
                    None => Some((ts, 1)),
                };
            }
            ts += step;
        }

        if let Some((start, len)) = run {
            if len >= min_periods {
                gaps.push(self.gap_range(start, self.range.end, first));
            }
        }
        gaps
    }

    fn gap_range(&self, start: i64, end: i64, first: i64) -> TimeRange {
        let start = if start == first { self.range.start } else { start };
        TimeRange {
            start,
            end: end.min(self.range.end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: i64 = 60 * 1000;
    const FINE: i64 = 5 * MIN;

    fn range(start: i64, end: i64) -> TimeRange {
        TimeRange::try_new(start, end).unwrap()
    }

    #[test]
    fn test_coverage_ratio() {
        let r = range(0, 10 * FINE);
        let presence = TierPresence::new(ResolutionTier::Fine, r, (0..10).filter(|i| i % 2 == 0).map(|i| i * FINE));
        assert_eq!(presence.total_coverage(), 0.5);
        assert_eq!(presence.coverage(&range(0, 2 * FINE)), 0.5);
        assert_eq!(presence.coverage(&TimeRange::point(0)), 1.0);
        assert_eq!(presence.coverage(&TimeRange::point(FINE)), 0.0);
    }

    #[test]
    fn test_off_grid_and_outside_ignored() {
        let r = range(0, 4 * FINE);
        let presence = TierPresence::new(ResolutionTier::Fine, r, vec![0, 7 * MIN, 4 * FINE, -FINE]);
        assert_eq!(presence.len(), 1);
    }

    #[test]
    fn test_gaps() {
        let r = range(0, 12 * FINE);
        // present: 0,1,2 and 6,7 ; missing 3..=5 and 8..=11
        let present = [0, 1, 2, 6, 7].map(|i| i * FINE);
        let presence = TierPresence::new(ResolutionTier::Fine, r, present);

        assert_eq!(
            presence.gaps(1),
            vec![range(3 * FINE, 6 * FINE), range(8 * FINE, 12 * FINE)]
        );
        assert_eq!(presence.gaps(4), vec![range(8 * FINE, 12 * FINE)]);
    }

    #[test]
    fn test_gap_at_start_extends_to_range_start() {
        // Range starts off-grid
        let r = range(2 * MIN, 6 * FINE);
        let presence = TierPresence::new(ResolutionTier::Fine, r, [3, 4, 5].map(|i| i * FINE));
        assert_eq!(presence.gaps(1), vec![range(2 * MIN, 3 * FINE)]);
    }

    #[test]
    fn test_within_restricts_gaps() {
        let r = range(0, 12 * FINE);
        let presence = TierPresence::new(ResolutionTier::Fine, r, [0, 1, 2, 6, 7].map(|i| i * FINE));
        let inner = presence.within(range(FINE, 7 * FINE));
        assert_eq!(inner.len(), 3);
        assert_eq!(inner.gaps(1), vec![range(3 * FINE, 6 * FINE)]);
        assert_eq!(presence.within(TimeRange::point(6 * FINE)).len(), 1);
    }

    #[test]
    fn test_empty_presence() {
        let r = range(0, 6 * FINE);
        let presence = TierPresence::empty(ResolutionTier::Fine, r);
        assert!(presence.is_empty());
        assert_eq!(presence.total_coverage(), 0.0);
        assert_eq!(presence.gaps(1), vec![r]);
    }
}

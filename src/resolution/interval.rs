//! Time-interval math
//!
//! Pure conversions between tiers, hours and period counts, plus tier
//! auto-detection for data whose resolution is not declared up front.
//!
//! Revenue and other energy quantities must be scaled by the interval
//! length of the tier the row came from:
//!
//! ```text
//! fine:   100 MW * $50 * (5/60) h =  416.67 per interval, x12 = 5000.00
//! coarse: 100 MW * $50 * 0.5 h    = 2500.00 per interval, x2  = 5000.00
//! ```

use crate::resolution::tier::ResolutionTier;
use crate::storage::TimeRange;
use std::collections::HashMap;

/// Hours covered by one interval of `tier`
pub fn hours_per_interval(tier: ResolutionTier) -> f64 {
    match tier {
        ResolutionTier::Fine => 5.0 / 60.0,
        ResolutionTier::Coarse => 0.5,
        ResolutionTier::Daily => 24.0,
    }
}

/// Number of periods of `tier` needed to span `hours`
///
/// Rounds up so a partial interval still counts as one period.
pub fn periods_for_hours(hours: f64, tier: ResolutionTier) -> usize {
    if !(hours > 0.0) {
        return 0;
    }
    // Guard against 24.000000001 / 24.0 style float noise before ceil
    let periods = hours / hours_per_interval(tier);
    let rounded = periods.round();
    if (periods - rounded).abs() < 1e-9 {
        rounded as usize
    } else {
        periods.ceil() as usize
    }
}

/// Number of periods of `tier` needed to span `days`
pub fn periods_for_days(days: f64, tier: ResolutionTier) -> usize {
    periods_for_hours(days * 24.0, tier)
}

/// Number of grid timestamps of `tier` inside `range`
///
/// A point range counts one period when its timestamp is on the grid.
pub fn expected_periods(range: &TimeRange, tier: ResolutionTier) -> usize {
    if range.is_point() {
        return usize::from(tier.is_aligned(range.start));
    }
    let first = tier.align_up(range.start);
    if first >= range.end {
        return 0;
    }
    ((range.end - 1 - first) / tier.interval_millis() + 1) as usize
}

/// Infer the tier from the modal spacing of a timestamp series
///
/// Falls back to `Fine` (and logs a warning) when there are fewer than two
/// points or the modal delta does not match any tier.
pub fn detect_tier(timestamps: &[i64]) -> ResolutionTier {
    match detect_tier_strict(timestamps) {
        Some(tier) => tier,
        None => {
            tracing::warn!(
                points = timestamps.len(),
                "Could not detect resolution from timestamps, assuming {}",
                ResolutionTier::Fine
            );
            ResolutionTier::Fine
        }
    }
}

/// Infer the tier from the modal spacing, or None if it is not recognisable
pub fn detect_tier_strict(timestamps: &[i64]) -> Option<ResolutionTier> {
    if timestamps.len() < 2 {
        return None;
    }

    let mut sorted = timestamps.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut counts: HashMap<i64, usize> = HashMap::new();
    for pair in sorted.windows(2) {
        *counts.entry(pair[1] - pair[0]).or_default() += 1;
    }

    // Ties resolve to the smaller delta so the result is deterministic
    let (modal_delta, _) = counts
        .into_iter()
        .max_by(|(da, ca), (db, cb)| ca.cmp(cb).then(db.cmp(da)))?;

    ResolutionTier::all()
        .iter()
        .copied()
        .find(|tier| tier.interval_millis() == modal_delta)
}

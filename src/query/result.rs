//! Query results
//!
//! A [`TabularResult`] is what every consumer receives: named columns, rows
//! tagged with the tier they were read at, and a coverage report describing
//! which parts of the requested range were served from where.
//!
//! Results are plain owned data. The cache hands out clones, so a caller may
//! mutate its copy freely.

use crate::cache::CacheWeight;
use crate::resolution::{expected_periods, periods_for_hours, ResolutionTier};
use crate::storage::TimeRange;
use crate::views::AggregationView;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Role of a result column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Timestamp,
    Tier,
    Dimension,
    Measure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// One output row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Interval start, Unix milliseconds
    pub timestamp: i64,
    /// Tier the row was computed from
    pub tier: ResolutionTier,
    /// Group-by values, in view dimension order
    pub dimensions: Vec<String>,
    /// Measure values, in view measure order
    pub measures: Vec<f64>,
}

/// What happened to one plan segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentOutcome {
    /// Rows were read at this tier
    Served(ResolutionTier),
    /// No tier holds data for the segment
    NoData,
    /// Reading failed after retries
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentReport {
    pub range: TimeRange,
    pub outcome: SegmentOutcome,
    /// Grid periods of the segment's tier that fall in `range`
    pub expected_periods: usize,
    /// Expected periods that came back with at least one row
    pub present_periods: usize,
}

impl SegmentReport {
    /// Report for a served segment, counting the periods `rows` hold
    pub fn served(range: TimeRange, tier: ResolutionTier, rows: &[Row]) -> Self {
        let present: BTreeSet<i64> = rows
            .iter()
            .map(|r| r.timestamp)
            .filter(|ts| tier.is_aligned(*ts) && range.contains(*ts))
            .collect();
        let expected = expected_periods(&range, tier);
        Self {
            range,
            outcome: SegmentOutcome::Served(tier),
            expected_periods: expected,
            present_periods: present.len().min(expected),
        }
    }

    /// Report for a segment that returned nothing
    pub fn missing(range: TimeRange, tier: ResolutionTier, outcome: SegmentOutcome) -> Self {
        Self {
            range,
            outcome,
            expected_periods: expected_periods(&range, tier),
            present_periods: 0,
        }
    }

    pub fn is_served(&self) -> bool {
        matches!(self.outcome, SegmentOutcome::Served(_))
    }

    /// Share of expected periods present, in `[0, 1]`
    ///
    /// A served segment with no grid period inside it counts as whole.
    pub fn fraction(&self) -> f64 {
        if !self.is_served() {
            0.0
        } else if self.expected_periods == 0 {
            1.0
        } else {
            (self.present_periods as f64 / self.expected_periods as f64).min(1.0)
        }
    }
}

/// Coverage annotation attached to every result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    /// Fraction of expected periods present, weighted by segment duration
    pub ratio: f64,
    /// Per-segment outcomes in time order
    pub segments: Vec<SegmentReport>,
}

impl Coverage {
    /// Build from per-segment outcomes over the requested range
    ///
    /// Segments read at different tiers have different period lengths, so
    /// each contributes its own present/expected fraction weighted by the
    /// share of the range it spans.
    pub fn from_reports(range: &TimeRange, segments: Vec<SegmentReport>) -> Self {
        let weight = |s: &SegmentReport| {
            if range.is_point() {
                1.0
            } else {
                s.range.duration_millis() as f64
            }
        };

        let total: f64 = segments.iter().map(weight).sum();
        let ratio = if total > 0.0 {
            let present: f64 = segments.iter().map(|s| weight(s) * s.fraction()).sum();
            (present / total).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self { ratio, segments }
    }

    /// Every segment was served and every expected period is present
    pub fn is_complete(&self) -> bool {
        self.segments
            .iter()
            .all(|s| s.is_served() && s.present_periods >= s.expected_periods)
    }

    /// Expected periods with no rows, summed over all segments
    pub fn missing_periods(&self) -> usize {
        self.segments
            .iter()
            .map(|s| s.expected_periods.saturating_sub(s.present_periods))
            .sum()
    }

    /// At least one segment failed to load
    pub fn is_degraded(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s.outcome, SegmentOutcome::Failed(_)))
    }

    /// Distinct tiers that served rows
    pub fn tiers(&self) -> BTreeSet<ResolutionTier> {
        self.segments
            .iter()
            .filter_map(|s| match s.outcome {
                SegmentOutcome::Served(tier) => Some(tier),
                _ => None,
            })
            .collect()
    }
}

/// Result of a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularResult {
    pub view: String,
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<Row>,
    pub coverage: Coverage,
}

impl TabularResult {
    /// Column layout for a view: timestamp, tier, dimensions, measures
    pub fn columns_for(view: &AggregationView) -> Vec<ColumnSpec> {
        let mut columns = vec![
            ColumnSpec::new("timestamp", ColumnKind::Timestamp),
            ColumnSpec::new("tier", ColumnKind::Tier),
        ];
        columns.extend(
            view.group_by
                .iter()
                .map(|d| ColumnSpec::new(d.column_name(), ColumnKind::Dimension)),
        );
        columns.extend(
            view.measures
                .iter()
                .map(|m| ColumnSpec::new(m.name.clone(), ColumnKind::Measure)),
        );
        columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Position of a measure within `Row::measures`
    pub fn measure_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .filter(|c| c.kind == ColumnKind::Measure)
            .position(|c| c.name == name)
    }

    /// Position of a dimension within `Row::dimensions`
    pub fn dimension_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .filter(|c| c.kind == ColumnKind::Dimension)
            .position(|c| c.name == name)
    }

    /// A measure's value in one row
    pub fn measure(&self, row: &Row, name: &str) -> Option<f64> {
        self.measure_index(name)
            .and_then(|idx| row.measures.get(idx).copied())
    }

    /// Total of a measure over all rows
    pub fn total(&self, name: &str) -> Option<f64> {
        let idx = self.measure_index(name)?;
        Some(self.rows.iter().filter_map(|r| r.measures.get(idx)).sum())
    }

    /// Distinct row timestamps, ascending
    pub fn timestamps(&self) -> Vec<i64> {
        let set: BTreeSet<i64> = self.rows.iter().map(|r| r.timestamp).collect();
        set.into_iter().collect()
    }

    /// Trailing mean of a measure over `window_hours`, aligned with `rows`
    ///
    /// Each row's window is sized in periods of the row's own tier and
    /// reaches back that far in time, so a result mixing tiers averages
    /// over the same span of hours throughout. Evaluated separately for
    /// each dimension group. Returns None if the measure does not exist.
    pub fn rolling_mean(&self, measure: &str, window_hours: f64) -> Option<Vec<f64>> {
        let idx = self.measure_index(measure)?;

        let mut windows: HashMap<&[String], (VecDeque<(i64, f64)>, f64)> = HashMap::new();
        let mut out = Vec::with_capacity(self.rows.len());

        for row in &self.rows {
            let periods = periods_for_hours(window_hours, row.tier).max(1) as i64;
            let cutoff = row.timestamp - periods * row.tier.interval_millis();
            let value = row.measures.get(idx).copied().unwrap_or(0.0);

            let (buf, sum) = windows.entry(row.dimensions.as_slice()).or_default();
            buf.push_back((row.timestamp, value));
            *sum += value;
            while let Some(&(ts, old)) = buf.front() {
                if ts > cutoff {
                    break;
                }
                buf.pop_front();
                *sum -= old;
            }
            out.push(*sum / buf.len() as f64);
        }

        Some(out)
    }

    /// Render as CSV with a header row
    pub fn to_csv(&self) -> Result<String, csv::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(self.columns.iter().map(|c| c.name.as_str()))?;

        for row in &self.rows {
            let mut record = Vec::with_capacity(self.columns.len());
            record.push(format_timestamp(row.timestamp));
            record.push(row.tier.to_string());
            record.extend(row.dimensions.iter().cloned());
            record.extend(row.measures.iter().map(|m| m.to_string()));
            writer.write_record(&record)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// RFC 3339 rendering of a millisecond timestamp
pub fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ts)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_else(|| ts.to_string())
}

impl CacheWeight for TabularResult {
    fn weight(&self) -> usize {
        let strings = |v: &[String]| v.iter().map(|s| s.len() + 24).sum::<usize>();

        let rows: usize = self
            .rows
            .iter()
            .map(|r| {
                std::mem::size_of::<Row>()
                    + strings(&r.dimensions)
                    + r.measures.len() * std::mem::size_of::<f64>()
            })
            .sum();
        let columns: usize = self
            .columns
            .iter()
            .map(|c| std::mem::size_of::<ColumnSpec>() + c.name.len())
            .sum();
        let segments = self.coverage.segments.len() * std::mem::size_of::<SegmentReport>();

        std::mem::size_of::<Self>() + self.view.len() + rows + columns + segments
    }
}

//! Core data types shared by the read path
//!
//! - `TimeSeriesPoint`: a single stored fact
//! - `Domain`: which market dataset a fact belongs to
//! - `TimeRange`: a half-open time interval for scans and plans
//! - `ScanRequest`: a declarative read against one logical table

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single stored market fact
///
/// The meaning of `entity_id` depends on the domain: a generating unit for
/// generation, a region for price and rooftop solar, an interconnector for
/// transmission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSeriesPoint {
    /// Interval start, Unix milliseconds (UTC)
    pub timestamp: i64,
    /// Domain-specific entity identifier
    pub entity_id: String,
    /// The measured value (MW, $/MWh, ...)
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(timestamp: i64, entity_id: impl Into<String>, value: f64) -> Self {
        Self {
            timestamp,
            entity_id: entity_id.into(),
            value,
        }
    }
}

/// Market dataset served by the engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Unit-level generation output (MW)
    Generation,
    /// Regional spot price ($/MWh)
    Price,
    /// Interconnector flows (MW)
    Transmission,
    /// Rooftop solar output per region (MW)
    Rooftop,
}

impl Domain {
    /// Get all domains for iteration
    pub fn all() -> &'static [Domain] {
        &[
            Domain::Generation,
            Domain::Price,
            Domain::Transmission,
            Domain::Rooftop,
        ]
    }

    /// Whether this domain's entity ids are region ids
    pub fn keyed_by_region(&self) -> bool {
        matches!(self, Domain::Price | Domain::Rooftop)
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "generation" | "gen" => Some(Self::Generation),
            "price" | "prices" => Some(Self::Price),
            "transmission" | "flows" => Some(Self::Transmission),
            "rooftop" | "rooftop_solar" => Some(Self::Rooftop),
            _ => None,
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Domain::Generation => write!(f, "generation"),
            Domain::Price => write!(f, "price"),
            Domain::Transmission => write!(f, "transmission"),
            Domain::Rooftop => write!(f, "rooftop"),
        }
    }
}

/// Time range for scans and plans (half-open interval: [start, end))
///
/// A range with `start == end` is a point range and selects exactly the
/// timestamp `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp (inclusive), in milliseconds
    pub start: i64,
    /// End timestamp (exclusive), in milliseconds
    pub end: i64,
}

impl TimeRange {
    /// Create a time range, returning None if end precedes start
    pub fn try_new(start: i64, end: i64) -> Option<Self> {
        if start <= end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// Create a point range selecting a single timestamp
    pub fn point(timestamp: i64) -> Self {
        Self {
            start: timestamp,
            end: timestamp,
        }
    }

    /// Create a range for the last N hours from now
    pub fn last_hours(hours: i64) -> Self {
        let end = Utc::now().timestamp_millis();
        let start = end - (hours * 3600 * 1000);
        Self { start, end }
    }

    /// Create a range for the last N days from now
    pub fn last_days(days: i64) -> Self {
        Self::last_hours(days * 24)
    }

    /// Create a range covering whole UTC days `[first, first + days)`
    pub fn days_from(year: i32, month: u32, day: u32, days: i64) -> Option<Self> {
        use chrono::{NaiveDate, TimeZone};
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let start = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?);
        let end = start + chrono::Duration::days(days);
        Self::try_new(start.timestamp_millis(), end.timestamp_millis())
    }

    /// Whether this is a zero-length point range
    pub fn is_point(&self) -> bool {
        self.start == self.end
    }

    /// Check if a timestamp falls within this range
    pub fn contains(&self, timestamp: i64) -> bool {
        if self.is_point() {
            timestamp == self.start
        } else {
            timestamp >= self.start && timestamp < self.end
        }
    }

    /// Check if this range overlaps with another
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Get the duration in milliseconds
    pub fn duration_millis(&self) -> i64 {
        self.end - self.start
    }

    /// Get the duration in (fractional) days
    pub fn duration_days(&self) -> f64 {
        self.duration_millis() as f64 / 86_400_000.0
    }

    /// Get intersection with another range, if any
    pub fn intersection(&self, other: &TimeRange) -> Option<Self> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start < end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// Clamp this range into `outer`
    pub fn clamp_to(&self, outer: &TimeRange) -> Self {
        let start = self.start.clamp(outer.start, outer.end);
        let end = self.end.clamp(start, outer.end);
        Self { start, end }
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt_ts = |ts: i64| {
            chrono::DateTime::<Utc>::from_timestamp_millis(ts)
                .map(|dt| dt.format("%Y-%m-%dT%H:%M").to_string())
                .unwrap_or_else(|| ts.to_string())
        };
        write!(f, "[{}, {})", fmt_ts(self.start), fmt_ts(self.end))
    }
}

/// A read-only scan against one logical table
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    /// Logical table name
    pub table: String,
    /// Time range to read
    pub range: TimeRange,
    /// Restrict to these entity ids (None = all)
    pub entities: Option<BTreeSet<String>>,
}

impl ScanRequest {
    pub fn new(table: impl Into<String>, range: TimeRange) -> Self {
        Self {
            table: table.into(),
            range,
            entities: None,
        }
    }

    pub fn entities(mut self, entities: BTreeSet<String>) -> Self {
        self.entities = Some(entities);
        self
    }
}

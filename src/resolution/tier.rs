//! Resolution tiers
//!
//! The time granularities at which market facts are physically stored.

use serde::{Deserialize, Serialize};

const MINUTE_MS: i64 = 60 * 1000;

/// Stored time granularity of a domain's facts
///
/// Ordered from finest to coarsest so that `Ord` reflects resolution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionTier {
    /// 5-minute dispatch intervals
    Fine,
    /// 30-minute trading intervals
    Coarse,
    /// Daily aggregates (UTC day)
    Daily,
}

impl ResolutionTier {
    /// Get all tiers, finest first
    pub fn all() -> &'static [ResolutionTier] {
        &[
            ResolutionTier::Fine,
            ResolutionTier::Coarse,
            ResolutionTier::Daily,
        ]
    }

    /// Length of one interval in milliseconds
    pub fn interval_millis(&self) -> i64 {
        match self {
            ResolutionTier::Fine => 5 * MINUTE_MS,
            ResolutionTier::Coarse => 30 * MINUTE_MS,
            ResolutionTier::Daily => 24 * 60 * MINUTE_MS,
        }
    }

    /// Truncate a timestamp to the start of its interval
    pub fn align_down(&self, timestamp: i64) -> i64 {
        timestamp.div_euclid(self.interval_millis()) * self.interval_millis()
    }

    /// Round a timestamp up to the next interval boundary (identity when aligned)
    pub fn align_up(&self, timestamp: i64) -> i64 {
        let down = self.align_down(timestamp);
        if down == timestamp {
            down
        } else {
            down + self.interval_millis()
        }
    }

    /// Whether a timestamp sits on this tier's grid
    pub fn is_aligned(&self, timestamp: i64) -> bool {
        timestamp.rem_euclid(self.interval_millis()) == 0
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "fine" | "5min" | "5m" => Some(Self::Fine),
            "coarse" | "30min" | "30m" => Some(Self::Coarse),
            "daily" | "1d" | "day" => Some(Self::Daily),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionTier::Fine => write!(f, "fine"),
            ResolutionTier::Coarse => write!(f, "coarse"),
            ResolutionTier::Daily => write!(f, "daily"),
        }
    }
}

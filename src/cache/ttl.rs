//! Cache lifetimes
//!
//! Recent data can still be revised by late-arriving facts, so ranges that
//! reach into the live window get a short per-domain TTL. Ranges that ended
//! before it are settled and keep a longer historical TTL.

use crate::storage::{Domain, TimeRange};
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct TtlPolicy {
    live: HashMap<Domain, Duration>,
    default_live: Duration,
    historical: Duration,
    live_window: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        let live = [
            (Domain::Generation, Duration::from_secs(300)),
            (Domain::Price, Duration::from_secs(300)),
            (Domain::Transmission, Duration::from_secs(300)),
            (Domain::Rooftop, Duration::from_secs(1800)),
        ]
        .into_iter()
        .collect();

        Self {
            live,
            default_live: Duration::from_secs(300),
            historical: Duration::from_secs(24 * 3600),
            live_window: Duration::from_secs(48 * 3600),
        }
    }
}

impl TtlPolicy {
    pub fn new(default_live: Duration, historical: Duration, live_window: Duration) -> Self {
        Self {
            live: HashMap::new(),
            default_live,
            historical,
            live_window,
        }
    }

    /// Override the live TTL for one domain
    pub fn with_live(mut self, domain: Domain, ttl: Duration) -> Self {
        self.live.insert(domain, ttl);
        self
    }

    pub fn live_ttl(&self, domain: Domain) -> Duration {
        self.live.get(&domain).copied().unwrap_or(self.default_live)
    }

    pub fn historical_ttl(&self) -> Duration {
        self.historical
    }

    /// TTL for a result over `range`, as seen at `now` (ms)
    pub fn ttl_at(&self, domain: Domain, range: &TimeRange, now: i64) -> Duration {
        let live_start = now - self.live_window.as_millis() as i64;
        if range.end < live_start {
            self.historical
        } else {
            self.live_ttl(domain)
        }
    }

    /// TTL for a result over `range`, as seen now
    pub fn ttl_for(&self, domain: Domain, range: &TimeRange) -> Duration {
        self.ttl_at(domain, range, Utc::now().timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3600 * 1000;

    #[test]
    fn test_live_vs_historical() {
        let policy = TtlPolicy::default();
        let now = 1000 * HOUR;

        let recent = TimeRange::try_new(now - 2 * HOUR, now).unwrap();
        assert_eq!(policy.ttl_at(Domain::Price, &recent, now), Duration::from_secs(300));
        assert_eq!(policy.ttl_at(Domain::Rooftop, &recent, now), Duration::from_secs(1800));

        let old = TimeRange::try_new(now - 100 * HOUR, now - 60 * HOUR).unwrap();
        assert_eq!(policy.ttl_at(Domain::Price, &old, now), policy.historical_ttl());
    }

    #[test]
    fn test_domain_override() {
        let policy = TtlPolicy::new(
            Duration::from_secs(10),
            Duration::from_secs(100),
            Duration::from_secs(3600),
        )
        .with_live(Domain::Price, Duration::from_secs(5));
        assert_eq!(policy.live_ttl(Domain::Price), Duration::from_secs(5));
        assert_eq!(policy.live_ttl(Domain::Generation), Duration::from_secs(10));
    }
}

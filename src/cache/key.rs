//! Structured cache keys
//!
//! A key is built from the normalised parts of a request, never from its
//! textual form, so two logically identical requests always produce the
//! same key.

use crate::catalog::EntityFilter;
use crate::resolution::PlanSegment;
use crate::storage::Domain;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub domain: Domain,
    pub view: String,
    pub filter: EntityFilter,
    pub segments: Vec<PlanSegment>,
}

impl CacheKey {
    pub fn new(
        domain: Domain,
        view: impl Into<String>,
        filter: &EntityFilter,
        segments: Vec<PlanSegment>,
    ) -> Self {
        Self {
            domain,
            view: view.into(),
            filter: filter.normalized(),
            segments,
        }
    }

    /// Key for a single segment of this request
    pub fn for_segment(&self, segment: PlanSegment) -> Self {
        Self {
            domain: self.domain,
            view: self.view.clone(),
            filter: self.filter.clone(),
            segments: vec![segment],
        }
    }

    /// Stable textual form, used as the disk-tier primary key
    pub fn fingerprint(&self) -> String {
        let segments: Vec<String> = self
            .segments
            .iter()
            .map(|s| format!("{}-{}@{}", s.range.start, s.range.end, s.source))
            .collect();
        format!(
            "{}/{}/{}/{}",
            self.domain,
            self.view,
            self.filter,
            segments.join(";")
        )
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.fingerprint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::{ResolutionTier, SegmentSource};
    use crate::storage::TimeRange;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash(key: &CacheKey) -> u64 {
        let mut h = DefaultHasher::new();
        key.hash(&mut h);
        h.finish()
    }

    fn segment(start: i64, end: i64) -> PlanSegment {
        PlanSegment::new(
            TimeRange::try_new(start, end).unwrap(),
            SegmentSource::Tier(ResolutionTier::Fine),
        )
    }

    #[test]
    fn test_identical_requests_share_key() {
        let a = CacheKey::new(
            Domain::Generation,
            "generation_by_fuel",
            &EntityFilter::entities(["er01", "BAYSW1"]),
            vec![segment(0, 100)],
        );
        let b = CacheKey::new(
            Domain::Generation,
            "generation_by_fuel",
            &EntityFilter::entities([" BAYSW1", "ER01"]),
            vec![segment(0, 100)],
        );
        assert_eq!(a, b);
        assert_eq!(hash(&a), hash(&b));
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_different_segments_differ() {
        let filter = EntityFilter::All;
        let a = CacheKey::new(Domain::Price, "price_by_region", &filter, vec![segment(0, 100)]);
        let b = CacheKey::new(Domain::Price, "price_by_region", &filter, vec![segment(0, 200)]);
        assert_ne!(a, b);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_format() {
        let key = CacheKey::new(
            Domain::Price,
            "price_by_region",
            &EntityFilter::region("nsw1"),
            vec![segment(0, 300_000)],
        );
        assert_eq!(
            key.fingerprint(),
            "price/price_by_region/region=NSW1/0-300000@fine"
        );
        let seg = key.for_segment(segment(0, 10));
        assert_eq!(seg.segments.len(), 1);
        assert_eq!(seg.filter, key.filter);
    }
}

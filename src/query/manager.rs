//! Query Manager
//!
//! The single entry point consumers call. One manager serves one domain;
//! all managers built from the same [`EngineContext`] share its cache.
//!
//! ```text
//! query(descriptor)
//!   → plan (resolution manager)
//!   → cache lookup ─hit──────────────────────────────▶ result
//!   → single-flight lock → re-check cache
//!   → fetch segments concurrently (segment cache, retry)
//!   → merge in time order, coverage → cache (unless degraded) → result
//! ```

use crate::cache::{CacheKey, TieredStats};
use crate::catalog::EntityFilter;
use crate::context::EngineContext;
use crate::query::descriptor::{Completeness, QueryDescriptor};
use crate::query::error::{QueryError, QueryResult};
use crate::query::result::{Coverage, Row, SegmentOutcome, SegmentReport, TabularResult};
use crate::resolution::{PlanSegment, ResolutionPlan, ResolutionTier, SegmentSource};
use crate::storage::Domain;
use crate::views::ViewPlan;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Rows and outcome for one plan segment
struct SegmentFetch {
    report: SegmentReport,
    rows: Vec<Row>,
}

impl SegmentFetch {
    fn served(segment: &PlanSegment, tier: ResolutionTier, rows: Vec<Row>) -> Self {
        Self {
            report: SegmentReport::served(segment.range, tier, &rows),
            rows,
        }
    }

    fn missing(segment: &PlanSegment, tier: ResolutionTier, outcome: SegmentOutcome) -> Self {
        Self {
            report: SegmentReport::missing(segment.range, tier, outcome),
            rows: Vec::new(),
        }
    }
}

pub struct QueryManager {
    ctx: Arc<EngineContext>,
    domain: Domain,
}

impl QueryManager {
    pub fn new(ctx: Arc<EngineContext>, domain: Domain) -> Self {
        Self { ctx, domain }
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    /// Answer a descriptor, from cache where possible
    ///
    /// The whole request, including waiting for another caller computing
    /// the same key, is bounded by the configured query timeout. Segments
    /// that completed before a timeout remain cached.
    pub async fn query(&self, descriptor: &QueryDescriptor) -> QueryResult<TabularResult> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "query",
            %request_id,
            domain = %self.domain,
            view = descriptor.view_name(),
        );

        let timeout = self.ctx.query_timeout;
        match tokio::time::timeout(timeout, self.execute(descriptor))
            .instrument(span)
            .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(%request_id, range = %descriptor.range, "Query timed out after {:?}", timeout);
                Err(QueryError::Timeout(timeout))
            }
        }
    }

    /// Plan a descriptor without reading any values
    pub async fn plan_only(&self, descriptor: &QueryDescriptor) -> QueryResult<ResolutionPlan> {
        self.check_domain(descriptor)?;
        self.ctx.resolution.plan(descriptor).await
    }

    pub async fn cache_stats(&self) -> TieredStats {
        self.ctx.cache.stats().await
    }

    fn check_domain(&self, descriptor: &QueryDescriptor) -> QueryResult<()> {
        if descriptor.domain != self.domain {
            return Err(QueryError::InvalidDescriptor(format!(
                "{} query sent to the {} manager",
                descriptor.domain, self.domain
            )));
        }
        Ok(())
    }

    async fn execute(&self, descriptor: &QueryDescriptor) -> QueryResult<TabularResult> {
        self.check_domain(descriptor)?;
        let view_name = descriptor.view_name();
        let range = descriptor.range;

        let plan = self.ctx.resolution.plan(descriptor).await?;
        if plan.is_all_no_data() {
            return Err(QueryError::DataUnavailable(format!(
                "no {} data in {}",
                self.domain, range
            )));
        }
        if descriptor.completeness == Completeness::RequireComplete && plan.has_no_data() {
            return Err(QueryError::DataUnavailable(format!(
                "part of {} has no data at any resolution",
                range
            )));
        }

        let key = CacheKey::new(self.domain, view_name, &descriptor.filter, plan.segments.clone());
        if let Some(hit) = self.ctx.cache.get(&key).await {
            tracing::debug!(%key, "Cache hit");
            return check_complete(descriptor, hit);
        }

        let _flight = self.ctx.inflight.lock(&key).await;
        if let Some(hit) = self.ctx.cache.get(&key).await {
            tracing::debug!(%key, "Cache filled while waiting");
            return check_complete(descriptor, hit);
        }

        let view = self.ctx.registry.view(view_name)?;
        let mut bound: HashMap<ResolutionTier, ViewPlan> = HashMap::new();
        for tier in plan.segments.iter().filter_map(|s| s.source.tier()) {
            if !bound.contains_key(&tier) {
                bound.insert(tier, self.ctx.registry.get_view(view_name, tier)?);
            }
        }

        // A single-segment key is the request key itself
        let cache_segments = plan.segments.len() > 1;
        let fetches = plan
            .segments
            .iter()
            .map(|segment| {
                self.fetch_segment(&key, segment, plan.primary_tier, &bound, &descriptor.filter, cache_segments)
            });
        let fetched = join_all(fetches).await;

        let mut reports = Vec::with_capacity(fetched.len());
        let mut rows = Vec::new();
        for fetch in fetched {
            reports.push(fetch.report);
            rows.extend(fetch.rows);
        }
        let coverage = Coverage::from_reports(&range, reports);

        if coverage.is_degraded() {
            let nothing_served = coverage.tiers().is_empty();
            if descriptor.completeness == Completeness::RequireComplete || nothing_served {
                let reason = coverage
                    .segments
                    .iter()
                    .find_map(|s| match &s.outcome {
                        SegmentOutcome::Failed(reason) => Some(format!("{}: {}", s.range, reason)),
                        _ => None,
                    })
                    .unwrap_or_default();
                return Err(QueryError::DataUnavailable(reason));
            }
            tracing::warn!(ratio = coverage.ratio, "Returning degraded result");
        }

        let result = TabularResult {
            view: view_name.to_string(),
            columns: TabularResult::columns_for(&view),
            rows,
            coverage,
        };

        if !result.coverage.is_degraded() {
            let ttl = self.ctx.ttl.ttl_for(self.domain, &range);
            self.ctx.cache.put(key, result.clone(), ttl).await;
        }

        tracing::debug!(
            rows = result.len(),
            segments = result.coverage.segments.len(),
            ratio = result.coverage.ratio,
            "Query complete"
        );
        check_complete(descriptor, result)
    }

    async fn fetch_segment(
        &self,
        key: &CacheKey,
        segment: &PlanSegment,
        primary: ResolutionTier,
        bound: &HashMap<ResolutionTier, ViewPlan>,
        filter: &EntityFilter,
        cache_segment: bool,
    ) -> SegmentFetch {
        let tier = match segment.source {
            SegmentSource::Tier(tier) => tier,
            SegmentSource::NoData => return SegmentFetch::missing(segment, primary, SegmentOutcome::NoData),
        };
        let Some(view_plan) = bound.get(&tier) else {
            let reason = format!("view not bound at {} resolution", tier);
            return SegmentFetch::missing(segment, tier, SegmentOutcome::Failed(reason));
        };

        let segment_key = key.for_segment(*segment);
        if cache_segment {
            if let Some(hit) = self.ctx.cache.get(&segment_key).await {
                tracing::debug!(key = %segment_key, "Segment cache hit");
                return SegmentFetch::served(segment, tier, hit.rows);
            }
        }

        let executor = &self.ctx.executor;
        let range = segment.range;
        let fetched = self
            .ctx
            .retry
            .run("segment scan", move || executor.execute(view_plan, range, filter))
            .await;

        match fetched {
            Ok(rows) => {
                let fetch = SegmentFetch::served(segment, tier, rows);
                if cache_segment {
                    let partial = TabularResult {
                        view: key.view.clone(),
                        columns: TabularResult::columns_for(&view_plan.view),
                        rows: fetch.rows.clone(),
                        coverage: Coverage::from_reports(&range, vec![fetch.report.clone()]),
                    };
                    let ttl = self.ctx.ttl.ttl_for(self.domain, &range);
                    self.ctx.cache.put(segment_key, partial, ttl).await;
                }
                fetch
            }
            Err(e) => {
                tracing::error!(segment = %range, %tier, "Segment read failed: {}", e);
                SegmentFetch::missing(segment, tier, SegmentOutcome::Failed(e.to_string()))
            }
        }
    }
}

/// Refuse a result with missing periods when the caller asked for all of them
fn check_complete(descriptor: &QueryDescriptor, result: TabularResult) -> QueryResult<TabularResult> {
    if descriptor.completeness == Completeness::RequireComplete && !result.coverage.is_complete() {
        return Err(QueryError::DataUnavailable(format!(
            "{} of the periods in {} are missing",
            result.coverage.missing_periods(),
            descriptor.range
        )));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::query::retry::RetryPolicy;
    use crate::testing::{days, grid, sample_catalog, MemoryStore, DAY, HOUR};
    use crate::storage::TimeRange;
    use std::time::Duration;

    fn context(store: &Arc<MemoryStore>, configure: impl FnOnce(&mut Config)) -> Arc<EngineContext> {
        let mut config = Config::default();
        config.resolution.fine_max_days = 10.0;
        config.retry = RetryPolicy::new()
            .with_initial_interval(Duration::from_millis(1))
            .with_maximum_interval(Duration::from_millis(2));
        configure(&mut config);
        let store: Arc<MemoryStore> = Arc::clone(store);
        Arc::new(EngineContext::new(store, sample_catalog(), &config).unwrap())
    }

    fn generation(range: TimeRange) -> QueryDescriptor {
        QueryDescriptor::builder(Domain::Generation)
            .view("generation_by_fuel")
            .range(range)
            .build()
            .unwrap()
    }

    fn two_day_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.insert("generation_5min", grid(ResolutionTier::Fine, days(0, 2), "ER01", 100.0));
        store
    }

    fn gap_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.insert("generation_5min", grid(ResolutionTier::Fine, days(0, 3), "ER01", 100.0));
        store.insert("generation_5min", grid(ResolutionTier::Fine, days(6, 9), "ER01", 100.0));
        store.insert("generation_30min", grid(ResolutionTier::Coarse, days(0, 9), "ER01", 100.0));
        store
    }

    fn strictly_increasing(ts: &[i64]) -> bool {
        ts.windows(2).all(|w| w[0] < w[1])
    }

    #[tokio::test]
    async fn test_two_day_miss_then_hit() {
        let store = two_day_store();
        let manager = context(&store, |_| {}).query_manager(Domain::Generation);
        let d = generation(days(0, 2));

        let first = manager.query(&d).await.unwrap();
        assert_eq!(first.len(), 2 * 288);
        assert!(first.rows.iter().all(|r| r.tier == ResolutionTier::Fine));
        assert!(first.rows.iter().all(|r| r.dimensions == vec!["Coal".to_string()]));
        let ts: Vec<i64> = first.rows.iter().map(|r| r.timestamp).collect();
        assert!(strictly_increasing(&ts));
        assert!(first.coverage.is_complete());
        assert_eq!(first.coverage.ratio, 1.0);

        let scans = store.scan_count();
        let second = manager.query(&d).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(store.scan_count(), scans);
        assert!(manager.cache_stats().await.memory.hits >= 1);
    }

    #[tokio::test]
    async fn test_returned_copy_is_independent() {
        let store = two_day_store();
        let manager = context(&store, |_| {}).query_manager(Domain::Generation);
        let d = generation(days(0, 1));

        let mut first = manager.query(&d).await.unwrap();
        first.rows.clear();
        let second = manager.query(&d).await.unwrap();
        assert_eq!(second.len(), 288);
    }

    #[tokio::test]
    async fn test_nine_day_gap_three_segments() {
        let store = gap_store();
        let manager = context(&store, |_| {}).query_manager(Domain::Generation);

        let result = manager.query(&generation(days(0, 9))).await.unwrap();
        let segments = &result.coverage.segments;
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].outcome, SegmentOutcome::Served(ResolutionTier::Fine));
        assert_eq!(segments[1].outcome, SegmentOutcome::Served(ResolutionTier::Coarse));
        assert_eq!(segments[2].outcome, SegmentOutcome::Served(ResolutionTier::Fine));
        assert_eq!(segments[1].range, days(3, 6));

        assert_eq!(result.len(), 3 * 288 + 3 * 48 + 3 * 288);
        let ts: Vec<i64> = result.rows.iter().map(|r| r.timestamp).collect();
        assert!(strictly_increasing(&ts));
        assert!(result
            .rows
            .iter()
            .filter(|r| r.timestamp >= 3 * DAY && r.timestamp < 6 * DAY)
            .all(|r| r.tier == ResolutionTier::Coarse));
        assert_eq!(result.coverage.ratio, 1.0);
    }

    #[tokio::test]
    async fn test_results_deterministic_across_contexts() {
        let d = generation(days(0, 9));
        let a = context(&gap_store(), |_| {})
            .query_manager(Domain::Generation)
            .query(&d)
            .await
            .unwrap();
        let b = context(&gap_store(), |_| {})
            .query_manager(Domain::Generation)
            .query(&d)
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_segments_tile_generated_ranges() {
        let store = gap_store();
        let manager = context(&store, |_| {}).query_manager(Domain::Generation);
        for i in 0..12i64 {
            let start = i * 11 * 3_600_000 + i * 5 * 60_000;
            let range = TimeRange::try_new(start, start + (i % 4 + 2) * DAY).unwrap();
            let result = manager.query(&generation(range)).await.unwrap();

            let segments = &result.coverage.segments;
            assert_eq!(segments.first().map(|s| s.range.start), Some(range.start));
            assert_eq!(segments.last().map(|s| s.range.end), Some(range.end));
            assert!(segments.windows(2).all(|w| w[0].range.end == w[1].range.start));
            assert!(result.rows.iter().all(|r| range.contains(r.timestamp)));
        }
    }

    #[tokio::test]
    async fn test_transient_failures_retried() {
        let store = two_day_store();
        store.fail_transient("generation_5min", 2);
        let manager = context(&store, |_| {}).query_manager(Domain::Generation);

        let result = manager.query(&generation(days(0, 2))).await.unwrap();
        assert!(result.coverage.is_complete());
        assert_eq!(store.scan_count(), 3);
    }

    #[tokio::test]
    async fn test_failed_segment_degrades_result() {
        let store = gap_store();
        store.fail_always("generation_30min");
        let manager = context(&store, |_| {}).query_manager(Domain::Generation);
        let d = generation(days(0, 9));

        let result = manager.query(&d).await.unwrap();
        assert!(result.coverage.is_degraded());
        assert!(matches!(result.coverage.segments[1].outcome, SegmentOutcome::Failed(_)));
        assert!((result.coverage.ratio - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(result.len(), 6 * 288);

        // Degraded results are not cached, served segments are
        let scans = store.scan_count();
        manager.query(&d).await.unwrap();
        assert_eq!(store.scan_count(), scans + 3);

        let strict = QueryDescriptor::builder(Domain::Generation)
            .view("generation_by_fuel")
            .range(days(0, 9))
            .require_complete()
            .build()
            .unwrap();
        assert!(matches!(
            manager.query(&strict).await,
            Err(QueryError::DataUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_partial_fallback_reports_true_gap() {
        // Fine holds days 0..3, coarse days 3..4.5, nothing holds 4.5..6
        let store = Arc::new(MemoryStore::new());
        let coarse_span = TimeRange::try_new(3 * DAY, 4 * DAY + DAY / 2).unwrap();
        store.insert("generation_5min", grid(ResolutionTier::Fine, days(0, 3), "ER01", 100.0));
        store.insert("generation_30min", grid(ResolutionTier::Coarse, coarse_span, "ER01", 100.0));
        let manager = context(&store, |_| {}).query_manager(Domain::Generation);

        let result = manager.query(&generation(days(0, 6))).await.unwrap();
        let segments = &result.coverage.segments;
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1].outcome, SegmentOutcome::Served(ResolutionTier::Coarse));
        assert_eq!(segments[1].range, coarse_span);
        assert_eq!(segments[2].outcome, SegmentOutcome::NoData);
        assert!(!result.coverage.is_complete());
        assert!((result.coverage.ratio - 0.75).abs() < 1e-9);
        assert_eq!(result.len(), 3 * 288 + 72);
        assert!(result.rows.iter().all(|r| r.timestamp < coarse_span.end));

        let strict = QueryDescriptor::builder(Domain::Generation)
            .view("generation_by_fuel")
            .range(days(0, 6))
            .require_complete()
            .build()
            .unwrap();
        assert!(matches!(
            manager.query(&strict).await,
            Err(QueryError::DataUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_ratio_counts_periods_missing_above_threshold() {
        // A two hour hole keeps fine coverage above 0.95, so no fallback
        let store = Arc::new(MemoryStore::new());
        let hole = TimeRange::try_new(10 * HOUR, 12 * HOUR).unwrap();
        let points = grid(ResolutionTier::Fine, days(0, 2), "ER01", 100.0)
            .into_iter()
            .filter(|p| !hole.contains(p.timestamp))
            .collect();
        store.insert("generation_5min", points);
        let manager = context(&store, |_| {}).query_manager(Domain::Generation);

        let partial = manager.query(&generation(days(0, 2))).await.unwrap();
        assert_eq!(partial.coverage.segments.len(), 1);
        assert_eq!(partial.len(), 552);
        assert!((partial.coverage.ratio - 552.0 / 576.0).abs() < 1e-9);
        assert!(!partial.coverage.is_complete());
        assert_eq!(partial.coverage.missing_periods(), 24);

        // The cached partial result must not satisfy a strict request either
        let strict = QueryDescriptor::builder(Domain::Generation)
            .view("generation_by_fuel")
            .range(days(0, 2))
            .require_complete()
            .build()
            .unwrap();
        assert!(matches!(
            manager.query(&strict).await,
            Err(QueryError::DataUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_ratio_reflects_filtered_entities() {
        let store = two_day_store();
        let hole = TimeRange::try_new(6 * HOUR, 12 * HOUR).unwrap();
        let wind = grid(ResolutionTier::Fine, days(0, 2), "HDWF1", 40.0)
            .into_iter()
            .filter(|p| !hole.contains(p.timestamp))
            .collect();
        store.insert("generation_5min", wind);
        let manager = context(&store, |_| {}).query_manager(Domain::Generation);

        let everything = manager.query(&generation(days(0, 2))).await.unwrap();
        assert!(everything.coverage.is_complete());

        let filtered = QueryDescriptor::builder(Domain::Generation)
            .view("generation_by_fuel")
            .range(days(0, 2))
            .filter(EntityFilter::entities(["HDWF1"]))
            .build()
            .unwrap();
        let wind_only = manager.query(&filtered).await.unwrap();
        assert_eq!(wind_only.len(), 576 - 72);
        assert!((wind_only.coverage.ratio - 504.0 / 576.0).abs() < 1e-9);
        assert!(!wind_only.coverage.is_complete());
    }

    #[tokio::test]
    async fn test_persistent_failure_is_unavailable() {
        let store = two_day_store();
        store.fail_always("generation_5min");
        let manager = context(&store, |_| {}).query_manager(Domain::Generation);

        let err = manager.query(&generation(days(0, 2))).await.unwrap_err();
        assert!(matches!(err, QueryError::DataUnavailable(_)));
    }

    #[tokio::test]
    async fn test_no_data_handling() {
        let store = Arc::new(MemoryStore::new());
        store.insert("generation_5min", grid(ResolutionTier::Fine, days(0, 3), "ER01", 1.0));
        let manager = context(&store, |_| {}).query_manager(Domain::Generation);

        let partial = manager.query(&generation(days(0, 5))).await.unwrap();
        assert_eq!(partial.coverage.segments[1].outcome, SegmentOutcome::NoData);
        assert!((partial.coverage.ratio - 0.6).abs() < 1e-9);

        let strict = QueryDescriptor::builder(Domain::Generation)
            .range(days(0, 5))
            .require_complete()
            .build()
            .unwrap();
        assert!(matches!(
            manager.query(&strict).await,
            Err(QueryError::DataUnavailable(_))
        ));

        let outside = manager.query(&generation(days(50, 52))).await;
        assert!(matches!(outside, Err(QueryError::DataUnavailable(_))));
    }

    #[tokio::test]
    async fn test_timeout() {
        let store = two_day_store();
        store.delay("generation_5min", Duration::from_millis(500));
        let manager = context(&store, |c| c.engine.query_timeout_ms = 20).query_manager(Domain::Generation);

        let err = manager.query(&generation(days(0, 1))).await.unwrap_err();
        assert_eq!(err, QueryError::Timeout(Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_concurrent_identical_queries_scan_once() {
        let store = two_day_store();
        store.delay("generation_5min", Duration::from_millis(20));
        let manager = context(&store, |_| {}).query_manager(Domain::Generation);
        let d = generation(days(0, 2));

        let results = join_all((0..8).map(|_| manager.query(&d))).await;
        assert!(results.iter().all(|r| r.as_ref().map(|t| t.len()) == Ok(576)));
        assert_eq!(store.scan_count(), 1);
        assert_eq!(manager.context().inflight.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_wrong_domain_rejected() {
        let store = two_day_store();
        let manager = context(&store, |_| {}).query_manager(Domain::Price);
        let err = manager.query(&generation(days(0, 1))).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidDescriptor(_)));
    }

    #[tokio::test]
    async fn test_plan_only_reads_no_values() {
        let store = gap_store();
        let manager = context(&store, |_| {}).query_manager(Domain::Generation);
        let plan = manager.plan_only(&generation(days(0, 9))).await.unwrap();
        assert!(plan.is_mixed());
        assert_eq!(store.scan_count(), 0);
    }
}

//! Resolution planning
//!
//! Turns a query descriptor into a [`ResolutionPlan`]: which tier serves
//! which part of the range. Planning only reads timestamp presence, never
//! values, and depends on nothing but the descriptor and store contents.

use crate::config::{GapFillerKind, ResolutionConfig};
use crate::query::descriptor::{QueryDescriptor, ResolutionHint};
use crate::query::error::{QueryError, QueryResult};
use crate::query::retry::RetryPolicy;
use crate::resolution::coverage::TierPresence;
use crate::resolution::plan::ResolutionPlan;
use crate::resolution::strategy::{
    fallback_order, FillContext, GapFiller, HybridGapFiller, NoFallback, SpanThresholdSelector,
    TierSelector,
};
use crate::resolution::tier::ResolutionTier;
use crate::storage::{AnalyticalStore, Domain, StorageError, TimeRange};
use crate::views::ViewRegistry;
use std::sync::Arc;

pub struct ResolutionManager {
    store: Arc<dyn AnalyticalStore>,
    registry: Arc<ViewRegistry>,
    selector: Box<dyn TierSelector>,
    filler: Box<dyn GapFiller>,
    coverage_threshold: f64,
    min_gap_periods: usize,
    retry: RetryPolicy,
}

impl ResolutionManager {
    /// Build with the strategies named in `config`
    pub fn new(
        store: Arc<dyn AnalyticalStore>,
        registry: Arc<ViewRegistry>,
        config: &ResolutionConfig,
    ) -> Self {
        let selector = SpanThresholdSelector::new(config.fine_max_days, config.coarse_max_days);
        let filler: Box<dyn GapFiller> = match config.gap_filler {
            GapFillerKind::Hybrid => Box::new(HybridGapFiller),
            GapFillerKind::None => Box::new(NoFallback),
        };
        Self::with_strategies(store, registry, Box::new(selector), filler)
            .coverage_threshold(config.coverage_threshold)
            .min_gap_periods(config.min_gap_periods)
    }

    /// Build with explicit strategies and default thresholds
    pub fn with_strategies(
        store: Arc<dyn AnalyticalStore>,
        registry: Arc<ViewRegistry>,
        selector: Box<dyn TierSelector>,
        filler: Box<dyn GapFiller>,
    ) -> Self {
        let defaults = ResolutionConfig::default();
        Self {
            store,
            registry,
            selector,
            filler,
            coverage_threshold: defaults.coverage_threshold,
            min_gap_periods: defaults.min_gap_periods,
            retry: RetryPolicy::default(),
        }
    }

    pub fn coverage_threshold(mut self, threshold: f64) -> Self {
        self.coverage_threshold = threshold;
        self
    }

    pub fn min_gap_periods(mut self, periods: usize) -> Self {
        self.min_gap_periods = periods;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn registry(&self) -> &Arc<ViewRegistry> {
        &self.registry
    }

    /// Plan how to serve a descriptor
    pub async fn plan(&self, descriptor: &QueryDescriptor) -> QueryResult<ResolutionPlan> {
        let view_name = descriptor.view_name();
        let view = self.registry.view(view_name)?;
        if view.domain != descriptor.domain {
            return Err(QueryError::InvalidDescriptor(format!(
                "view '{}' belongs to {}, not {}",
                view_name, view.domain, descriptor.domain
            )));
        }

        let tiers = self.registry.executable_tiers(view_name)?;
        let range = descriptor.range;

        if let ResolutionHint::Tier(tier) = descriptor.resolution_hint {
            if !tiers.contains(&tier) {
                return Err(QueryError::InvalidDescriptor(format!(
                    "view '{}' cannot run at {} resolution",
                    view_name, tier
                )));
            }
            return Ok(ResolutionPlan::single(range, tier));
        }

        let primary = self.selector.select(&range, &tiers).ok_or_else(|| {
            QueryError::InvalidDescriptor(format!("view '{}' has no stored tier", view_name))
        })?;

        if range.is_point() {
            return Ok(ResolutionPlan::single(range, primary));
        }

        let presence = self.presence(view.domain, primary, range).await?;
        let coverage = presence.total_coverage();
        tracing::debug!(
            view = view_name,
            %primary,
            %range,
            coverage,
            selector = self.selector.name(),
            "Primary tier coverage"
        );

        if coverage >= self.coverage_threshold {
            return Ok(ResolutionPlan::single(range, primary));
        }

        let mut alternates = Vec::new();
        if self.filler.uses_alternates() {
            for tier in fallback_order(primary) {
                if tiers.contains(&tier) {
                    alternates.push(self.presence(view.domain, tier, range).await?);
                }
            }
            if presence.is_empty() && alternates.iter().all(TierPresence::is_empty) {
                tracing::debug!(view = view_name, %range, "No tier holds data for range");
                return Ok(ResolutionPlan::no_data(range, primary));
            }
        }

        let ctx = FillContext {
            range,
            primary: &presence,
            alternates: &alternates,
            coverage_threshold: self.coverage_threshold,
            min_gap_periods: self.min_gap_periods,
        };
        let plan = self.filler.fill(&ctx);

        if let Err(e) = plan.validate(&range) {
            tracing::error!(
                view = view_name,
                filler = self.filler.name(),
                "Gap filler produced an invalid plan ({}), reading primary tier only",
                e
            );
            return Ok(ResolutionPlan::single(range, primary));
        }

        if plan.is_mixed() {
            tracing::info!(view = view_name, %range, "Planned mixed resolution: {}", plan);
        }
        Ok(plan)
    }

    /// Timestamps a tier holds over `range`; a missing table holds nothing
    ///
    /// The table's time bounds are checked first so a range entirely
    /// outside the stored data skips the timestamp scan.
    async fn presence(
        &self,
        domain: Domain,
        tier: ResolutionTier,
        range: TimeRange,
    ) -> QueryResult<TierPresence> {
        let Some(table) = self.registry.layout().table(domain, tier) else {
            return Ok(TierPresence::empty(tier, range));
        };

        let store = &self.store;
        let probe = move || async move {
            match store.time_bounds(table).await {
                Ok(Some((first, last))) if first < range.end && last >= range.start => {
                    store.timestamps(table, range).await
                }
                Ok(_) => Ok(Vec::new()),
                Err(e) => Err(e),
            }
        };
        match self.retry.run("presence probe", probe).await {
            Ok(timestamps) => Ok(TierPresence::new(tier, range, timestamps)),
            Err(StorageError::MissingTable(name)) => {
                tracing::warn!(%domain, %tier, table = %name, "Table missing, treating tier as empty");
                Ok(TierPresence::empty(tier, range))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EntityFilter;
    use crate::resolution::plan::{PlanSegment, SegmentSource};
    use crate::storage::TableLayout;
    use crate::testing::{days, grid, MemoryStore, DAY, HOUR};

    fn registry() -> Arc<ViewRegistry> {
        Arc::new(ViewRegistry::with_builtin(TableLayout::default()))
    }

    fn config() -> ResolutionConfig {
        ResolutionConfig {
            fine_max_days: 10.0,
            ..Default::default()
        }
    }

    fn manager(store: Arc<MemoryStore>) -> ResolutionManager {
        ResolutionManager::new(store, registry(), &config())
    }

    fn descriptor(range: TimeRange) -> QueryDescriptor {
        QueryDescriptor::builder(Domain::Generation)
            .view("generation_by_unit")
            .range(range)
            .filter(EntityFilter::All)
            .build()
            .unwrap()
    }

    /// Fine data everywhere except days 3..6, which only coarse data covers
    fn gap_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.insert("generation_5min", grid(ResolutionTier::Fine, days(0, 3), "ER01", 100.0));
        store.insert("generation_5min", grid(ResolutionTier::Fine, days(6, 9), "ER01", 100.0));
        store.insert("generation_30min", grid(ResolutionTier::Coarse, days(0, 9), "ER01", 100.0));
        store
    }

    #[tokio::test]
    async fn test_full_coverage_single_segment() {
        let store = Arc::new(MemoryStore::new());
        store.insert("generation_5min", grid(ResolutionTier::Fine, days(0, 2), "ER01", 1.0));

        let plan = manager(store).plan(&descriptor(days(0, 2))).await.unwrap();
        assert_eq!(plan, ResolutionPlan::single(days(0, 2), ResolutionTier::Fine));
    }

    #[tokio::test]
    async fn test_gap_filled_from_coarse() {
        let plan = manager(gap_store()).plan(&descriptor(days(0, 9))).await.unwrap();

        assert_eq!(plan.primary_tier, ResolutionTier::Fine);
        assert_eq!(
            plan.segments,
            vec![
                PlanSegment::new(days(0, 3), SegmentSource::Tier(ResolutionTier::Fine)),
                PlanSegment::new(days(3, 6), SegmentSource::Tier(ResolutionTier::Coarse)),
                PlanSegment::new(days(6, 9), SegmentSource::Tier(ResolutionTier::Fine)),
            ]
        );
        assert!(plan.validate(&days(0, 9)).is_ok());
    }

    #[tokio::test]
    async fn test_partial_alternate_marks_true_gap() {
        let store = Arc::new(MemoryStore::new());
        let coarse_span = TimeRange::try_new(3 * DAY, 4 * DAY + DAY / 2).unwrap();
        store.insert("generation_5min", grid(ResolutionTier::Fine, days(0, 3), "ER01", 1.0));
        store.insert("generation_30min", grid(ResolutionTier::Coarse, coarse_span, "ER01", 1.0));

        let plan = manager(store).plan(&descriptor(days(0, 6))).await.unwrap();
        assert!(plan.validate(&days(0, 6)).is_ok());
        assert_eq!(
            plan.segments,
            vec![
                PlanSegment::new(days(0, 3), SegmentSource::Tier(ResolutionTier::Fine)),
                PlanSegment::new(coarse_span, SegmentSource::Tier(ResolutionTier::Coarse)),
                PlanSegment::new(
                    TimeRange::try_new(coarse_span.end, 6 * DAY).unwrap(),
                    SegmentSource::NoData
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_plan_is_deterministic() {
        let manager = manager(gap_store());
        let d = descriptor(days(0, 9));
        let first = manager.plan(&d).await.unwrap();
        for _ in 0..5 {
            assert_eq!(manager.plan(&d).await.unwrap(), first);
        }
    }

    #[tokio::test]
    async fn test_plans_tile_generated_ranges() {
        let manager = manager(gap_store());
        // Ranges with odd offsets so gaps land off the coarse grid
        for i in 0..24i64 {
            let start = i * 7 * HOUR + i * 5 * 60 * 1000;
            let end = start + (i % 5 + 1) * DAY + i * 13 * 60 * 1000;
            let range = TimeRange::try_new(start, end).unwrap();
            let plan = manager.plan(&descriptor(range)).await.unwrap();
            assert!(plan.validate(&range).is_ok(), "range {} plan {}", range, plan);
        }
    }

    #[tokio::test]
    async fn test_range_outside_data_is_no_data() {
        let store = gap_store();
        let plan = manager(Arc::clone(&store)).plan(&descriptor(days(100, 102))).await.unwrap();
        assert!(plan.is_all_no_data());
        assert_eq!(plan.range(), Some(days(100, 102)));
        // Table bounds rule the range out before any timestamp scan
        assert_eq!(store.timestamp_scans(), 0);

        manager(Arc::clone(&store)).plan(&descriptor(days(0, 2))).await.unwrap();
        assert_eq!(store.timestamp_scans(), 1);
    }

    #[tokio::test]
    async fn test_missing_table_is_empty_not_error() {
        let store = Arc::new(MemoryStore::new());
        store.insert("generation_30min", grid(ResolutionTier::Coarse, days(0, 2), "ER01", 1.0));

        let plan = manager(store).plan(&descriptor(days(0, 2))).await.unwrap();
        assert_eq!(
            plan.segments,
            vec![PlanSegment::new(days(0, 2), SegmentSource::Tier(ResolutionTier::Coarse))]
        );
    }

    #[tokio::test]
    async fn test_point_range_single_segment() {
        let store = Arc::new(MemoryStore::new());
        let range = TimeRange::point(5 * 60 * 1000);
        let plan = manager(store).plan(&descriptor(range)).await.unwrap();
        assert_eq!(plan, ResolutionPlan::single(range, ResolutionTier::Fine));
    }

    #[tokio::test]
    async fn test_tier_hint() {
        let manager = manager(gap_store());
        let hinted = QueryDescriptor::builder(Domain::Generation)
            .view("generation_by_unit")
            .range(days(0, 9))
            .tier(ResolutionTier::Daily)
            .build()
            .unwrap();
        let plan = manager.plan(&hinted).await.unwrap();
        assert_eq!(plan, ResolutionPlan::single(days(0, 9), ResolutionTier::Daily));

        // Rooftop data has no fine tier
        let unsupported = QueryDescriptor::builder(Domain::Rooftop)
            .range(days(0, 1))
            .tier(ResolutionTier::Fine)
            .build()
            .unwrap();
        assert!(matches!(
            manager.plan(&unsupported).await,
            Err(QueryError::InvalidDescriptor(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_or_mismatched_view() {
        let manager = manager(gap_store());
        let unknown = QueryDescriptor::builder(Domain::Generation)
            .view("nope")
            .range(days(0, 1))
            .build()
            .unwrap();
        assert!(matches!(
            manager.plan(&unknown).await,
            Err(QueryError::InvalidDescriptor(_))
        ));

        let mismatched = QueryDescriptor::builder(Domain::Price)
            .view("generation_by_unit")
            .range(days(0, 1))
            .build()
            .unwrap();
        assert!(matches!(
            manager.plan(&mismatched).await,
            Err(QueryError::InvalidDescriptor(_))
        ));
    }

    #[tokio::test]
    async fn test_no_fallback_keeps_primary() {
        let cfg = ResolutionConfig {
            gap_filler: GapFillerKind::None,
            ..config()
        };
        let manager = ResolutionManager::new(gap_store(), registry(), &cfg);
        let plan = manager.plan(&descriptor(days(0, 9))).await.unwrap();
        assert_eq!(plan, ResolutionPlan::single(days(0, 9), ResolutionTier::Fine));
    }
}

//! View Executor
//!
//! Runs a bound [`ViewPlan`] over one time range:
//!
//! ```text
//! scan facts → resolve catalog attributes → join price → group → measures
//! ```
//!
//! Scans are read-only. Joins and grouping happen in memory so the executor
//! works against any [`AnalyticalStore`]. Rows come back sorted by
//! `(timestamp, dimensions)` and tagged with the plan tier.

use crate::catalog::{EntityCatalog, EntityFilter, EntityInfo, UNKNOWN};
use crate::query::result::Row;
use crate::resolution::detect_tier_strict;
use crate::storage::{AnalyticalStore, Domain, ScanRequest, StorageResult, TimeRange, TimeSeriesPoint};
use crate::views::definition::{Dimension, MeasureKind};
use crate::views::registry::ViewPlan;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Running totals for one output group
#[derive(Debug, Default)]
struct Accumulator {
    sum: f64,
    count: usize,
    max: Option<f64>,
    min: Option<f64>,
    /// Σ value over entities with a registered capacity
    rated_value: f64,
    capacity: f64,
    /// Σ value × price
    value_price: f64,
    /// Σ value over rows that had a price
    priced_value: f64,
}

impl Accumulator {
    fn add(&mut self, value: f64, capacity: Option<f64>, price: Option<f64>) {
        self.sum += value;
        self.count += 1;
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        if let Some(cap) = capacity {
            self.rated_value += value;
            self.capacity += cap;
        }
        if let Some(p) = price {
            self.value_price += value * p;
            self.priced_value += value;
        }
    }

    fn evaluate(&self, kind: MeasureKind, hours_per_interval: f64) -> f64 {
        match kind {
            MeasureKind::Sum => self.sum,
            MeasureKind::Mean => {
                if self.count == 0 {
                    0.0
                } else {
                    self.sum / self.count as f64
                }
            }
            MeasureKind::Max => self.max.unwrap_or(0.0),
            MeasureKind::Min => self.min.unwrap_or(0.0),
            MeasureKind::Energy => self.sum * hours_per_interval,
            MeasureKind::CapacityFactor => {
                if self.capacity > 0.0 {
                    self.rated_value / self.capacity
                } else {
                    0.0
                }
            }
            MeasureKind::Revenue => self.value_price * hours_per_interval,
            MeasureKind::VolumeWeightedPrice => {
                if self.priced_value != 0.0 {
                    self.value_price / self.priced_value
                } else {
                    0.0
                }
            }
        }
    }
}

/// Warn when facts are spaced finer than the tier the table is bound to
///
/// Such rows would be weighted by the wrong hours-per-interval and overstate
/// energy and revenue.
fn check_spacing(plan: &ViewPlan, facts: &[TimeSeriesPoint]) {
    let stamps: Vec<i64> = facts.iter().map(|f| f.timestamp).collect();
    if let Some(found) = detect_tier_strict(&stamps) {
        if found < plan.tier {
            tracing::warn!(
                table = %plan.fact_table,
                bound = %plan.tier,
                detected = %found,
                "Fact spacing is finer than the bound tier"
            );
        }
    }
}

/// Executes bound views against the analytical store
pub struct ViewExecutor {
    store: Arc<dyn AnalyticalStore>,
    catalog: Arc<EntityCatalog>,
}

impl ViewExecutor {
    pub fn new(store: Arc<dyn AnalyticalStore>, catalog: Arc<EntityCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Execute `plan` over `range`, restricted by `filter`
    pub async fn execute(
        &self,
        plan: &ViewPlan,
        range: TimeRange,
        filter: &EntityFilter,
    ) -> StorageResult<Vec<Row>> {
        let view = &plan.view;

        let mut request = ScanRequest::new(plan.fact_table.clone(), range);
        if let Some(entities) = filter.resolve(view.domain, &self.catalog) {
            request = request.entities(entities);
        }
        let facts = self.store.scan(&request).await?;
        check_spacing(plan, &facts);

        let prices = match &plan.price_table {
            Some(table) => self.load_prices(table, range).await?,
            None => HashMap::new(),
        };

        let mut groups: BTreeMap<(i64, Vec<String>), Accumulator> = BTreeMap::new();
        let mut unpriced = 0usize;

        for fact in &facts {
            let info = if view.join.catalog {
                Some(self.catalog.lookup(&fact.entity_id))
            } else {
                None
            };

            let region = region_of(view.domain, &fact.entity_id, info.as_ref());
            let price = if view.join.price {
                let p = prices.get(&(fact.timestamp, region.to_string())).copied();
                if p.is_none() {
                    unpriced += 1;
                }
                p
            } else {
                None
            };

            let dimensions: Vec<String> = view
                .group_by
                .iter()
                .map(|d| dimension_value(*d, view.domain, &fact.entity_id, info.as_ref()))
                .collect();

            let capacity = info.as_ref().and_then(|i| i.capacity_mw);
            groups
                .entry((fact.timestamp, dimensions))
                .or_default()
                .add(fact.value, capacity, price);
        }

        if unpriced > 0 {
            tracing::debug!(
                view = %view.name,
                tier = %plan.tier,
                unpriced,
                "Facts without a regional price were left out of revenue"
            );
        }

        let rows = groups
            .into_iter()
            .map(|((timestamp, dimensions), acc)| Row {
                timestamp,
                tier: plan.tier,
                dimensions,
                measures: view
                    .measures
                    .iter()
                    .map(|m| acc.evaluate(m.kind, plan.hours_per_interval))
                    .collect(),
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            view = %view.name,
            tier = %plan.tier,
            %range,
            facts = facts.len(),
            rows = rows.len(),
            "Executed view"
        );
        Ok(rows)
    }

    /// `(timestamp, region) → price` at the plan tier
    async fn load_prices(
        &self,
        table: &str,
        range: TimeRange,
    ) -> StorageResult<HashMap<(i64, String), f64>> {
        let points = self.store.scan(&ScanRequest::new(table, range)).await?;
        Ok(points
            .into_iter()
            .map(|p| ((p.timestamp, p.entity_id), p.value))
            .collect())
    }
}

fn region_of<'a>(domain: Domain, entity_id: &'a str, info: Option<&'a EntityInfo>) -> &'a str {
    if domain.keyed_by_region() {
        entity_id
    } else {
        info.map(|i| i.region.as_str()).unwrap_or(UNKNOWN)
    }
}

fn dimension_value(
    dimension: Dimension,
    domain: Domain,
    entity_id: &str,
    info: Option<&EntityInfo>,
) -> String {
    match dimension {
        Dimension::Entity => entity_id.to_string(),
        Dimension::Region => region_of(domain, entity_id, info).to_string(),
        Dimension::Station => info
            .map(|i| i.station.clone())
            .unwrap_or_else(|| UNKNOWN.to_string()),
        Dimension::Fuel => info
            .map(|i| i.fuel_type.clone())
            .unwrap_or_else(|| UNKNOWN.to_string()),
    }
}

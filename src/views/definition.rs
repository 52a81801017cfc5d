//! Aggregation view definitions
//!
//! A view is a declarative recipe: which domain's facts to read, what to
//! join them with, how to group them and which measures to compute. It says
//! nothing about resolution; binding a view to a tier happens in the
//! registry and produces a [`ViewPlan`](crate::views::ViewPlan).

use crate::resolution::ResolutionTier;
use crate::storage::Domain;
use serde::{Deserialize, Serialize};

/// A grouping key drawn from the fact or the entity catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// The fact's entity id
    Entity,
    /// Station name (catalog)
    Station,
    /// Fuel type (catalog)
    Fuel,
    /// Region (catalog, or the entity id for region-keyed domains)
    Region,
}

impl Dimension {
    /// Column name used in results
    pub fn column_name(&self) -> &'static str {
        match self {
            Dimension::Entity => "entity_id",
            Dimension::Station => "station",
            Dimension::Fuel => "fuel_type",
            Dimension::Region => "region",
        }
    }

    /// Whether resolving this dimension needs the entity catalog
    pub fn needs_catalog(&self) -> bool {
        matches!(self, Dimension::Station | Dimension::Fuel | Dimension::Region)
    }
}

/// How a measure column is computed from the facts in a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureKind {
    /// Σ value
    Sum,
    /// Σ value / count
    Mean,
    /// max value
    Max,
    /// min value
    Min,
    /// Σ value × hours per interval (MWh)
    Energy,
    /// Σ value / Σ registered capacity
    CapacityFactor,
    /// Σ value × price × hours per interval ($)
    Revenue,
    /// Σ (value × price) / Σ value ($/MWh)
    VolumeWeightedPrice,
}

impl MeasureKind {
    /// Whether the measure needs the regional price joined in
    pub fn needs_price(&self) -> bool {
        matches!(self, MeasureKind::Revenue | MeasureKind::VolumeWeightedPrice)
    }

    /// Whether the measure scales with interval length
    pub fn is_time_weighted(&self) -> bool {
        matches!(self, MeasureKind::Energy | MeasureKind::Revenue)
    }
}

/// A named output measure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureSpec {
    pub name: String,
    pub kind: MeasureKind,
}

impl MeasureSpec {
    pub fn new(name: impl Into<String>, kind: MeasureKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// What the facts are joined with before grouping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSpec {
    /// Attach catalog metadata (station, fuel, region, capacity)
    pub catalog: bool,
    /// Attach the regional price at the same timestamp and tier
    pub price: bool,
}

/// A named, parameterised query recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationView {
    /// Unique view name
    pub name: String,
    /// Domain whose facts drive the view
    pub domain: Domain,
    /// Human-readable description
    pub description: String,
    /// Tiers this recipe may be executed at
    pub tiers: Vec<ResolutionTier>,
    /// Joins applied before grouping
    pub join: JoinSpec,
    /// Grouping dimensions (timestamp is always the leading key)
    pub group_by: Vec<Dimension>,
    /// Output measures
    pub measures: Vec<MeasureSpec>,
}

impl AggregationView {
    /// Start a view over `domain` supporting every tier
    pub fn new(name: impl Into<String>, domain: Domain) -> Self {
        Self {
            name: name.into(),
            domain,
            description: String::new(),
            tiers: ResolutionTier::all().to_vec(),
            join: JoinSpec::default(),
            group_by: Vec::new(),
            measures: Vec::new(),
        }
    }

    /// Builder: set description
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Builder: restrict supported tiers
    pub fn tiers(mut self, tiers: &[ResolutionTier]) -> Self {
        self.tiers = tiers.to_vec();
        self
    }

    /// Builder: add a grouping dimension
    pub fn group(mut self, dimension: Dimension) -> Self {
        if dimension.needs_catalog() && !self.domain.keyed_by_region() {
            self.join.catalog = true;
        }
        self.group_by.push(dimension);
        self
    }

    /// Builder: add a measure
    pub fn measure(mut self, name: impl Into<String>, kind: MeasureKind) -> Self {
        if kind.needs_price() {
            self.join.price = true;
            self.join.catalog = true;
        }
        if kind == MeasureKind::CapacityFactor {
            self.join.catalog = true;
        }
        self.measures.push(MeasureSpec::new(name, kind));
        self
    }

    /// Whether the view may run at `tier`
    pub fn supports(&self, tier: ResolutionTier) -> bool {
        self.tiers.contains(&tier)
    }
}

/// The recipes registered by default
pub fn builtin_views() -> Vec<AggregationView> {
    use Dimension::*;
    use MeasureKind::*;

    vec![
        AggregationView::new("generation_by_fuel", Domain::Generation)
            .description("Total generation per fuel type")
            .group(Fuel)
            .measure("generation_mw", Sum)
            .measure("energy_mwh", Energy),
        AggregationView::new("generation_by_region_fuel", Domain::Generation)
            .description("Total generation per region and fuel type")
            .group(Region)
            .group(Fuel)
            .measure("generation_mw", Sum)
            .measure("energy_mwh", Energy),
        AggregationView::new("generation_by_unit", Domain::Generation)
            .description("Per-unit output with catalog attributes")
            .group(Entity)
            .group(Station)
            .group(Fuel)
            .group(Region)
            .measure("generation_mw", Sum)
            .measure("capacity_factor", CapacityFactor),
        AggregationView::new("revenue_by_fuel", Domain::Generation)
            .description("Market revenue per fuel type at the regional price")
            .group(Fuel)
            .measure("generation_mw", Sum)
            .measure("revenue", Revenue)
            .measure("volume_weighted_price", VolumeWeightedPrice),
        AggregationView::new("revenue_by_station", Domain::Generation)
            .description("Market revenue per station at the regional price")
            .group(Station)
            .group(Region)
            .measure("generation_mw", Sum)
            .measure("revenue", Revenue),
        AggregationView::new("price_by_region", Domain::Price)
            .description("Regional spot price")
            .group(Region)
            .measure("price", Mean)
            .measure("price_max", Max)
            .measure("price_min", Min),
        AggregationView::new("transmission_flows", Domain::Transmission)
            .description("Interconnector flows")
            .tiers(&[ResolutionTier::Fine, ResolutionTier::Coarse])
            .group(Entity)
            .measure("flow_mw", Sum),
        AggregationView::new("rooftop_by_region", Domain::Rooftop)
            .description("Estimated rooftop solar output per region")
            .tiers(&[ResolutionTier::Coarse, ResolutionTier::Daily])
            .group(Region)
            .measure("rooftop_mw", Sum)
            .measure("energy_mwh", Energy),
    ]
}

/// Name of the view used when a descriptor does not name one
pub fn default_view(domain: Domain) -> &'static str {
    match domain {
        Domain::Generation => "generation_by_fuel",
        Domain::Price => "price_by_region",
        Domain::Transmission => "transmission_flows",
        Domain::Rooftop => "rooftop_by_region",
    }
}

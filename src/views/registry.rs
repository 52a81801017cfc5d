//! View Registry
//!
//! Holds every registered [`AggregationView`] and binds a view to a tier on
//! request. Binding resolves the physical tables for that tier and fixes the
//! tier's interval length into the plan, so time-weighted measures can only
//! ever be scaled by the factor of the tier the rows are read from.

use crate::resolution::{hours_per_interval, ResolutionTier};
use crate::storage::{Domain, TableLayout};
use crate::views::definition::{builtin_views, AggregationView};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while registering or binding views
#[derive(Debug, Error, PartialEq)]
pub enum ViewError {
    #[error("Unknown view: {0}")]
    UnknownView(String),

    #[error("View {view} does not support the {tier} tier")]
    UnsupportedTier { view: String, tier: ResolutionTier },

    #[error("No {tier} table configured for domain {domain}")]
    NoTable { domain: Domain, tier: ResolutionTier },

    #[error("View already registered: {0}")]
    Duplicate(String),

    #[error("Invalid view {view}: {reason}")]
    Invalid { view: String, reason: String },
}

/// A view bound to one tier: everything needed to execute it
#[derive(Debug, Clone, PartialEq)]
pub struct ViewPlan {
    /// The recipe
    pub view: Arc<AggregationView>,
    /// Tier the facts are read at
    pub tier: ResolutionTier,
    /// Hours per interval of `tier`, applied to time-weighted measures
    pub hours_per_interval: f64,
    /// Fact table for the view's domain at `tier`
    pub fact_table: String,
    /// Price table at `tier` when the view joins prices
    pub price_table: Option<String>,
}

/// Registry of named views, immutable once the engine starts
#[derive(Debug)]
pub struct ViewRegistry {
    views: BTreeMap<String, Arc<AggregationView>>,
    layout: TableLayout,
}

impl ViewRegistry {
    /// An empty registry over a table layout
    pub fn new(layout: TableLayout) -> Self {
        Self {
            views: BTreeMap::new(),
            layout,
        }
    }

    /// A registry pre-loaded with the built-in views
    pub fn with_builtin(layout: TableLayout) -> Self {
        let mut registry = Self::new(layout);
        for view in builtin_views() {
            // Built-in names are unique, see definition tests
            if let Err(e) = registry.register(view) {
                tracing::error!("Failed to register built-in view: {}", e);
            }
        }
        registry
    }

    /// Register a view
    pub fn register(&mut self, view: AggregationView) -> Result<(), ViewError> {
        if self.views.contains_key(&view.name) {
            return Err(ViewError::Duplicate(view.name));
        }
        if view.measures.is_empty() {
            return Err(ViewError::Invalid {
                view: view.name,
                reason: "no measures".to_string(),
            });
        }
        if view.tiers.is_empty() {
            return Err(ViewError::Invalid {
                view: view.name,
                reason: "no supported tiers".to_string(),
            });
        }

        tracing::debug!(view = %view.name, domain = %view.domain, "Registered view");
        self.views.insert(view.name.clone(), Arc::new(view));
        Ok(())
    }

    /// Look up a view definition
    pub fn view(&self, name: &str) -> Result<Arc<AggregationView>, ViewError> {
        self.views
            .get(name)
            .cloned()
            .ok_or_else(|| ViewError::UnknownView(name.to_string()))
    }

    /// All registered views, by name
    pub fn views(&self) -> impl Iterator<Item = &Arc<AggregationView>> {
        self.views.values()
    }

    /// Table layout the registry binds against
    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    /// Tiers at which a view can actually execute, finest first
    ///
    /// The view must support the tier and every table it reads must exist
    /// at that tier.
    pub fn executable_tiers(&self, name: &str) -> Result<Vec<ResolutionTier>, ViewError> {
        let view = self.view(name)?;
        Ok(ResolutionTier::all()
            .iter()
            .copied()
            .filter(|tier| view.supports(*tier))
            .filter(|tier| self.layout.table(view.domain, *tier).is_some())
            .filter(|tier| !view.join.price || self.layout.table(Domain::Price, *tier).is_some())
            .collect())
    }

    /// Bind a view to a tier
    pub fn get_view(&self, name: &str, tier: ResolutionTier) -> Result<ViewPlan, ViewError> {
        let view = self.view(name)?;

        if !view.supports(tier) {
            return Err(ViewError::UnsupportedTier {
                view: view.name.clone(),
                tier,
            });
        }

        let fact_table = self
            .layout
            .table(view.domain, tier)
            .ok_or(ViewError::NoTable {
                domain: view.domain,
                tier,
            })?
            .to_string();

        let price_table = if view.join.price {
            Some(
                self.layout
                    .table(Domain::Price, tier)
                    .ok_or(ViewError::NoTable {
                        domain: Domain::Price,
                        tier,
                    })?
                    .to_string(),
            )
        } else {
            None
        };

        Ok(ViewPlan {
            view,
            tier,
            hours_per_interval: hours_per_interval(tier),
            fact_table,
            price_table,
        })
    }
}

//! Table layout
//!
//! Maps each `(domain, tier)` pair to the logical table holding its facts.
//! Not every domain is stored at every tier; a missing entry means the tier
//! is unavailable for that domain.

use crate::resolution::ResolutionTier;
use crate::storage::types::Domain;
use std::collections::BTreeMap;

/// Logical table names per domain and tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    tables: BTreeMap<(Domain, ResolutionTier), String>,
}

impl Default for TableLayout {
    fn default() -> Self {
        use Domain::*;
        use ResolutionTier::*;

        let mut layout = Self::empty();
        layout
            .set(Generation, Fine, "generation_5min")
            .set(Generation, Coarse, "generation_30min")
            .set(Generation, Daily, "generation_daily")
            .set(Price, Fine, "price_5min")
            .set(Price, Coarse, "price_30min")
            .set(Price, Daily, "price_daily")
            .set(Transmission, Fine, "transmission_5min")
            .set(Transmission, Coarse, "transmission_30min")
            .set(Rooftop, Coarse, "rooftop_30min")
            .set(Rooftop, Daily, "rooftop_daily");
        layout
    }
}

impl TableLayout {
    /// A layout with no tables
    pub fn empty() -> Self {
        Self {
            tables: BTreeMap::new(),
        }
    }

    /// Register (or replace) the table for a domain/tier pair
    pub fn set(&mut self, domain: Domain, tier: ResolutionTier, table: impl Into<String>) -> &mut Self {
        self.tables.insert((domain, tier), table.into());
        self
    }

    /// Remove a domain/tier pair
    pub fn unset(&mut self, domain: Domain, tier: ResolutionTier) -> &mut Self {
        self.tables.remove(&(domain, tier));
        self
    }

    /// Table for a domain/tier pair
    pub fn table(&self, domain: Domain, tier: ResolutionTier) -> Option<&str> {
        self.tables.get(&(domain, tier)).map(String::as_str)
    }

    /// Tiers stored for a domain, finest first
    pub fn tiers(&self, domain: Domain) -> Vec<ResolutionTier> {
        ResolutionTier::all()
            .iter()
            .copied()
            .filter(|tier| self.tables.contains_key(&(domain, *tier)))
            .collect()
    }

    /// Iterate over all entries
    pub fn iter(&self) -> impl Iterator<Item = (Domain, ResolutionTier, &str)> {
        self.tables
            .iter()
            .map(|((domain, tier), table)| (*domain, *tier, table.as_str()))
    }
}

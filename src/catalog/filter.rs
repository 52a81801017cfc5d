//! Entity filters
//!
//! Callers restrict a query to a set of entity ids or to a region. Filters
//! are normalised on construction so that logically identical filters
//! compare (and hash) equal.

use crate::catalog::{normalize_id, EntityCatalog};
use crate::storage::Domain;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Restriction on which entities a query reads
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityFilter {
    /// Every entity in the domain
    #[default]
    All,
    /// An explicit set of entity ids
    Entities(BTreeSet<String>),
    /// Every entity located in a region
    Region(String),
}

impl EntityFilter {
    /// Filter to explicit ids (normalised, deduplicated, sorted)
    pub fn entities<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: BTreeSet<String> = ids
            .into_iter()
            .map(|s| normalize_id(s.as_ref()))
            .filter(|s| !s.is_empty())
            .collect();
        if set.is_empty() {
            EntityFilter::All
        } else {
            EntityFilter::Entities(set)
        }
    }

    /// Filter to a region (normalised)
    pub fn region(region: impl AsRef<str>) -> Self {
        EntityFilter::Region(normalize_id(region.as_ref()))
    }

    /// Re-normalise a filter built by hand
    pub fn normalized(&self) -> Self {
        match self {
            EntityFilter::All => EntityFilter::All,
            EntityFilter::Entities(ids) => Self::entities(ids),
            EntityFilter::Region(r) => Self::region(r),
        }
    }

    /// Entity ids a scan of `domain` should be restricted to (None = no restriction)
    pub fn resolve(&self, domain: Domain, catalog: &EntityCatalog) -> Option<BTreeSet<String>> {
        match self {
            EntityFilter::All => None,
            EntityFilter::Entities(ids) => Some(ids.clone()),
            EntityFilter::Region(region) if domain.keyed_by_region() => {
                Some(std::iter::once(region.clone()).collect())
            }
            EntityFilter::Region(region) => Some(catalog.entities_in_region(region)),
        }
    }
}

impl std::fmt::Display for EntityFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityFilter::All => write!(f, "all"),
            EntityFilter::Entities(ids) => {
                write!(f, "entities={}", ids.iter().cloned().collect::<Vec<_>>().join(","))
            }
            EntityFilter::Region(r) => write!(f, "region={}", r),
        }
    }
}

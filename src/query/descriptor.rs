//! Query descriptors
//!
//! A descriptor says what a consumer wants: a domain, an optional view, a
//! time range, an entity filter, an optional resolution hint and how to
//! treat missing data. It is immutable once built.
//!
//! ```rust,ignore
//! let descriptor = QueryDescriptor::builder(Domain::Generation)
//!     .view("revenue_by_fuel")
//!     .range(TimeRange::last_days(2))
//!     .filter(EntityFilter::region("NSW1"))
//!     .build()?;
//! ```

use crate::catalog::EntityFilter;
use crate::query::error::{QueryError, QueryResult};
use crate::resolution::ResolutionTier;
use crate::storage::{Domain, TimeRange};
use crate::views::default_view;
use serde::{Deserialize, Serialize};

/// Which tier to read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionHint {
    /// Let the engine choose and fall back across tiers
    #[default]
    Auto,
    /// Read exactly this tier, no fallback
    Tier(ResolutionTier),
}

/// How to treat parts of the range that cannot be served
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    /// Return what is available, annotated with coverage
    #[default]
    AllowPartial,
    /// Fail with `DataUnavailable` unless every segment is served
    RequireComplete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub domain: Domain,
    /// View name; the domain's default view when None
    pub view: Option<String>,
    pub range: TimeRange,
    pub filter: EntityFilter,
    pub resolution_hint: ResolutionHint,
    pub completeness: Completeness,
}

impl QueryDescriptor {
    pub fn builder(domain: Domain) -> QueryDescriptorBuilder {
        QueryDescriptorBuilder::new(domain)
    }

    /// View the query runs against
    pub fn view_name(&self) -> &str {
        self.view
            .as_deref()
            .unwrap_or_else(|| default_view(self.domain))
    }
}

/// Builder for [`QueryDescriptor`]
#[derive(Debug, Clone)]
pub struct QueryDescriptorBuilder {
    domain: Domain,
    view: Option<String>,
    start: Option<i64>,
    end: Option<i64>,
    filter: EntityFilter,
    resolution_hint: ResolutionHint,
    completeness: Completeness,
}

impl QueryDescriptorBuilder {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            view: None,
            start: None,
            end: None,
            filter: EntityFilter::All,
            resolution_hint: ResolutionHint::Auto,
            completeness: Completeness::AllowPartial,
        }
    }

    pub fn view(mut self, view: impl Into<String>) -> Self {
        self.view = Some(view.into());
        self
    }

    pub fn start(mut self, start: i64) -> Self {
        self.start = Some(start);
        self
    }

    pub fn end(mut self, end: i64) -> Self {
        self.end = Some(end);
        self
    }

    pub fn range(mut self, range: TimeRange) -> Self {
        self.start = Some(range.start);
        self.end = Some(range.end);
        self
    }

    pub fn filter(mut self, filter: EntityFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn tier(mut self, tier: ResolutionTier) -> Self {
        self.resolution_hint = ResolutionHint::Tier(tier);
        self
    }

    pub fn hint(mut self, hint: ResolutionHint) -> Self {
        self.resolution_hint = hint;
        self
    }

    pub fn require_complete(mut self) -> Self {
        self.completeness = Completeness::RequireComplete;
        self
    }

    pub fn completeness(mut self, completeness: Completeness) -> Self {
        self.completeness = completeness;
        self
    }

    /// Validate and build
    pub fn build(self) -> QueryResult<QueryDescriptor> {
        let start = self
            .start
            .ok_or_else(|| QueryError::InvalidDescriptor("missing start".to_string()))?;
        let end = self
            .end
            .ok_or_else(|| QueryError::InvalidDescriptor("missing end".to_string()))?;
        let range = TimeRange::try_new(start, end).ok_or_else(|| {
            QueryError::InvalidDescriptor(format!("end {} precedes start {}", end, start))
        })?;

        Ok(QueryDescriptor {
            domain: self.domain,
            view: self.view,
            range,
            filter: self.filter.normalized(),
            resolution_hint: self.resolution_hint,
            completeness: self.completeness,
        })
    }
}

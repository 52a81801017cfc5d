//! Query error types
//!
//! What a caller of `QueryManager::query` can see. Transient storage errors
//! never appear here: they are retried, and once retries run out they
//! become `DataUnavailable` or a degraded (but successful) result.

use crate::storage::StorageError;
use crate::views::ViewError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The descriptor is malformed or names something that does not exist
    #[error("Invalid query: {0}")]
    InvalidDescriptor(String),

    /// The data needed to answer cannot be read
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// The request did not finish within the configured time
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),
}

impl From<ViewError> for QueryError {
    fn from(err: ViewError) -> Self {
        QueryError::InvalidDescriptor(err.to_string())
    }
}

impl From<StorageError> for QueryError {
    fn from(err: StorageError) -> Self {
        QueryError::DataUnavailable(err.to_string())
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        let err: QueryError = ViewError::UnknownView("x".to_string()).into();
        assert!(matches!(err, QueryError::InvalidDescriptor(_)));

        let err: QueryError = StorageError::MissingTable("price_5min".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Data unavailable: Table not found: price_5min"
        );
    }
}

//! Storage error types
//!
//! Defines all errors that can occur while reading from the analytical store.

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// The store is momentarily unreadable (busy, locked, unavailable)
    #[error("Transient storage error: {0}")]
    Transient(String),

    /// Logical table does not exist in the store
    #[error("Table not found: {0}")]
    MissingTable(String),

    /// Any other SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(String),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Join(String),
}

impl StorageError {
    /// Whether a retry may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_) | StorageError::Join(_))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &err {
            rusqlite::Error::SqliteFailure(e, msg) => match e.code {
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure => StorageError::Transient(err.to_string()),
                _ => match msg {
                    Some(m) if m.starts_with("no such table") => {
                        StorageError::MissingTable(m.trim_start_matches("no such table: ").to_string())
                    }
                    _ => StorageError::Sqlite(err.to_string()),
                },
            },
            _ => StorageError::Sqlite(err.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::Join(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

//! Result cache
//!
//! - **lru**: in-memory LRU with byte budget and per-entry TTL
//! - **disk**: optional persistent tier (SQLite, lz4 + bincode + CRC32)
//! - **tiered**: memory in front of disk
//! - **key**: structured cache keys
//! - **ttl**: live and historical lifetimes
//!
//! ```text
//! get:  memory ──miss──▶ disk ──hit──▶ promote to memory
//! put:  memory + disk
//! ```

pub mod disk;
pub mod key;
pub mod lru;
pub mod tiered;
pub mod ttl;

pub use disk::DiskCache;
pub use key::CacheKey;
pub use lru::{CacheStats, CacheWeight, LruCache};
pub use tiered::{TieredCache, TieredStats};
pub use ttl::TtlPolicy;

use thiserror::Error;

/// Errors raised by the disk tier
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

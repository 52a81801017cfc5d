//! Engine context
//!
//! Everything a query needs, built once at startup and shared behind an
//! `Arc`: store, catalog, view registry, planner, executor and cache. There
//! are no globals; tests build as many independent contexts as they like.

use crate::cache::{CacheError, CacheKey, DiskCache, TieredCache, TtlPolicy};
use crate::catalog::{CatalogError, EntityCatalog};
use crate::config::{Config, ConfigError};
use crate::query::inflight::KeyedLocks;
use crate::query::manager::QueryManager;
use crate::query::result::TabularResult;
use crate::query::retry::RetryPolicy;
use crate::resolution::ResolutionManager;
use crate::storage::{AnalyticalStore, Domain, SqliteStore, StorageError};
use crate::views::{ViewExecutor, ViewRegistry};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Startup failures
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Failed to open analytical store: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to open disk cache: {0}")]
    Cache(#[from] CacheError),
}

pub struct EngineContext {
    pub catalog: Arc<EntityCatalog>,
    pub registry: Arc<ViewRegistry>,
    pub resolution: ResolutionManager,
    pub executor: ViewExecutor,
    pub cache: TieredCache<TabularResult>,
    pub inflight: KeyedLocks<CacheKey>,
    pub ttl: TtlPolicy,
    pub retry: RetryPolicy,
    pub query_timeout: Duration,
}

impl EngineContext {
    /// Build over an already opened store
    pub fn new(
        store: Arc<dyn AnalyticalStore>,
        catalog: EntityCatalog,
        config: &Config,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let catalog = Arc::new(catalog);
        let registry = Arc::new(ViewRegistry::with_builtin(config.storage.layout()?));
        let resolution =
            ResolutionManager::new(Arc::clone(&store), Arc::clone(&registry), &config.resolution)
                .retry(config.retry.clone());
        let executor = ViewExecutor::new(store, Arc::clone(&catalog));

        let cache = if config.cache.disk_enabled {
            let disk = DiskCache::open(&config.cache.disk_path, config.cache.disk_max_bytes)?;
            tracing::info!(path = ?config.cache.disk_path, "Disk cache enabled");
            TieredCache::with_disk(config.cache.memory_max_bytes, disk)
        } else {
            TieredCache::memory(config.cache.memory_max_bytes)
        };

        Ok(Self {
            catalog,
            registry,
            resolution,
            executor,
            cache,
            inflight: KeyedLocks::new(),
            ttl: config.cache.ttl_policy()?,
            retry: config.retry.clone(),
            query_timeout: config.engine.query_timeout(),
        })
    }

    /// Open the SQLite store and catalog named in `config`
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let store = SqliteStore::open(&config.storage.database)?
            .with_busy_timeout(Duration::from_millis(config.storage.busy_timeout_ms));

        let catalog = match &config.catalog.path {
            Some(path) => EntityCatalog::load(path)?,
            None => {
                tracing::warn!("No entity catalog configured, all entities will be unknown");
                EntityCatalog::empty()
            }
        };

        tracing::info!(
            database = ?config.storage.database,
            entities = catalog.len(),
            "Engine context ready"
        );
        Self::new(Arc::new(store), catalog, config)
    }

    /// Query manager for one domain
    pub fn query_manager(self: &Arc<Self>, domain: Domain) -> QueryManager {
        QueryManager::new(Arc::clone(self), domain)
    }
}

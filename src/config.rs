//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and `GRIDLENS_*` environment overrides.
//! Everything here is read once at startup and is immutable afterwards.

use crate::cache::TtlPolicy;
use crate::query::RetryPolicy;
use crate::resolution::ResolutionTier;
use crate::storage::{Domain, TableLayout};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub resolution: ResolutionConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Analytical store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database holding the fact tables
    #[serde(default = "default_database")]
    pub database: PathBuf,

    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    /// Table overrides keyed `"<domain>.<tier>"`, e.g. `"price.fine"`.
    /// An empty name removes the pair from the layout.
    #[serde(default)]
    pub tables: BTreeMap<String, String>,
}

fn default_database() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("gridlens").join("market.db"))
        .unwrap_or_else(|| PathBuf::from("./gridlens_data/market.db"))
}

fn default_busy_timeout() -> u64 {
    5000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            busy_timeout_ms: default_busy_timeout(),
            tables: BTreeMap::new(),
        }
    }
}

impl StorageConfig {
    /// Default layout with overrides applied
    pub fn layout(&self) -> Result<TableLayout, ConfigError> {
        let mut layout = TableLayout::default();
        for (key, table) in &self.tables {
            let (domain, tier) = parse_table_key(key)?;
            if table.trim().is_empty() {
                layout.unset(domain, tier);
            } else {
                layout.set(domain, tier, table.trim());
            }
        }
        Ok(layout)
    }
}

fn parse_table_key(key: &str) -> Result<(Domain, ResolutionTier), ConfigError> {
    let invalid = || ConfigError::Invalid(format!("bad table key '{}', expected <domain>.<tier>", key));
    let (domain, tier) = key.split_once('.').ok_or_else(invalid)?;
    let domain = Domain::parse(domain).ok_or_else(invalid)?;
    let tier = ResolutionTier::parse(tier).ok_or_else(invalid)?;
    Ok((domain, tier))
}

/// Entity catalog source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// CSV or JSON file; no catalog means every entity is unknown
    pub path: Option<PathBuf>,
}

/// Which gap filling strategy plans use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapFillerKind {
    #[default]
    Hybrid,
    None,
}

impl GapFillerKind {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "hybrid" => Some(Self::Hybrid),
            "none" | "off" => Some(Self::None),
            _ => None,
        }
    }
}

/// Tier selection and fallback
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Spans shorter than this read the fine tier
    pub fine_max_days: f64,
    /// Spans shorter than this (and not fine) read the coarse tier
    pub coarse_max_days: f64,
    /// Minimum fraction of expected periods for a tier to count as covering
    pub coverage_threshold: f64,
    /// Shorter runs of missing periods are not worth a fallback segment
    pub min_gap_periods: usize,
    pub gap_filler: GapFillerKind,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            fine_max_days: 7.0,
            coarse_max_days: 365.0,
            coverage_threshold: 0.95,
            min_gap_periods: 1,
            gap_filler: GapFillerKind::Hybrid,
        }
    }
}

/// Result cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub memory_max_bytes: usize,
    pub disk_enabled: bool,
    pub disk_path: PathBuf,
    pub disk_max_bytes: usize,
    /// Fallback live TTL for domains without an entry in `live_ttl_secs`
    pub default_live_ttl_secs: u64,
    /// Live TTL per domain name
    pub live_ttl_secs: BTreeMap<String, u64>,
    pub historical_ttl_secs: u64,
    /// Ranges ending within this many hours of now use the live TTL
    pub live_window_hours: u64,
}

fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .map(|p| p.join("gridlens").join("results.db"))
        .unwrap_or_else(|| PathBuf::from("./gridlens_data/results.db"))
}

impl Default for CacheConfig {
    fn default() -> Self {
        let live_ttl_secs = [
            ("generation", 300),
            ("price", 300),
            ("transmission", 300),
            ("rooftop", 1800),
        ]
        .into_iter()
        .map(|(d, s)| (d.to_string(), s))
        .collect();

        Self {
            memory_max_bytes: 256 * 1024 * 1024,
            disk_enabled: false,
            disk_path: default_cache_path(),
            disk_max_bytes: 1024 * 1024 * 1024,
            default_live_ttl_secs: 300,
            live_ttl_secs,
            historical_ttl_secs: 24 * 3600,
            live_window_hours: 48,
        }
    }
}

impl CacheConfig {
    pub fn ttl_policy(&self) -> Result<TtlPolicy, ConfigError> {
        let mut policy = TtlPolicy::new(
            Duration::from_secs(self.default_live_ttl_secs),
            Duration::from_secs(self.historical_ttl_secs),
            Duration::from_secs(self.live_window_hours * 3600),
        );
        for (name, secs) in &self.live_ttl_secs {
            let domain = Domain::parse(name)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown domain '{}' in cache.live_ttl_secs", name)))?;
            policy = policy.with_live(domain, Duration::from_secs(*secs));
        }
        Ok(policy)
    }
}

/// Request handling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Whole-request deadline
    pub query_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: 30_000,
        }
    }
}

impl EngineConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let mut config = Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })?;
        config.expand_paths();
        Ok(config)
    }

    /// Resolve a leading `~` in configured paths
    fn expand_paths(&mut self) {
        self.storage.database = expand_home(&self.storage.database);
        self.cache.disk_path = expand_home(&self.cache.disk_path);
        if let Some(path) = &self.catalog.path {
            self.catalog.path = Some(expand_home(path));
        }
    }

    /// Parse and validate TOML content
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("gridlens").join("config.toml")),
            Some(PathBuf::from("/etc/gridlens/config.toml")),
            Some(PathBuf::from("./gridlens.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Check that thresholds and budgets are consistent
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.resolution;
        if !(r.fine_max_days > 0.0 && r.fine_max_days < r.coarse_max_days) {
            return Err(ConfigError::Invalid(format!(
                "resolution: need 0 < fine_max_days ({}) < coarse_max_days ({})",
                r.fine_max_days, r.coarse_max_days
            )));
        }
        if !(r.coverage_threshold > 0.0 && r.coverage_threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "resolution: coverage_threshold {} must be in (0, 1]",
                r.coverage_threshold
            )));
        }
        if r.min_gap_periods == 0 {
            return Err(ConfigError::Invalid(
                "resolution: min_gap_periods must be at least 1".to_string(),
            ));
        }
        if self.cache.memory_max_bytes == 0 {
            return Err(ConfigError::Invalid(
                "cache: memory_max_bytes must be positive".to_string(),
            ));
        }
        if self.retry.maximum_attempts == 0 || self.retry.backoff_coefficient < 1.0 {
            return Err(ConfigError::Invalid(
                "retry: need maximum_attempts >= 1 and backoff_coefficient >= 1".to_string(),
            ));
        }
        if self.engine.query_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "engine: query_timeout_ms must be positive".to_string(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::Invalid(format!(
                "logging: unknown format '{}'",
                self.logging.format
            )));
        }
        self.storage.layout()?;
        self.cache.ttl_policy()?;
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Storage
        if let Some(path) = var("GRIDLENS_DATABASE") {
            self.storage.database = PathBuf::from(path);
        }
        if let Some(path) = var("GRIDLENS_CATALOG") {
            self.catalog.path = Some(PathBuf::from(path));
        }

        // Resolution
        if let Some(v) = var("GRIDLENS_COVERAGE_THRESHOLD").and_then(|v| v.parse().ok()) {
            self.resolution.coverage_threshold = v;
        }
        if let Some(v) = var("GRIDLENS_GAP_FILLER").and_then(|v| GapFillerKind::parse(&v)) {
            self.resolution.gap_filler = v;
        }

        // Cache
        if let Some(v) = var("GRIDLENS_CACHE_MEMORY_BYTES").and_then(|v| v.parse().ok()) {
            self.cache.memory_max_bytes = v;
        }
        if let Some(path) = var("GRIDLENS_CACHE_DIR") {
            self.cache.disk_enabled = true;
            self.cache.disk_path = PathBuf::from(path).join("results.db");
        }

        // Engine
        if let Some(v) = var("GRIDLENS_QUERY_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.engine.query_timeout_ms = v;
        }

        // Logging
        if let Some(level) = var("GRIDLENS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("GRIDLENS_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# GridLens Configuration
#
# Environment variables override these settings:
# - GRIDLENS_DATABASE
# - GRIDLENS_CATALOG
# - GRIDLENS_COVERAGE_THRESHOLD
# - GRIDLENS_GAP_FILLER
# - GRIDLENS_CACHE_MEMORY_BYTES
# - GRIDLENS_CACHE_DIR (enables the disk cache)
# - GRIDLENS_QUERY_TIMEOUT_MS
# - GRIDLENS_LOG_LEVEL
# - GRIDLENS_LOG_FORMAT

[storage]
# SQLite database holding the fact tables
database = "~/.local/share/gridlens/market.db"

# How long a read waits on a locked database (ms)
busy_timeout_ms = 5000

# Table overrides, keyed "<domain>.<tier>"; "" removes a pair
# [storage.tables]
# "price.fine" = "dispatch_price_5min"

[catalog]
# Entity metadata (CSV or JSON)
# path = "~/.local/share/gridlens/units.csv"

[resolution]
# Spans shorter than this read 5-minute data
fine_max_days = 7.0

# Spans shorter than this read 30-minute data; longer spans read daily data
coarse_max_days = 365.0

# Fraction of expected periods a tier must hold to count as covering
coverage_threshold = 0.95

# Gaps shorter than this many periods are left on the primary tier
min_gap_periods = 1

# Gap filling: hybrid (fall back to other tiers) or none
gap_filler = "hybrid"

[cache]
# In-memory result cache budget (bytes)
memory_max_bytes = 268435456

# Persistent second tier
disk_enabled = false
# disk_path = "~/.cache/gridlens/results.db"
disk_max_bytes = 1073741824

# Results reaching into the live window expire quickly (seconds)
default_live_ttl_secs = 300
historical_ttl_secs = 86400
live_window_hours = 48

[cache.live_ttl_secs]
generation = 300
price = 300
transmission = 300
rooftop = 1800

[retry]
# Retry transient storage errors with exponential backoff
initial_interval = 50
backoff_coefficient = 2.0
maximum_interval = 2000
maximum_attempts = 3

[engine]
# Whole-request deadline (ms)
query_timeout_ms = 30000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

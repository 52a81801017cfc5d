//! Entity Catalog
//!
//! Static metadata for market entities (generating units, interconnectors):
//! station, fuel type, region and registered capacity. Loaded once at
//! startup and shared read-only for the life of the process.
//!
//! Lookups never fail: an id with no metadata yet (new units appear in market
//! data before the registration list is refreshed) resolves to
//! [`EntityInfo::unknown`].
//!
//! # Example
//!
//! ```rust,no_run
//! use gridlens::catalog::EntityCatalog;
//!
//! let catalog = EntityCatalog::load_csv("units.csv".as_ref())?;
//! let info = catalog.lookup("BAYSW1");
//! println!("{} runs on {}", info.station, info.fuel_type);
//! # Ok::<(), gridlens::catalog::CatalogError>(())
//! ```

mod filter;

pub use filter::EntityFilter;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Placeholder used for every attribute of an unregistered entity
pub const UNKNOWN: &str = "UNKNOWN";

/// Metadata for one market entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInfo {
    /// Entity identifier (upper-case)
    #[serde(alias = "duid")]
    pub entity_id: String,
    /// Station or asset name
    pub station: String,
    /// Fuel / technology type
    pub fuel_type: String,
    /// Market region
    pub region: String,
    /// Registered capacity in MW, if known
    #[serde(default)]
    pub capacity_mw: Option<f64>,
}

impl EntityInfo {
    pub fn new(
        entity_id: impl Into<String>,
        station: impl Into<String>,
        fuel_type: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: normalize_id(&entity_id.into()),
            station: station.into(),
            fuel_type: fuel_type.into(),
            region: normalize_id(&region.into()),
            capacity_mw: None,
        }
    }

    /// Builder: set registered capacity
    pub fn capacity(mut self, mw: f64) -> Self {
        self.capacity_mw = Some(mw);
        self
    }

    /// The distinguished record for an entity with no metadata
    pub fn unknown(entity_id: &str) -> Self {
        Self {
            entity_id: normalize_id(entity_id),
            station: UNKNOWN.to_string(),
            fuel_type: UNKNOWN.to_string(),
            region: UNKNOWN.to_string(),
            capacity_mw: None,
        }
    }

    /// Whether this is the placeholder for an unregistered entity
    pub fn is_unknown(&self) -> bool {
        self.fuel_type == UNKNOWN && self.region == UNKNOWN
    }
}

/// Canonical form of entity and region identifiers
pub fn normalize_id(id: &str) -> String {
    id.trim().to_uppercase()
}

/// Errors raised while loading a catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Invalid catalog row {line}: {error}")]
    Row { line: u64, error: String },

    #[error("Failed to parse catalog JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Duplicate entity id: {0}")]
    Duplicate(String),
}

/// Immutable id → metadata mapping
#[derive(Debug, Default)]
pub struct EntityCatalog {
    entities: HashMap<String, EntityInfo>,
}

impl EntityCatalog {
    /// Build a catalog from records, rejecting duplicate ids
    pub fn from_entries(entries: impl IntoIterator<Item = EntityInfo>) -> Result<Self, CatalogError> {
        let mut entities = HashMap::new();
        for mut info in entries {
            info.entity_id = normalize_id(&info.entity_id);
            info.region = normalize_id(&info.region);
            if entities.contains_key(&info.entity_id) {
                return Err(CatalogError::Duplicate(info.entity_id));
            }
            entities.insert(info.entity_id.clone(), info);
        }
        Ok(Self { entities })
    }

    /// An empty catalog (every lookup resolves to unknown)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load from a CSV file with header `entity_id|duid,station,fuel_type,region,capacity_mw`
    pub fn load_csv(path: &Path) -> Result<Self, CatalogError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| CatalogError::Io {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?;

        let mut entries = Vec::new();
        for (idx, record) in reader.deserialize::<EntityInfo>().enumerate() {
            let info = record.map_err(|e| CatalogError::Row {
                line: e
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(idx as u64 + 2),
                error: e.to_string(),
            })?;
            entries.push(info);
        }

        let catalog = Self::from_entries(entries)?;
        tracing::info!("Loaded {} entities from {:?}", catalog.len(), path);
        Ok(catalog)
    }

    /// Load from a JSON array of records
    pub fn load_json(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let entries: Vec<EntityInfo> = serde_json::from_str(&content)?;
        let catalog = Self::from_entries(entries)?;
        tracing::info!("Loaded {} entities from {:?}", catalog.len(), path);
        Ok(catalog)
    }

    /// Load by file extension (`.json`, anything else is CSV)
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::load_json(path),
            _ => Self::load_csv(path),
        }
    }

    /// Metadata for an entity, or the unknown placeholder
    pub fn lookup(&self, entity_id: &str) -> EntityInfo {
        self.get(entity_id)
            .cloned()
            .unwrap_or_else(|| EntityInfo::unknown(entity_id))
    }

    /// Metadata for an entity if registered
    pub fn get(&self, entity_id: &str) -> Option<&EntityInfo> {
        match self.entities.get(entity_id) {
            Some(info) => Some(info),
            None => self.entities.get(&normalize_id(entity_id)),
        }
    }

    /// Ids of all entities registered in a region
    pub fn entities_in_region(&self, region: &str) -> BTreeSet<String> {
        let region = normalize_id(region);
        self.entities
            .values()
            .filter(|info| info.region == region)
            .map(|info| info.entity_id.clone())
            .collect()
    }

    /// Distinct fuel types, sorted
    pub fn fuel_types(&self) -> BTreeSet<String> {
        self.entities.values().map(|i| i.fuel_type.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn sample() -> EntityCatalog {
        EntityCatalog::from_entries(vec![
            EntityInfo::new("BAYSW1", "Bayswater", "Coal", "NSW1").capacity(660.0),
            EntityInfo::new("ER01", "Eraring", "Coal", "nsw1").capacity(720.0),
            EntityInfo::new("HDWF1", "Hornsdale Wind Farm", "Wind", "SA1"),
        ])
        .unwrap()
    }

    #[test]
    fn test_lookup_known() {
        let catalog = sample();
        let info = catalog.lookup("BAYSW1");
        assert_eq!(info.station, "Bayswater");
        assert_eq!(info.capacity_mw, Some(660.0));
        assert!(!info.is_unknown());

        // Normalised on both sides
        assert_eq!(catalog.lookup(" baysw1 ").station, "Bayswater");
    }

    #[test]
    fn test_lookup_unknown_is_not_an_error() {
        let catalog = sample();
        let info = catalog.lookup("NEWUNIT9");
        assert!(info.is_unknown());
        assert_eq!(info.entity_id, "NEWUNIT9");
        assert_eq!(info.region, UNKNOWN);
    }

    #[test]
    fn test_entities_in_region() {
        let catalog = sample();
        let nsw = catalog.entities_in_region("nsw1");
        assert_eq!(nsw.len(), 2);
        assert!(nsw.contains("ER01"));
        assert!(catalog.entities_in_region("VIC1").is_empty());
    }

    #[test]
    fn test_duplicate_rejected() {
        let result = EntityCatalog::from_entries(vec![
            EntityInfo::new("A", "a", "Coal", "NSW1"),
            EntityInfo::new("a", "b", "Gas", "NSW1"),
        ]);
        assert!(matches!(result, Err(CatalogError::Duplicate(_))));
    }

    #[test]
    fn test_load_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("units.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "duid,station,fuel_type,region,capacity_mw").unwrap();
        writeln!(file, "BAYSW1, Bayswater ,Coal,NSW1,660").unwrap();
        writeln!(file, "HDWF1,Hornsdale Wind Farm,Wind,SA1,").unwrap();
        drop(file);

        let catalog = EntityCatalog::load(&path).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.lookup("BAYSW1").station, "Bayswater");
        assert_eq!(catalog.lookup("HDWF1").capacity_mw, None);
    }

    #[test]
    fn test_load_csv_bad_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("units.csv");
        std::fs::write(
            &path,
            "duid,station,fuel_type,region,capacity_mw\nX,Y,Coal,NSW1,not-a-number\n",
        )
        .unwrap();

        assert!(matches!(
            EntityCatalog::load_csv(&path),
            Err(CatalogError::Row { .. })
        ));
    }

    #[test]
    fn test_load_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("units.json");
        std::fs::write(
            &path,
            r#"[{"entity_id":"ER01","station":"Eraring","fuel_type":"Coal","region":"NSW1","capacity_mw":720.0}]"#,
        )
        .unwrap();

        let catalog = EntityCatalog::load(&path).unwrap();
        assert_eq!(catalog.lookup("ER01").capacity_mw, Some(720.0));
    }
}

//! Registry of loaded library snapshots.
//!
//! Snapshots are keyed by `(species, version)` and shared out behind `Arc`,
//! so lookups are plain map reads against immutable data and never block.
//! Loading mutates the registry (`&mut self`); callers that need concurrent
//! loading wrap the registry themselves.

use crate::library::codec::{self, CodecError};
use crate::library::snapshot::LibrarySnapshot;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("no library for species '{species}' and version '{version}'")]
    NotFound { species: String, version: String },

    #[error("library '{species}' version '{version}' is already registered")]
    Duplicate { species: String, version: String },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Which snapshot version of a species to retrieve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSelector<'a> {
    /// Exact content-checksum version id.
    Exact(&'a str),
    /// The most recently loaded snapshot for the species. Version ids are
    /// checksums and carry no order, so recency is defined by load order.
    Latest,
}

/// Holds compiled library snapshots for lookup by species and version.
#[derive(Debug, Default)]
pub struct LibraryRegistry {
    snapshots: HashMap<(String, String), Arc<LibrarySnapshot>>,
    /// Versions per species, in load order; the last entry is `Latest`.
    by_species: HashMap<String, Vec<String>>,
}

impl LibraryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an already-compiled snapshot.
    ///
    /// # Errors
    ///
    /// `Duplicate` when the same `(species, version)` is already present.
    pub fn register(
        &mut self,
        snapshot: LibrarySnapshot,
    ) -> Result<Arc<LibrarySnapshot>, RegistryError> {
        let key = (
            snapshot.species().to_string(),
            snapshot.version().to_string(),
        );
        if self.snapshots.contains_key(&key) {
            return Err(RegistryError::Duplicate {
                species: key.0,
                version: key.1,
            });
        }
        debug!(species = %key.0, version = %key.1, "registering library snapshot");

        let snapshot = Arc::new(snapshot);
        self.by_species
            .entry(key.0.clone())
            .or_default()
            .push(key.1.clone());
        self.snapshots.insert(key, Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Load an artifact file (plain or gzipped JSON) and register it.
    ///
    /// # Errors
    ///
    /// Codec failures (IO, checksum, structure) and `Duplicate` keys.
    pub fn load_file(&mut self, path: &Path) -> Result<Arc<LibrarySnapshot>, RegistryError> {
        debug!(path = %path.display(), "loading library artifact");
        let snapshot = codec::read_file(path)?;
        self.register(snapshot)
    }

    /// Look up a snapshot.
    ///
    /// # Errors
    ///
    /// `NotFound` when the species is absent or the selector matches no
    /// loaded version.
    pub fn get(
        &self,
        species: &str,
        selector: VersionSelector<'_>,
    ) -> Result<Arc<LibrarySnapshot>, RegistryError> {
        let version = match selector {
            VersionSelector::Exact(version) => version,
            VersionSelector::Latest => self
                .by_species
                .get(species)
                .and_then(|versions| versions.last())
                .ok_or_else(|| RegistryError::NotFound {
                    species: species.to_string(),
                    version: "latest".to_string(),
                })?,
        };
        self.snapshots
            .get(&(species.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                species: species.to_string(),
                version: version.to_string(),
            })
    }

    /// Species with at least one loaded snapshot.
    pub fn species(&self) -> impl Iterator<Item = &str> {
        self.by_species.keys().map(String::as_str)
    }

    /// Number of loaded snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::anchor::AnchorPointKind as K;
    use crate::core::types::GeneType;
    use crate::library::compiler::{GeneRecord, LibraryCompiler};

    fn sample_snapshot(extra: bool) -> LibrarySnapshot {
        let mut records = vec![GeneRecord::reference(
            "TRBJ1-1*01",
            GeneType::Joining,
            "TGTGCCAGCAGTTTC",
        )
        .with_anchor(K::JBegin, 0)
        .with_anchor(K::Cdr3End, 9)
        .with_anchor(K::Fr4End, 15)];
        if extra {
            records.push(GeneRecord::derived(
                "TRBJ1-1*02",
                GeneType::Joining,
                "TRBJ1-1*01",
                ["SG3C"],
            ));
        }
        let mut compiler = LibraryCompiler::new("HomoSapiens");
        compiler.add_source("imgt", records);
        compiler.compile().unwrap()
    }

    #[test]
    fn test_register_and_get_exact() {
        let mut registry = LibraryRegistry::new();
        let snapshot = sample_snapshot(false);
        let version = snapshot.version().to_string();
        registry.register(snapshot).unwrap();

        let found = registry
            .get("HomoSapiens", VersionSelector::Exact(&version))
            .unwrap();
        assert_eq!(found.version(), version);
    }

    #[test]
    fn test_latest_is_most_recently_loaded() {
        let mut registry = LibraryRegistry::new();
        let first = sample_snapshot(false);
        let second = sample_snapshot(true);
        let second_version = second.version().to_string();
        registry.register(first).unwrap();
        registry.register(second).unwrap();

        let latest = registry.get("HomoSapiens", VersionSelector::Latest).unwrap();
        assert_eq!(latest.version(), second_version);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_not_found() {
        let registry = LibraryRegistry::new();
        assert!(matches!(
            registry.get("HomoSapiens", VersionSelector::Latest),
            Err(RegistryError::NotFound { .. })
        ));
        assert!(matches!(
            registry.get("HomoSapiens", VersionSelector::Exact("0123")),
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = LibraryRegistry::new();
        registry.register(sample_snapshot(false)).unwrap();
        assert!(matches!(
            registry.register(sample_snapshot(false)),
            Err(RegistryError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_load_file() {
        let snapshot = sample_snapshot(true);
        let version = snapshot.version().to_string();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("homosapiens.json.gz");
        codec::write_file(&snapshot, &path).unwrap();

        let mut registry = LibraryRegistry::new();
        let loaded = registry.load_file(&path).unwrap();
        assert_eq!(loaded.version(), version);
        assert_eq!(
            loaded.resolve_sequence("TRBJ1-1*02").unwrap().to_string(),
            "TGTCCCAGCAGTTTC"
        );
        assert_eq!(registry.species().count(), 1);
    }

    #[test]
    fn test_loaded_snapshots_are_shared() {
        let mut registry = LibraryRegistry::new();
        let snapshot = registry.register(sample_snapshot(false)).unwrap();
        let again = registry.get("HomoSapiens", VersionSelector::Latest).unwrap();
        assert!(Arc::ptr_eq(&snapshot, &again));
    }
}

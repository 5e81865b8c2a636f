//! Package discovery in workspaces

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use glob::glob;
use tracing::{debug, info};

use crate::capabilities::ManifestStore;
use crate::error::{ConfigError, Result};

use super::graph::PackageGraph;
use super::manifest::PackageManifest;

/// Manifest file name of a workspace package
pub const MANIFEST_FILE: &str = "package.json";

/// Per-run cache of loaded manifests, keyed by workspace-relative location.
///
/// Loading stays a pure function of the location; the cache only avoids
/// reading the same file twice within one invocation.
#[derive(Debug, Default)]
pub struct ManifestCache {
    entries: HashMap<PathBuf, PackageManifest>,
}

impl ManifestCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached manifest for a location, loading it on first use
    pub fn get_or_load(
        &mut self,
        store: &dyn ManifestStore,
        location: &Path,
    ) -> Result<&PackageManifest> {
        if !self.entries.contains_key(location) {
            let manifest = store.load_manifest(location)?;
            self.entries.insert(location.to_path_buf(), manifest);
        }
        self.entries
            .get(location)
            .ok_or_else(|| crate::error::GantryError::other("manifest cache entry vanished"))
    }

    /// Number of cached manifests
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been loaded yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A discovered workspace: the package graph plus the root manifest
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Workspace root directory
    pub root: PathBuf,
    /// Graph over the workspace packages
    pub graph: PackageGraph,
    /// Root `package.json`, used for root lifecycle hooks only
    pub root_manifest: Option<PackageManifest>,
}

/// Expands workspace globs into package locations and loads them
pub struct PackageDiscovery {
    root: PathBuf,
    patterns: Vec<String>,
    cache: ManifestCache,
}

impl PackageDiscovery {
    /// Create a discovery for a workspace root and its package globs
    pub fn new(root: impl Into<PathBuf>, patterns: Vec<String>) -> Self {
        Self {
            root: root.into(),
            patterns,
            cache: ManifestCache::new(),
        }
    }

    /// Workspace-relative package directories, sorted and de-duplicated.
    ///
    /// A glob match counts only when it is a directory holding a
    /// `package.json`. `node_modules` and the root itself are skipped.
    pub fn locations(&self) -> Result<Vec<PathBuf>> {
        let mut locations = BTreeSet::new();

        for pattern in &self.patterns {
            let full_pattern = self.root.join(pattern).to_string_lossy().to_string();
            debug!(pattern = %full_pattern, "expanding package glob");

            let entries = glob(&full_pattern).map_err(|e| ConfigError::InvalidValue {
                field: "packages".to_string(),
                message: format!("{}: {}", pattern, e),
            })?;

            for entry in entries {
                let path = entry.map_err(|e| ConfigError::InvalidValue {
                    field: "packages".to_string(),
                    message: e.to_string(),
                })?;

                if !path.is_dir() || !path.join(MANIFEST_FILE).is_file() {
                    continue;
                }

                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                if relative.as_os_str().is_empty()
                    || relative.components().any(|c| c.as_os_str() == "node_modules")
                {
                    continue;
                }

                locations.insert(relative.to_path_buf());
            }
        }

        Ok(locations.into_iter().collect())
    }

    /// Load every workspace package manifest, in location order
    pub fn discover(&mut self, store: &dyn ManifestStore) -> Result<Vec<PackageManifest>> {
        let locations = self.locations()?;
        let mut manifests = Vec::with_capacity(locations.len());
        for location in &locations {
            manifests.push(self.cache.get_or_load(store, location)?.clone());
        }

        info!(count = manifests.len(), "discovered packages");
        Ok(manifests)
    }

    /// Discover packages, build the graph and load the root manifest
    pub fn discover_workspace(&mut self, store: &dyn ManifestStore) -> Result<Workspace> {
        let manifests = self.discover(store)?;
        let graph = PackageGraph::build(manifests)?;
        let root_manifest = store.load_root_manifest()?;

        Ok(Workspace {
            root: self.root.clone(),
            graph,
            root_manifest,
        })
    }
}

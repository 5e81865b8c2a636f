//! package.json-backed manifest store

use std::path::{Path, PathBuf};

use gantry_core::error::Result;
use gantry_core::monorepo::discovery::MANIFEST_FILE;
use gantry_core::monorepo::manifest::PackageManifest;
use gantry_core::ManifestStore;
use tracing::{debug, instrument};

use crate::manifest::PackageJson;

/// Reads and writes `package.json` files below a workspace root
#[derive(Debug, Clone)]
pub struct NpmManifestStore {
    root: PathBuf,
}

impl NpmManifestStore {
    /// Create a store for a workspace root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Workspace root
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn manifest_path(&self, location: &Path) -> PathBuf {
        self.root.join(location).join(MANIFEST_FILE)
    }
}

impl ManifestStore for NpmManifestStore {
    #[instrument(skip(self), fields(location = %location.display()))]
    fn load_manifest(&self, location: &Path) -> Result<PackageManifest> {
        let path = self.manifest_path(location);
        let manifest = PackageJson::load(&path)?.to_manifest(location, &path)?;
        debug!(package = %manifest.name, version = %manifest.version, "loaded manifest");
        Ok(manifest)
    }

    fn load_root_manifest(&self) -> Result<Option<PackageManifest>> {
        let path = self.root.join(MANIFEST_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(PackageJson::load(&path)?.to_root_manifest()))
    }

    #[instrument(skip(self, manifest), fields(package = %manifest.name, version = %manifest.version))]
    fn write_manifest(&self, location: &Path, manifest: &PackageManifest) -> Result<PathBuf> {
        let path = self.manifest_path(location);
        let mut pkg = PackageJson::load(&path)?;
        pkg.update_from(manifest);
        pkg.save(&path)?;

        debug!(path = %path.display(), "manifest written");
        Ok(location.join(MANIFEST_FILE))
    }
}

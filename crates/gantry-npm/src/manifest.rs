//! npm package.json handling

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use gantry_core::error::{ManifestError, Result};
use gantry_core::monorepo::manifest::{DependencyCollection, PackageManifest};
use semver::Version;
use serde::{Deserialize, Serialize};

/// package.json structure.
///
/// Only the fields gantry reads are typed; everything else is carried in
/// `other` and written back untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    /// Package name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Package version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Whether package is private
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<bool>,

    /// Preserve other fields
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,

    /// Scripts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripts: Option<BTreeMap<String, String>>,

    /// Dependencies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<BTreeMap<String, String>>,

    /// Dev dependencies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_dependencies: Option<BTreeMap<String, String>>,

    /// Optional dependencies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_dependencies: Option<BTreeMap<String, String>>,

    /// Peer dependencies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_dependencies: Option<BTreeMap<String, String>>,
}

impl PackageJson {
    /// Load package.json from path
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ManifestError::NotFound(path.to_path_buf()).into())
            }
            Err(e) => return Err(ManifestError::Io(e).into()),
        };

        serde_json::from_str(&content).map_err(|e| {
            ManifestError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Save package.json to path as pretty JSON with a trailing newline
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut content = serde_json::to_string_pretty(self).map_err(|e| ManifestError::Write {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        content.push('\n');

        std::fs::write(path, content).map_err(|e| {
            ManifestError::Write {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
            .into()
        })
    }

    fn collection(&self, collection: DependencyCollection) -> Option<&BTreeMap<String, String>> {
        match collection {
            DependencyCollection::Dependencies => self.dependencies.as_ref(),
            DependencyCollection::DevDependencies => self.dev_dependencies.as_ref(),
            DependencyCollection::OptionalDependencies => self.optional_dependencies.as_ref(),
            DependencyCollection::PeerDependencies => self.peer_dependencies.as_ref(),
        }
    }

    fn collection_mut(
        &mut self,
        collection: DependencyCollection,
    ) -> &mut Option<BTreeMap<String, String>> {
        match collection {
            DependencyCollection::Dependencies => &mut self.dependencies,
            DependencyCollection::DevDependencies => &mut self.dev_dependencies,
            DependencyCollection::OptionalDependencies => &mut self.optional_dependencies,
            DependencyCollection::PeerDependencies => &mut self.peer_dependencies,
        }
    }

    /// Convert to the workspace manifest model.
    ///
    /// `path` is only used in diagnostics.
    pub fn to_manifest(&self, location: &Path, path: &Path) -> Result<PackageManifest> {
        let name = match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Err(missing(path, "name")),
        };
        let raw_version = self.version.as_deref().ok_or_else(|| missing(path, "version"))?;
        let version = Version::parse(raw_version).map_err(|e| ManifestError::InvalidVersion {
            path: path.to_path_buf(),
            version: raw_version.to_string(),
            message: e.to_string(),
        })?;

        Ok(self.fill(PackageManifest::new(name, version, location)))
    }

    /// Convert the workspace root manifest, which may omit name and version
    pub fn to_root_manifest(&self) -> PackageManifest {
        let name = self.name.clone().unwrap_or_else(|| "root".to_string());
        let version = self
            .version
            .as_deref()
            .and_then(|v| Version::parse(v).ok())
            .unwrap_or_else(|| Version::new(0, 0, 0));
        self.fill(PackageManifest::new(name, version, PathBuf::new()))
    }

    fn fill(&self, mut manifest: PackageManifest) -> PackageManifest {
        manifest = manifest.with_private(self.private.unwrap_or(false));
        for collection in DependencyCollection::ALL {
            for (name, spec) in self.collection(collection).into_iter().flatten() {
                manifest = manifest.with_dependency(collection, name, spec);
            }
        }
        for (name, command) in self.scripts.iter().flatten() {
            manifest = manifest.with_script(name, command);
        }
        manifest
    }

    /// Copy version and specifiers from a manifest; only specifiers already
    /// present in the file are replaced
    pub fn update_from(&mut self, manifest: &PackageManifest) {
        self.version = Some(manifest.version.to_string());
        for (collection, name, spec) in manifest.dependency_entries() {
            if let Some(entry) = self
                .collection_mut(collection)
                .as_mut()
                .and_then(|deps| deps.get_mut(name))
            {
                *entry = spec.to_string();
            }
        }
    }
}

fn missing(path: &Path, field: &str) -> gantry_core::GantryError {
    ManifestError::MissingField {
        path: path.to_path_buf(),
        field: field.to_string(),
    }
    .into()
}

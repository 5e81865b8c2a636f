//! Package manifest model

use std::collections::BTreeMap;
use std::path::PathBuf;

use semver::Version;
use serde::{Deserialize, Serialize};

/// A dependency collection in a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DependencyCollection {
    /// `dependencies`
    Dependencies,
    /// `devDependencies`
    DevDependencies,
    /// `optionalDependencies`
    OptionalDependencies,
    /// `peerDependencies`
    PeerDependencies,
}

impl DependencyCollection {
    /// All collections, in manifest order
    pub const ALL: [DependencyCollection; 4] = [
        Self::Dependencies,
        Self::DevDependencies,
        Self::OptionalDependencies,
        Self::PeerDependencies,
    ];

    /// Key used in `package.json`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dependencies => "dependencies",
            Self::DevDependencies => "devDependencies",
            Self::OptionalDependencies => "optionalDependencies",
            Self::PeerDependencies => "peerDependencies",
        }
    }
}

impl std::fmt::Display for DependencyCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A loaded package manifest.
///
/// Values are never mutated in place: `with_version` and `with_specifier`
/// return a new manifest that replaces this one when written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Package name, unique in the workspace
    pub name: String,
    /// Current version
    pub version: Version,
    /// Workspace-relative location of the package directory
    pub location: PathBuf,
    /// Whether the package is excluded from publishing
    pub private: bool,
    /// Dependency name to specifier, per collection
    pub dependencies: BTreeMap<DependencyCollection, BTreeMap<String, String>>,
    /// Script name to command
    pub scripts: BTreeMap<String, String>,
}

impl PackageManifest {
    /// Create a manifest with no dependencies or scripts
    pub fn new(name: impl Into<String>, version: Version, location: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            version,
            location: location.into(),
            private: false,
            dependencies: BTreeMap::new(),
            scripts: BTreeMap::new(),
        }
    }

    /// Set the private flag
    pub fn with_private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    /// Add or replace a dependency specifier
    pub fn with_dependency(
        mut self,
        collection: DependencyCollection,
        name: impl Into<String>,
        specifier: impl Into<String>,
    ) -> Self {
        self.dependencies
            .entry(collection)
            .or_default()
            .insert(name.into(), specifier.into());
        self
    }

    /// Add a script
    pub fn with_script(mut self, name: impl Into<String>, command: impl Into<String>) -> Self {
        self.scripts.insert(name.into(), command.into());
        self
    }

    /// Copy of this manifest carrying a new version
    pub fn with_version(&self, version: Version) -> Self {
        Self {
            version,
            ..self.clone()
        }
    }

    /// Copy of this manifest with one specifier replaced
    pub fn with_specifier(
        &self,
        collection: DependencyCollection,
        name: &str,
        specifier: impl Into<String>,
    ) -> Self {
        self.clone().with_dependency(collection, name, specifier)
    }

    /// Iterate every `(collection, name, specifier)` entry in manifest order
    pub fn dependency_entries(
        &self,
    ) -> impl Iterator<Item = (DependencyCollection, &str, &str)> + '_ {
        DependencyCollection::ALL.into_iter().flat_map(move |collection| {
            self.dependencies
                .get(&collection)
                .into_iter()
                .flat_map(move |deps| {
                    deps.iter()
                        .map(move |(name, spec)| (collection, name.as_str(), spec.as_str()))
                })
        })
    }

    /// Specifier for a dependency in a collection
    pub fn specifier(&self, collection: DependencyCollection, name: &str) -> Option<&str> {
        self.dependencies
            .get(&collection)
            .and_then(|deps| deps.get(name))
            .map(String::as_str)
    }

    /// Whether the manifest defines a script
    pub fn has_script(&self, name: &str) -> bool {
        self.scripts.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_entries_order() {
        let manifest = PackageManifest::new("app", Version::new(1, 0, 0), "packages/app")
            .with_dependency(DependencyCollection::PeerDependencies, "react", "^18.0.0")
            .with_dependency(DependencyCollection::Dependencies, "lib-b", "^1.0.0")
            .with_dependency(DependencyCollection::Dependencies, "lib-a", "workspace:*");

        let entries: Vec<_> = manifest.dependency_entries().collect();
        assert_eq!(
            entries,
            vec![
                (DependencyCollection::Dependencies, "lib-a", "workspace:*"),
                (DependencyCollection::Dependencies, "lib-b", "^1.0.0"),
                (DependencyCollection::PeerDependencies, "react", "^18.0.0"),
            ]
        );
    }

    #[test]
    fn test_with_version_leaves_original() {
        let manifest = PackageManifest::new("app", Version::new(1, 0, 0), "packages/app");
        let bumped = manifest.with_version(Version::new(1, 1, 0));
        assert_eq!(manifest.version, Version::new(1, 0, 0));
        assert_eq!(bumped.version, Version::new(1, 1, 0));
        assert_eq!(bumped.name, "app");
    }

    #[test]
    fn test_with_specifier() {
        let manifest = PackageManifest::new("app", Version::new(1, 0, 0), "packages/app")
            .with_dependency(DependencyCollection::Dependencies, "lib", "workspace:^");
        let updated = manifest.with_specifier(DependencyCollection::Dependencies, "lib", "^2.0.0");
        assert_eq!(
            updated.specifier(DependencyCollection::Dependencies, "lib"),
            Some("^2.0.0")
        );
        assert_eq!(
            manifest.specifier(DependencyCollection::Dependencies, "lib"),
            Some("workspace:^")
        );
    }
}

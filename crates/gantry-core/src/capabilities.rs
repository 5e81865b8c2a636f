//! Collaborator interfaces
//!
//! The graph builder, change collector, version planner and release
//! orchestrator only reach the outside world through these traits. Concrete
//! implementations live in `gantry-git`, `gantry-npm` and `gantry-changelog`;
//! tests substitute in-memory fakes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::monorepo::graph::PackageNode;
use crate::monorepo::manifest::PackageManifest;
use crate::types::BumpType;

/// Reads and writes package manifests
pub trait ManifestStore: Send + Sync {
    /// Load the manifest of the package at a workspace-relative location.
    ///
    /// Fails with `ManifestError::NotFound` when no manifest exists there.
    fn load_manifest(&self, location: &Path) -> Result<PackageManifest>;

    /// Load the workspace root manifest, if there is one
    fn load_root_manifest(&self) -> Result<Option<PackageManifest>>;

    /// Write a manifest back to its location; returns the written file,
    /// relative to the workspace root
    fn write_manifest(&self, location: &Path, manifest: &PackageManifest) -> Result<PathBuf>;
}

/// Version-control operations needed for change detection and releasing
pub trait VersionControl {
    /// Whether the repository has at least one commit
    fn has_commits(&self) -> Result<bool>;

    /// Most recent release tag reachable from HEAD, optionally restricted
    /// to tags matching a glob such as `*@*`
    fn last_release_tag(&self, pattern: Option<&str>) -> Result<Option<String>>;

    /// SHA of the repository's first commit
    fn first_commit(&self) -> Result<String>;

    /// SHA of HEAD
    fn head_sha(&self) -> Result<String>;

    /// Number of commits between a reference and HEAD
    fn commits_since(&self, reference: &str) -> Result<usize>;

    /// Repository-relative paths changed since `since` (a commit-ish, or a
    /// `a..b` range) under `location`
    fn diff_files(&self, since: &str, location: &Path) -> Result<Vec<String>>;

    /// Whether the working tree has no uncommitted changes
    fn is_clean(&self) -> Result<bool>;

    /// Current branch, `None` when HEAD is detached
    fn current_branch(&self) -> Result<Option<String>>;

    /// How many commits the current branch is behind its upstream on `remote`
    fn commits_behind_upstream(&self, remote: &str) -> Result<usize>;

    /// Stage the given workspace-relative files and commit them; returns the
    /// new commit SHA
    fn commit(&self, message: &str, files: &[PathBuf]) -> Result<String>;

    /// Create an annotated tag at HEAD
    fn tag(&self, name: &str, message: &str) -> Result<()>;

    /// Push refs (branch names or tag names) to a remote
    fn push(&self, remote: &str, refs: &[String]) -> Result<()>;
}

/// Options for a package-manager install
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Only refresh the lockfile
    pub package_lock_only: bool,
    /// Skip lifecycle scripts of dependencies
    pub ignore_scripts: bool,
}

/// Exit status of an external command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// Process exit code, `None` if killed by a signal
    pub code: Option<i32>,
}

impl ExitStatus {
    /// A successful status
    pub fn success() -> Self {
        Self { code: Some(0) }
    }

    /// Whether the command succeeded
    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Package-manager client
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Install dependencies in a directory
    async fn install(&self, directory: &Path, options: &InstallOptions) -> Result<()>;

    /// Run a named script in a package directory
    async fn run_script(&self, directory: &Path, script: &str) -> Result<ExitStatus>;
}

/// Parameters of a publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    /// Dist-tag to attach to the published version
    pub dist_tag: String,
    /// Registry override
    pub registry: Option<String>,
}

/// Package registry client
#[async_trait]
pub trait Registry: Send + Sync {
    /// Dist-tag map (tag -> version) of a package.
    ///
    /// Fails with `RegistryError::QueryFailed` when the registry could not
    /// be asked.
    async fn dist_tags(&self, package: &str, registry: Option<&str>)
        -> Result<BTreeMap<String, String>>;

    /// Publish the package in `directory`.
    ///
    /// Fails with `RegistryError::PublishConflict` when the version already
    /// exists and `RegistryError::Network` on transient failures.
    async fn publish(
        &self,
        manifest: &PackageManifest,
        directory: &Path,
        request: &PublishRequest,
    ) -> Result<()>;
}

/// Recommends a bump magnitude for a package
pub trait BumpRecommender {
    /// Bump for the package's pending changes
    fn recommend_bump(&self, node: &PackageNode) -> Result<BumpType>;
}

/// A changelog file that was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogUpdate {
    /// Workspace-relative path of the changelog
    pub path: PathBuf,
    /// Text of the entry that was added
    pub new_entry: String,
}

/// Conventional-commit analysis and changelog writing
pub trait ConventionalCommits: BumpRecommender {
    /// Prepend an entry for `version` to the package's changelog
    fn update_changelog(&self, node: &PackageNode, version: &Version) -> Result<ChangelogUpdate>;

    /// Prepend an entry to the workspace root changelog
    fn update_root_changelog(
        &self,
        version: &str,
        entries: &[(String, ChangelogUpdate)],
    ) -> Result<ChangelogUpdate>;
}

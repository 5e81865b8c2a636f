//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::monorepo::versioning::VersioningMode;

/// Main configuration for gantry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Workspace package globs, relative to the workspace root
    pub packages: PackagesConfig,

    /// Versioning configuration
    pub versioning: VersioningConfig,

    /// Change detection configuration
    pub changes: ChangesConfig,

    /// Git configuration
    pub git: GitConfig,

    /// Changelog configuration
    pub changelog: ChangelogConfig,

    /// Publishing configuration
    pub publish: PublishConfig,

    /// Release orchestration configuration
    pub release: ReleaseConfig,
}

/// Workspace package locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackagesConfig(pub Vec<String>);

impl Default for PackagesConfig {
    fn default() -> Self {
        Self(vec!["packages/*".to_string()])
    }
}

impl PackagesConfig {
    /// Configured glob patterns
    pub fn patterns(&self) -> &[String] {
        &self.0
    }
}

/// Versioning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VersioningConfig {
    /// Fixed or independent versioning
    pub mode: VersioningMode,

    /// Tag format for fixed mode (e.g., "v{version}")
    pub tag_format: String,

    /// Tag format for independent mode
    pub independent_tag_format: String,

    /// Build metadata appended to every computed version
    pub build_metadata: Option<String>,

    /// Pre-release identifier used for prerelease bumps
    pub preid: String,

    /// Dist-tag used when querying and publishing
    pub dist_tag: String,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            mode: VersioningMode::Fixed,
            tag_format: "v{version}".to_string(),
            independent_tag_format: "{name}@{version}".to_string(),
            build_metadata: None,
            preid: "alpha".to_string(),
            dist_tag: "latest".to_string(),
        }
    }
}

/// Change detection configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangesConfig {
    /// Globs of files that never mark a package as changed
    pub ignore_changes: Vec<String>,

    /// Only release packages with direct changes, never their dependents
    pub only_explicit_updates: bool,
}

/// Git configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Remote name
    pub remote: String,

    /// Branches releases may run from; empty allows any
    pub allow_branches: Vec<String>,

    /// Whether to require clean working directory
    pub require_clean: bool,

    /// Whether to refuse releasing when behind the upstream
    pub check_upstream: bool,

    /// Whether to push the release commit and tags
    pub push: bool,

    /// Commit message template
    pub commit_message: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            allow_branches: Vec::new(),
            require_clean: true,
            check_upstream: true,
            push: true,
            commit_message: "chore(release): publish {version}".to_string(),
        }
    }
}

/// Changelog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangelogConfig {
    /// Whether to generate changelogs
    pub enabled: bool,

    /// Changelog file name inside each package
    pub file: PathBuf,

    /// Title used in the file header
    pub header: String,

    /// Whether to also write a changelog at the workspace root
    pub root_changelog: bool,
}

impl Default for ChangelogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: PathBuf::from("CHANGELOG.md"),
            header: "Change Log".to_string(),
            root_changelog: true,
        }
    }
}

/// Publishing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Registry address; the package manager default when unset
    pub registry: Option<String>,

    /// Retries for push and publish on transient failures
    pub retries: u32,

    /// Delay between retries in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            registry: None,
            retries: 2,
            retry_delay_ms: 1000,
        }
    }
}

/// Release orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    /// Maximum concurrent lifecycle scripts and publishes
    pub concurrency: usize,

    /// Abort when the package graph contains cycles
    pub reject_cycles: bool,

    /// Refresh the lockfile after manifests are rewritten
    pub sync_lockfile: bool,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            reject_cycles: false,
            sync_lockfile: false,
        }
    }
}

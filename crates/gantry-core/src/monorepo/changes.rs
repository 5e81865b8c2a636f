//! Change detection for workspaces

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::capabilities::VersionControl;
use crate::error::{ConfigError, GitError, Result};

use super::graph::PackageGraph;
use super::versioning::VersioningMode;

/// Tag glob used to find the last release in independent mode
pub const INDEPENDENT_TAG_PATTERN: &str = "*@*";

/// Length of the abbreviated canary commit
const CANARY_SHA_LEN: usize = 8;

/// Tag glob for finding the last release tag
pub fn release_tag_pattern(mode: VersioningMode, tag_format: &str) -> String {
    match mode {
        VersioningMode::Independent => INDEPENDENT_TAG_PATTERN.to_string(),
        VersioningMode::Fixed => tag_format.replace("{version}", "*").replace("{name}", "*"),
    }
}

/// Where change detection starts from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ref", rename_all = "snake_case")]
pub enum Baseline {
    /// The most recent release tag
    LastTag(String),
    /// The first commit of the repository; no release exists yet
    FirstCommit(String),
    /// An explicit commit range, used for canary releases
    Range(String),
}

impl Baseline {
    /// Revision specifier to diff against
    pub fn revspec(&self) -> &str {
        match self {
            Self::LastTag(r) | Self::FirstCommit(r) | Self::Range(r) => r,
        }
    }
}

impl fmt::Display for Baseline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LastTag(tag) => write!(f, "tag {}", tag),
            Self::FirstCommit(sha) => write!(f, "first commit {}", sha),
            Self::Range(range) => write!(f, "range {}", range),
        }
    }
}

/// Packages forced into the change set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ForceInclude {
    /// Nothing forced
    #[default]
    None,
    /// Every package (`*`)
    All,
    /// Named packages
    Names(BTreeSet<String>),
}

impl ForceInclude {
    /// Whether a package is forced
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Names(names) => names.contains(name),
        }
    }

    /// Whether anything is forced
    pub fn is_set(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl FromStr for ForceInclude {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let names: BTreeSet<String> = s
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .collect();

        Ok(if names.contains("*") {
            Self::All
        } else if names.is_empty() {
            Self::None
        } else {
            Self::Names(names)
        })
    }
}

/// Why a package is in the change set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ChangeReason {
    /// Files in the package changed since the baseline
    DirectChanges { files: Vec<String> },
    /// Named by force-include
    Forced,
    /// No release tag exists yet
    NoPriorRelease,
    /// Canary release
    Canary,
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirectChanges { files } => write!(f, "{} changed file(s)", files.len()),
            Self::Forced => write!(f, "forced"),
            Self::NoPriorRelease => write!(f, "no prior release"),
            Self::Canary => write!(f, "canary"),
        }
    }
}

/// A directly changed package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedPackage {
    /// Package name
    pub name: String,
    /// Why it changed
    pub reason: ChangeReason,
}

/// Directly changed packages relative to a baseline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Changed packages in discovery order
    pub changed: Vec<ChangedPackage>,
    /// What the change set was computed against
    pub baseline: Baseline,
    /// HEAD is the last release tag and nothing was forced
    pub head_released: bool,
}

impl ChangeSet {
    /// Whether a package changed directly
    pub fn contains(&self, name: &str) -> bool {
        self.changed.iter().any(|c| c.name == name)
    }

    /// Whether nothing changed
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }
}

/// How a package came to be affected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum AffectCause {
    /// It changed directly
    Changed(ChangeReason),
    /// It depends, possibly transitively, on the named changed package
    DependencyChanged { via: String },
}

/// A package affected by the change set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedPackage {
    /// Package name
    pub name: String,
    /// Why it is affected
    pub cause: AffectCause,
}

/// The change set plus every package it affects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedPackages {
    /// Direct changes
    pub change_set: ChangeSet,
    /// Affected packages in discovery order
    pub affected: Vec<AffectedPackage>,
}

impl AffectedPackages {
    /// Names of affected packages in discovery order
    pub fn names(&self) -> Vec<String> {
        self.affected.iter().map(|a| a.name.clone()).collect()
    }

    /// Whether a package is affected
    pub fn contains(&self, name: &str) -> bool {
        self.affected.iter().any(|a| a.name == name)
    }

    /// Whether nothing is affected
    pub fn is_empty(&self) -> bool {
        self.affected.is_empty()
    }

    /// Number of affected packages
    pub fn len(&self) -> usize {
        self.affected.len()
    }
}

/// Options for change collection
#[derive(Debug, Clone, Default)]
pub struct ChangeOptions {
    /// Glob restricting the last-release-tag lookup
    pub tag_pattern: Option<String>,
    /// Canary mode
    pub canary: bool,
    /// Commit for canary mode, defaults to HEAD
    pub canary_ref: Option<String>,
    /// Forced packages
    pub force: ForceInclude,
    /// Globs for files that never count as changes
    pub ignore_changes: Vec<String>,
    /// Do not propagate changes to dependents
    pub only_explicit_updates: bool,
}

impl ChangeOptions {
    /// Restrict the tag lookup
    pub fn with_tag_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.tag_pattern = Some(pattern.into());
        self
    }

    /// Enable canary mode, optionally from a specific commit
    pub fn with_canary(mut self, commit: Option<String>) -> Self {
        self.canary = true;
        self.canary_ref = commit;
        self
    }

    /// Force packages into the change set
    pub fn with_force(mut self, force: ForceInclude) -> Self {
        self.force = force;
        self
    }

    /// Set ignore globs
    pub fn with_ignore_changes(mut self, patterns: Vec<String>) -> Self {
        self.ignore_changes = patterns;
        self
    }

    /// Suppress propagation to dependents
    pub fn with_only_explicit_updates(mut self, only: bool) -> Self {
        self.only_explicit_updates = only;
        self
    }
}

/// Ignore globs with matchBase semantics: patterns without a `/` match the
/// file name, others match the package-relative path
#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    basename: GlobSet,
    path: GlobSet,
}

impl IgnoreMatcher {
    /// Compile ignore patterns
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut basename = GlobSetBuilder::new();
        let mut path = GlobSetBuilder::new();

        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| ConfigError::InvalidValue {
                field: "changes.ignore_changes".to_string(),
                message: format!("{}: {}", pattern, e),
            })?;
            if pattern.contains('/') {
                path.add(glob);
            } else {
                basename.add(glob);
            }
        }

        let build = |builder: GlobSetBuilder| {
            builder.build().map_err(|e| ConfigError::InvalidValue {
                field: "changes.ignore_changes".to_string(),
                message: e.to_string(),
            })
        };

        Ok(Self {
            basename: build(basename)?,
            path: build(path)?,
        })
    }

    /// Whether a package-relative file is ignored
    pub fn is_ignored(&self, relative: &str) -> bool {
        let name = relative.rsplit('/').next().unwrap_or(relative);
        self.basename.is_match(name) || self.path.is_match(relative)
    }
}

/// Whether one package depends on another, memoised per (package, target)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reach {
    /// A path to the target exists
    Dependent,
    /// In progress, or no path on this branch
    Visited,
}

/// Transitive dependency queries over a graph.
///
/// `Dependent` results are kept for the lifetime of the closure. `Visited`
/// marks are dropped once the top-level query for their target returns so a
/// later query can still find a real path.
pub struct DependentClosure<'g> {
    graph: &'g PackageGraph,
    memo: HashMap<(String, String), Reach>,
}

impl<'g> DependentClosure<'g> {
    /// Create a closure over a graph
    pub fn new(graph: &'g PackageGraph) -> Self {
        Self {
            graph,
            memo: HashMap::new(),
        }
    }

    /// Whether `package` depends directly or transitively on `target`
    pub fn is_dependent_of(&mut self, package: &str, target: &str) -> bool {
        let found = self.search(package, target);
        self.memo
            .retain(|(_, t), reach| !(t == target && *reach == Reach::Visited));
        found
    }

    fn search(&mut self, package: &str, target: &str) -> bool {
        let key = (package.to_string(), target.to_string());
        match self.memo.get(&key) {
            Some(Reach::Dependent) => return true,
            Some(Reach::Visited) => return false,
            None => {}
        }
        self.memo.insert(key.clone(), Reach::Visited);

        let graph = self.graph;
        for dep in graph.local_dependencies(package) {
            if dep == target || self.search(dep, target) {
                self.memo.insert(key, Reach::Dependent);
                return true;
            }
        }
        false
    }

    /// Changed packages plus every package depending on one of them, in
    /// discovery order
    pub fn affected(&mut self, change_set: &ChangeSet) -> Vec<AffectedPackage> {
        let graph = self.graph;
        let mut affected = Vec::new();

        for node in graph.nodes() {
            if let Some(changed) = change_set.changed.iter().find(|c| c.name == node.name()) {
                affected.push(AffectedPackage {
                    name: changed.name.clone(),
                    cause: AffectCause::Changed(changed.reason.clone()),
                });
                continue;
            }

            let via = change_set
                .changed
                .iter()
                .find(|c| self.is_dependent_of(node.name(), &c.name));
            if let Some(changed) = via {
                affected.push(AffectedPackage {
                    name: node.name().to_string(),
                    cause: AffectCause::DependencyChanged {
                        via: changed.name.clone(),
                    },
                });
            }
        }

        affected
    }
}

/// Works out which packages changed since the last release
pub struct ChangeCollector<'a> {
    graph: &'a PackageGraph,
    vcs: &'a dyn VersionControl,
    options: ChangeOptions,
}

impl<'a> ChangeCollector<'a> {
    /// Create a collector
    pub fn new(graph: &'a PackageGraph, vcs: &'a dyn VersionControl, options: ChangeOptions) -> Self {
        Self {
            graph,
            vcs,
            options,
        }
    }

    /// Directly changed packages
    #[instrument(skip(self), fields(canary = self.options.canary))]
    pub fn collect(&self) -> Result<ChangeSet> {
        if self.options.canary {
            return self.collect_canary();
        }

        if !self.vcs.has_commits()? {
            return Err(GitError::NoCommits.into());
        }

        let Some(tag) = self
            .vcs
            .last_release_tag(self.options.tag_pattern.as_deref())?
        else {
            let first = self.vcs.first_commit()?;
            info!(first_commit = %first, "no release tag found, every package changed");
            let changed = self
                .graph
                .nodes()
                .iter()
                .map(|node| ChangedPackage {
                    name: node.name().to_string(),
                    reason: if self.options.force.matches(node.name()) {
                        ChangeReason::Forced
                    } else {
                        ChangeReason::NoPriorRelease
                    },
                })
                .collect();
            return Ok(ChangeSet {
                changed,
                baseline: Baseline::FirstCommit(first),
                head_released: false,
            });
        };

        let commits = self.vcs.commits_since(&tag)?;
        debug!(tag = %tag, commits, "found last release tag");

        if commits == 0 && !self.options.force.is_set() {
            info!(tag = %tag, "current HEAD is already released");
            return Ok(ChangeSet {
                changed: Vec::new(),
                baseline: Baseline::LastTag(tag),
                head_released: true,
            });
        }

        let ignore = IgnoreMatcher::new(&self.options.ignore_changes)?;
        let mut changed = Vec::new();
        for node in self.graph.nodes() {
            if self.options.force.matches(node.name()) {
                changed.push(ChangedPackage {
                    name: node.name().to_string(),
                    reason: ChangeReason::Forced,
                });
                continue;
            }

            let files = self.changed_files(&tag, node.location(), &ignore)?;
            if !files.is_empty() {
                debug!(package = %node.name(), files = files.len(), "package changed");
                changed.push(ChangedPackage {
                    name: node.name().to_string(),
                    reason: ChangeReason::DirectChanges { files },
                });
            }
        }

        info!(changed = changed.len(), baseline = %tag, "change detection complete");
        Ok(ChangeSet {
            changed,
            baseline: Baseline::LastTag(tag),
            head_released: false,
        })
    }

    fn collect_canary(&self) -> Result<ChangeSet> {
        let sha = match &self.options.canary_ref {
            Some(sha) => sha.clone(),
            None => self.vcs.head_sha()?,
        };
        let short: String = sha.chars().take(CANARY_SHA_LEN).collect();
        let range = format!("{short}^..{short}");
        info!(range = %range, "canary release, every package affected");

        Ok(ChangeSet {
            changed: self
                .graph
                .nodes()
                .iter()
                .map(|node| ChangedPackage {
                    name: node.name().to_string(),
                    reason: ChangeReason::Canary,
                })
                .collect(),
            baseline: Baseline::Range(range),
            head_released: false,
        })
    }

    /// Package-relative files changed since `since`, minus ignored ones
    fn changed_files(&self, since: &str, location: &Path, ignore: &IgnoreMatcher) -> Result<Vec<String>> {
        let prefix = location.to_string_lossy().replace('\\', "/");
        let prefix = prefix.trim_end_matches('/');

        let files = self
            .vcs
            .diff_files(since, location)?
            .into_iter()
            .map(|file| {
                file.strip_prefix(prefix)
                    .map(|rest| rest.trim_start_matches('/').to_string())
                    .unwrap_or(file)
            })
            .filter(|file| !ignore.is_ignored(file))
            .collect();
        Ok(files)
    }

    /// Directly changed packages plus their dependents
    pub fn collect_affected(&self) -> Result<AffectedPackages> {
        let change_set = self.collect()?;

        let affected = if self.options.canary || self.options.only_explicit_updates {
            change_set
                .changed
                .iter()
                .map(|c| AffectedPackage {
                    name: c.name.clone(),
                    cause: AffectCause::Changed(c.reason.clone()),
                })
                .collect()
        } else {
            DependentClosure::new(self.graph).affected(&change_set)
        };

        info!(
            changed = change_set.changed.len(),
            affected = affected.len(),
            "affected packages computed"
        );
        Ok(AffectedPackages {
            change_set,
            affected,
        })
    }
}

//! Release state tracking

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::stage::ReleaseStage;

/// How a package reached the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    /// Published by this release
    Published,
    /// The registry already had this version
    AlreadyPublished,
}

/// Something a release did to the outside world
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum SideEffect {
    /// A manifest was rewritten
    ManifestWritten { path: PathBuf },
    /// A changelog was written
    ChangelogWritten { path: PathBuf },
    /// A lifecycle script ran
    HookRan { package: String, hook: String },
    /// A lockfile was refreshed
    LockfileUpdated { path: PathBuf },
    /// The release commit was created
    CommitCreated { sha: String },
    /// A tag was created
    TagCreated { name: String },
    /// Refs were pushed
    RefsPushed { remote: String, refs: Vec<String> },
    /// A package is on the registry
    Published {
        package: String,
        version: String,
        status: PublishStatus,
    },
}

impl std::fmt::Display for SideEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ManifestWritten { path } => write!(f, "wrote {}", path.display()),
            Self::ChangelogWritten { path } => write!(f, "wrote {}", path.display()),
            Self::HookRan { package, hook } => write!(f, "ran {} in {}", hook, package),
            Self::LockfileUpdated { path } => write!(f, "updated {}", path.display()),
            Self::CommitCreated { sha } => write!(f, "committed {}", sha),
            Self::TagCreated { name } => write!(f, "tagged {}", name),
            Self::RefsPushed { remote, refs } => {
                write!(f, "pushed {} to {}", refs.join(", "), remote)
            }
            Self::Published {
                package,
                version,
                status: PublishStatus::Published,
            } => write!(f, "published {}@{}", package, version),
            Self::Published {
                package, version, ..
            } => write!(f, "{}@{} was already published", package, version),
        }
    }
}

/// Packages that completed a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedStage {
    /// The stage
    pub stage: ReleaseStage,
    /// Packages it processed, in completion order
    pub packages: Vec<String>,
}

/// Progress of one release, owned by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseState {
    /// Current stage
    pub stage: ReleaseStage,
    /// Packages the release touches, in discovery order
    pub touched: Vec<String>,
    /// Stages completed so far
    pub completed: Vec<CompletedStage>,
    /// Accumulated side effects
    pub side_effects: Vec<SideEffect>,
    pending: Vec<String>,
    done: Vec<String>,
}

impl Default for ReleaseState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseState {
    /// State of a release that has not started
    pub fn new() -> Self {
        Self {
            stage: ReleaseStage::Discover,
            touched: Vec::new(),
            completed: Vec::new(),
            side_effects: Vec::new(),
            pending: Vec::new(),
            done: Vec::new(),
        }
    }

    /// Enter a stage that processes `packages`
    pub fn begin(&mut self, stage: ReleaseStage, packages: Vec<String>) {
        self.stage = stage;
        self.pending = packages;
        self.done.clear();
    }

    /// Record that the current stage finished with a package
    pub fn mark_done(&mut self, package: impl Into<String>) {
        self.done.push(package.into());
    }

    /// Close the current stage
    pub fn finish(&mut self) {
        self.completed.push(CompletedStage {
            stage: self.stage,
            packages: std::mem::take(&mut self.done),
        });
        self.pending.clear();
    }

    /// Record a side effect
    pub fn record(&mut self, effect: SideEffect) {
        self.side_effects.push(effect);
    }

    /// Packages of the current stage it has not finished
    pub fn unprocessed(&self) -> Vec<String> {
        self.pending
            .iter()
            .filter(|p| !self.done.contains(p))
            .cloned()
            .collect()
    }

    /// Whether a stage has completed
    pub fn has_completed(&self, stage: ReleaseStage) -> bool {
        self.completed.iter().any(|c| c.stage == stage)
    }

    /// Paths written so far, in write order
    pub fn written_files(&self) -> Vec<PathBuf> {
        self.side_effects
            .iter()
            .filter_map(|e| match e {
                SideEffect::ManifestWritten { path }
                | SideEffect::ChangelogWritten { path }
                | SideEffect::LockfileUpdated { path } => Some(path.clone()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_bookkeeping() {
        let mut state = ReleaseState::new();
        state.begin(ReleaseStage::Changelog, vec!["a".into(), "b".into(), "c".into()]);
        state.mark_done("a");
        assert_eq!(state.unprocessed(), vec!["b", "c"]);

        state.mark_done("b");
        state.mark_done("c");
        state.finish();
        assert!(state.has_completed(ReleaseStage::Changelog));
        assert_eq!(state.completed[0].packages, vec!["a", "b", "c"]);
        assert!(state.unprocessed().is_empty());
    }

    #[test]
    fn test_written_files() {
        let mut state = ReleaseState::new();
        state.record(SideEffect::ManifestWritten {
            path: PathBuf::from("packages/a/package.json"),
        });
        state.record(SideEffect::HookRan {
            package: "a".into(),
            hook: "version".into(),
        });
        state.record(SideEffect::ChangelogWritten {
            path: PathBuf::from("packages/a/CHANGELOG.md"),
        });
        assert_eq!(
            state.written_files(),
            vec![
                PathBuf::from("packages/a/package.json"),
                PathBuf::from("packages/a/CHANGELOG.md")
            ]
        );
    }
}

//! Release stages

use serde::{Deserialize, Serialize};

/// Stages of a release, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStage {
    /// Check preconditions and build the package graph
    Discover,
    /// Collect changes and plan versions
    Plan,
    /// Ask for confirmation
    Confirm,
    /// Stage new manifests in memory
    ApplyVersionBumps,
    /// `preversion` lifecycle hooks
    PreVersion,
    /// Write manifests and changelogs
    Changelog,
    /// `version` lifecycle hooks
    Version,
    /// Create the release commit
    Commit,
    /// Create release tags
    Tag,
    /// `postversion` lifecycle hooks
    PostVersion,
    /// Push the branch and tags
    Push,
    /// Publish packages to the registry
    Publish,
}

impl ReleaseStage {
    /// Stage name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::Plan => "plan",
            Self::Confirm => "confirm",
            Self::ApplyVersionBumps => "apply-version-bumps",
            Self::PreVersion => "lifecycle:preversion",
            Self::Changelog => "changelog",
            Self::Version => "lifecycle:version",
            Self::Commit => "commit",
            Self::Tag => "tag",
            Self::PostVersion => "lifecycle:postversion",
            Self::Push => "push",
            Self::Publish => "publish",
        }
    }

    /// Whether failing in this stage can leave the repository modified
    pub fn is_mutating(&self) -> bool {
        *self >= Self::Changelog
    }
}

impl std::fmt::Display for ReleaseStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert!(ReleaseStage::Discover < ReleaseStage::PreVersion);
        assert!(ReleaseStage::Commit < ReleaseStage::Tag);
        assert!(ReleaseStage::Push < ReleaseStage::Publish);
    }

    #[test]
    fn test_mutating_stages() {
        assert!(!ReleaseStage::ApplyVersionBumps.is_mutating());
        assert!(!ReleaseStage::PreVersion.is_mutating());
        assert!(ReleaseStage::Changelog.is_mutating());
        assert!(ReleaseStage::Publish.is_mutating());
    }
}

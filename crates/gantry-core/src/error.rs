//! Error types for gantry
//!
//! Every error carries a stable diagnostic code (`ENOGIT`, `ECYCLE`, ...) so
//! callers and scripts can react to a failure class without parsing messages.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using GantryError
pub type Result<T> = std::result::Result<T, GantryError>;

/// Main error type for gantry operations
#[derive(Debug, Error)]
pub enum GantryError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Git-related errors
    #[error(transparent)]
    Git(#[from] GitError),

    /// Package graph errors
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Manifest loading and writing errors
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Version-related errors
    #[error(transparent)]
    Version(#[from] VersionError),

    /// Changelog-related errors
    #[error(transparent)]
    Changelog(#[from] ChangelogError),

    /// Registry errors
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Lifecycle script errors
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Workflow-related errors
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Broad failure class, used for exit codes and rollback decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input or configuration; nothing was touched
    Validation,
    /// Repository state does not allow a release
    Precondition,
    /// A release stopped after mutating the repository
    PartialRelease,
    /// A registry, network or process failure
    ExternalTool,
    /// The user interrupted the operation
    Cancelled,
}

impl GantryError {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }

    /// Stable diagnostic code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "ECONFIG",
            Self::Git(e) => e.code(),
            Self::Graph(e) => e.code(),
            Self::Manifest(e) => e.code(),
            Self::Version(_) => "EVERSION",
            Self::Changelog(_) => "ECHANGELOG",
            Self::Registry(e) => e.code(),
            Self::Lifecycle(e) => e.code(),
            Self::Workflow(e) => e.code(),
            Self::Io(_) => "EIO",
            Self::Json(_) => "EJSON",
            Self::Other(_) => "EUNKNOWN",
        }
    }

    /// Failure class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::Version(_) => ErrorKind::Validation,
            Self::Graph(GraphError::Cycle { .. }) => ErrorKind::Precondition,
            Self::Graph(_) => ErrorKind::Validation,
            Self::Manifest(ManifestError::Write { .. } | ManifestError::Io(_)) => {
                ErrorKind::ExternalTool
            }
            Self::Manifest(_) => ErrorKind::Validation,
            Self::Git(e) if e.is_precondition() => ErrorKind::Precondition,
            Self::Workflow(WorkflowError::Cancelled) => ErrorKind::Cancelled,
            Self::Workflow(WorkflowError::PreConditionFailed(_)) => ErrorKind::Precondition,
            Self::Workflow(WorkflowError::ValidationFailed(_)) => ErrorKind::Validation,
            _ => ErrorKind::ExternalTool,
        }
    }

    /// Whether retrying the failed operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Registry(RegistryError::Network { .. }) | Self::Git(GitError::RemoteUnreachable(_))
        )
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Git-related errors
#[derive(Debug, Error)]
pub enum GitError {
    /// Repository not found
    #[error("Git repository not found at {0}")]
    RepositoryNotFound(PathBuf),

    /// Not a git repository
    #[error("Not a git repository: {0}")]
    NotARepository(PathBuf),

    /// Failed to open repository
    #[error("Failed to open repository: {0}")]
    OpenFailed(String),

    /// No commits found
    #[error("No commits found in repository")]
    NoCommits,

    /// Working directory is not clean
    #[error("Working directory has uncommitted changes")]
    DirtyWorkingDirectory,

    /// Local branch is behind its upstream
    #[error("Local branch '{branch}' is behind {remote} by {behind} commit(s); pull first")]
    BehindUpstream {
        remote: String,
        branch: String,
        behind: usize,
    },

    /// Releasing from this branch is not allowed
    #[error("Branch '{branch}' is not allowed for releases (allowed: {allowed})")]
    BranchNotAllowed { branch: String, allowed: String },

    /// Tag already exists
    #[error("Tag already exists: {0}")]
    TagExists(String),

    /// Failed to create tag
    #[error("Failed to create tag {name}: {reason}")]
    TagCreationFailed { name: String, reason: String },

    /// Failed to create commit
    #[error("Failed to commit: {0}")]
    CommitFailed(String),

    /// Revision could not be resolved
    #[error("Invalid revision: {0}")]
    InvalidRevision(String),

    /// Failed to push
    #[error("Failed to push to remote: {0}")]
    PushFailed(String),

    /// Remote already has the pushed ref
    #[error("Remote already has ref: {0}")]
    RefAlreadyExists(String),

    /// Remote could not be reached
    #[error("Remote unreachable: {0}")]
    RemoteUnreachable(String),

    /// Remote not found
    #[error("Remote not found: {0}")]
    RemoteNotFound(String),

    /// Git2 library error
    #[error("Git error: {0}")]
    Git2(#[from] git2::Error),
}

impl GitError {
    /// Stable diagnostic code
    pub fn code(&self) -> &'static str {
        match self {
            Self::RepositoryNotFound(_) | Self::NotARepository(_) | Self::OpenFailed(_) => {
                "ENOGIT"
            }
            Self::NoCommits => "ENOCOMMIT",
            Self::DirtyWorkingDirectory => "EUNCOMMITTED",
            Self::BehindUpstream { .. } => "EBEHIND",
            Self::BranchNotAllowed { .. } => "ENOTALLOWED",
            Self::TagExists(_) => "ETAGEXISTS",
            Self::TagCreationFailed { .. } => "ETAG",
            Self::CommitFailed(_) => "ECOMMIT",
            Self::InvalidRevision(_) => "EREVISION",
            Self::PushFailed(_) | Self::RefAlreadyExists(_) | Self::RemoteNotFound(_) => "EPUSH",
            Self::RemoteUnreachable(_) => "ENETWORK",
            Self::Git2(_) => "EGIT",
        }
    }

    /// Whether this error means the repository is not ready for a release
    pub fn is_precondition(&self) -> bool {
        matches!(self.code(), "ENOGIT" | "ENOCOMMIT" | "EUNCOMMITTED" | "EBEHIND" | "ENOTALLOWED")
    }
}

/// Package graph errors
#[derive(Debug, Error)]
pub enum GraphError {
    /// Two packages share a name
    #[error("Package name '{name}' is used by both {} and {}", .first.display(), .second.display())]
    DuplicatePackage {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// Package name is empty
    #[error("Package at {0} has an empty name")]
    EmptyName(PathBuf),

    /// Dependency cycles present
    #[error("Dependency cycles detected: {}", format_cycles(.cycles))]
    Cycle { cycles: Vec<Vec<String>> },

    /// Package not in the workspace
    #[error("Package not found in workspace: {0}")]
    UnknownPackage(String),
}

impl GraphError {
    /// Stable diagnostic code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Cycle { .. } => "ECYCLE",
            Self::DuplicatePackage { .. } | Self::EmptyName(_) => "EPKGNAME",
            Self::UnknownPackage(_) => "ENOPKG",
        }
    }
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|c| {
            let mut path = c.join(" -> ");
            if let Some(first) = c.first() {
                path.push_str(" -> ");
                path.push_str(first);
            }
            path
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Manifest errors
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Manifest file not found
    #[error("Package manifest not found at {0}")]
    NotFound(PathBuf),

    /// Failed to parse manifest
    #[error("Failed to parse manifest {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    /// Required field missing
    #[error("Manifest {} is missing required field '{field}'", .path.display())]
    MissingField { path: PathBuf, field: String },

    /// Version field is not valid semver
    #[error("Manifest {} has invalid version '{version}': {message}", .path.display())]
    InvalidVersion {
        path: PathBuf,
        version: String,
        message: String,
    },

    /// Failed to write manifest
    #[error("Failed to write manifest {}: {message}", .path.display())]
    Write { path: PathBuf, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ManifestError {
    /// Stable diagnostic code
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "ENOPKG",
            Self::Parse { .. } | Self::MissingField { .. } => "EJSONPARSE",
            Self::InvalidVersion { .. } => "EVERSION",
            Self::Write { .. } | Self::Io(_) => "EWRITE",
        }
    }
}

/// Version-related errors
#[derive(Debug, Error)]
pub enum VersionError {
    /// Failed to parse version
    #[error("Failed to parse version '{0}': {1}")]
    ParseFailed(String, String),

    /// Build metadata is not a valid semver build string
    #[error("Invalid build metadata '{0}': must match [0-9A-Za-z-]+(.[0-9A-Za-z-]+)*")]
    InvalidBuildMetadata(String),

    /// Invalid bump type
    #[error("Invalid bump type: {0}")]
    InvalidBumpType(String),

    /// Semver error
    #[error("Semver error: {0}")]
    Semver(#[from] semver::Error),
}

/// Changelog-related errors
#[derive(Debug, Error)]
pub enum ChangelogError {
    /// Failed to generate changelog
    #[error("Failed to generate changelog for {package}: {reason}")]
    GenerationFailed { package: String, reason: String },

    /// Failed to write changelog
    #[error("Failed to write changelog {}: {message}", .path.display())]
    WriteFailed { path: PathBuf, message: String },
}

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry could not be asked at all
    #[error("Could not get dist-tags of {package} from the registry: {message}")]
    QueryFailed { package: String, message: String },

    /// The registry answered but the tag is absent
    #[error("No version found for {package}@{tag}")]
    DistTagMissing { package: String, tag: String },

    /// Version already published
    #[error("{package}@{version} is already published")]
    PublishConflict { package: String, version: String },

    /// Transient network failure
    #[error("Network error while handling {package}: {message}")]
    Network { package: String, message: String },

    /// Any other publish failure
    #[error("Failed to publish {package}: {message}")]
    PublishFailed { package: String, message: String },

    /// Registry address is not a valid URL
    #[error("Invalid registry address '{0}'")]
    InvalidRegistry(String),
}

impl RegistryError {
    /// Stable diagnostic code
    pub fn code(&self) -> &'static str {
        match self {
            Self::QueryFailed { .. } => "ENPMVIEW",
            Self::DistTagMissing { .. } => "ENODISTTAG",
            Self::PublishConflict { .. } => "EPUBLISHCONFLICT",
            Self::Network { .. } => "ENETWORK",
            Self::PublishFailed { .. } => "EPUBLISH",
            Self::InvalidRegistry(_) => "EREGISTRY",
        }
    }
}

/// Lifecycle script and package manager errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Script exited unsuccessfully
    #[error("{package}: lifecycle script '{script}' failed with exit code {}", .code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    HookFailed {
        package: String,
        script: String,
        code: Option<i32>,
    },

    /// Package manager executable missing
    #[error("Package manager '{0}' not found in PATH")]
    ToolMissing(String),

    /// Package manager command failed
    #[error("Command failed: {command} - {reason}")]
    CommandFailed { command: String, reason: String },
}

impl LifecycleError {
    /// Stable diagnostic code
    pub fn code(&self) -> &'static str {
        match self {
            Self::HookFailed { .. } => "ELIFECYCLE",
            Self::ToolMissing(_) => "ENOPM",
            Self::CommandFailed { .. } => "ECOMMAND",
        }
    }
}

/// Workflow-related errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Validation failed
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Pre-condition not met
    #[error("Pre-condition not met: {0}")]
    PreConditionFailed(String),

    /// Step failed
    #[error("Workflow step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// User cancelled
    #[error("Operation cancelled by user")]
    Cancelled,
}

impl WorkflowError {
    /// Stable diagnostic code
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationFailed(_) => "EVALIDATION",
            Self::PreConditionFailed(_) => "EPRECONDITION",
            Self::StepFailed { .. } => "ESTEP",
            Self::Cancelled => "ECANCELLED",
        }
    }
}

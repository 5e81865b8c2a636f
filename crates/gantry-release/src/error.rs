//! Release errors

use gantry_core::{ErrorKind, GantryError};
use thiserror::Error;

use crate::report::PartialRelease;

/// Result type for release operations
pub type Result<T> = std::result::Result<T, ReleaseError>;

/// Failure of a release
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// Failed before anything was modified
    #[error(transparent)]
    Failed(#[from] GantryError),

    /// Failed after the repository was modified
    #[error("{0}")]
    Partial(Box<PartialRelease>),
}

impl ReleaseError {
    /// Diagnostic code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Failed(e) => e.code(),
            Self::Partial(_) => "EPARTIAL",
        }
    }

    /// Failure class
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Failed(e) => e.kind(),
            Self::Partial(_) => ErrorKind::PartialRelease,
        }
    }

    /// The error that stopped the release
    pub fn root_cause(&self) -> &GantryError {
        match self {
            Self::Failed(e) => e,
            Self::Partial(report) => &report.source,
        }
    }

    /// Partial-release report, if the repository was modified
    pub fn partial(&self) -> Option<&PartialRelease> {
        match self {
            Self::Partial(report) => Some(report),
            Self::Failed(_) => None,
        }
    }
}

impl From<PartialRelease> for ReleaseError {
    fn from(report: PartialRelease) -> Self {
        Self::Partial(Box::new(report))
    }
}

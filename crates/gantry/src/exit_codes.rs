//! Exit codes for the CLI

use gantry_core::{ErrorKind, GantryError};
use gantry_release::ReleaseError;

/// General error
pub const ERROR: i32 = 1;

/// Bad configuration or input; nothing was touched
pub const VALIDATION_ERROR: i32 = 2;

/// Repository not ready for a release
pub const PRECONDITION_ERROR: i32 = 3;

/// A release stopped after modifying the repository
pub const PARTIAL_RELEASE: i32 = 4;

/// Registry, network or process failure
pub const EXTERNAL_TOOL_ERROR: i32 = 5;

/// User cancelled
pub const CANCELLED: i32 = 130;

/// Exit code for a failure class
pub fn for_kind(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Validation => VALIDATION_ERROR,
        ErrorKind::Precondition => PRECONDITION_ERROR,
        ErrorKind::PartialRelease => PARTIAL_RELEASE,
        ErrorKind::ExternalTool => EXTERNAL_TOOL_ERROR,
        ErrorKind::Cancelled => CANCELLED,
    }
}

/// Exit code for an error returned by a command
pub fn for_error(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<ReleaseError>() {
        return for_kind(e.kind());
    }
    if let Some(e) = err.downcast_ref::<GantryError>() {
        return for_kind(e.kind());
    }
    ERROR
}

/// Diagnostic code for an error returned by a command
pub fn diagnostic_code(err: &anyhow::Error) -> Option<&'static str> {
    if let Some(e) = err.downcast_ref::<ReleaseError>() {
        return Some(e.code());
    }
    err.downcast_ref::<GantryError>().map(GantryError::code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::error::{GitError, RegistryError, WorkflowError};
    use gantry_release::{PartialRelease, ReleaseState};

    #[test]
    fn test_codes_by_kind() {
        let dirty = anyhow::Error::from(GantryError::from(GitError::DirtyWorkingDirectory));
        assert_eq!(for_error(&dirty), PRECONDITION_ERROR);
        assert_eq!(diagnostic_code(&dirty), Some("EUNCOMMITTED"));

        let cancelled = anyhow::Error::from(ReleaseError::from(GantryError::from(
            WorkflowError::Cancelled,
        )));
        assert_eq!(for_error(&cancelled), CANCELLED);

        let other = anyhow::anyhow!("plain failure");
        assert_eq!(for_error(&other), ERROR);
        assert_eq!(diagnostic_code(&other), None);
    }

    #[test]
    fn test_partial_release_code() {
        let source = GantryError::from(RegistryError::Network {
            package: "pkg".into(),
            message: "timeout".into(),
        });
        let report = PartialRelease::from_state(&ReleaseState::new(), source);
        let err = anyhow::Error::from(ReleaseError::from(report));

        assert_eq!(for_error(&err), PARTIAL_RELEASE);
        assert_eq!(diagnostic_code(&err), Some("EPARTIAL"));
    }
}

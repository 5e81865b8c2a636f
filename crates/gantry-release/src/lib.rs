//! Gantry Release - Release orchestration for workspaces
//!
//! [`ReleaseOrchestrator`] drives a release through its stages: discover,
//! plan, confirm, apply version bumps, lifecycle hooks, changelogs, commit,
//! tag, push and publish. Every effect on the outside world goes through the
//! capability traits of `gantry_core`.

pub mod error;
pub mod lifecycle;
pub mod orchestrator;
pub mod pool;
pub mod report;
pub mod stage;
pub mod state;

pub use error::{ReleaseError, Result};
pub use orchestrator::{
    commit_message, AutoConfirm, Capabilities, Confirmation, ReleaseFlow, ReleaseOptions,
    ReleaseOrchestrator, ReleaseOutcome, ReleaseProgress, ReleaseSummary,
};
pub use pool::{CancelSignal, PoolReport, WorkerPool};
pub use report::PartialRelease;
pub use stage::ReleaseStage;
pub use state::{PublishStatus, ReleaseState, SideEffect};

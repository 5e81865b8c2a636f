//! Lifecycle hooks
//!
//! Each versioning hook runs as an explicit list of `(scope, hook)` steps.
//! `preversion` runs the root script before the package scripts; `version`
//! and `postversion` run the package scripts first. With root `root` and
//! package `pkg-1` the observable order is:
//!
//! ```text
//! root.preversion, pkg-1.preversion,
//! pkg-1.version, root.version,
//! pkg-1.postversion, root.postversion
//! ```
//!
//! When gantry itself was started from the root `version` script, root steps
//! are skipped so the release does not re-enter itself.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gantry_core::error::{LifecycleError, WorkflowError};
use gantry_core::monorepo::manifest::PackageManifest;
use gantry_core::{GantryError, PackageManager, Result};
use tracing::{debug, info, instrument};

use crate::pool::WorkerPool;
use crate::stage::ReleaseStage;
use crate::state::{ReleaseState, SideEffect};

/// Lifecycle event that disables root steps when gantry runs inside it
pub const RECURSION_GUARD_EVENT: &str = "version";

/// Where a lifecycle step runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookScope {
    /// The workspace root manifest
    Root,
    /// Every versioned package
    Packages,
}

/// Versioning lifecycle hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleHook {
    PreVersion,
    Version,
    PostVersion,
}

/// Steps of the `preversion` stage
pub const PREVERSION_STEPS: [(HookScope, LifecycleHook); 2] = [
    (HookScope::Root, LifecycleHook::PreVersion),
    (HookScope::Packages, LifecycleHook::PreVersion),
];

/// Steps of the `version` stage
pub const VERSION_STEPS: [(HookScope, LifecycleHook); 2] = [
    (HookScope::Packages, LifecycleHook::Version),
    (HookScope::Root, LifecycleHook::Version),
];

/// Steps of the `postversion` stage
pub const POSTVERSION_STEPS: [(HookScope, LifecycleHook); 2] = [
    (HookScope::Packages, LifecycleHook::PostVersion),
    (HookScope::Root, LifecycleHook::PostVersion),
];

impl LifecycleHook {
    /// Script name
    pub fn script(&self) -> &'static str {
        match self {
            Self::PreVersion => "preversion",
            Self::Version => "version",
            Self::PostVersion => "postversion",
        }
    }

    /// Ordered steps of this hook
    pub fn steps(&self) -> &'static [(HookScope, LifecycleHook)] {
        match self {
            Self::PreVersion => &PREVERSION_STEPS,
            Self::Version => &VERSION_STEPS,
            Self::PostVersion => &POSTVERSION_STEPS,
        }
    }

    /// Release stage running this hook
    pub fn stage(&self) -> ReleaseStage {
        match self {
            Self::PreVersion => ReleaseStage::PreVersion,
            Self::Version => ReleaseStage::Version,
            Self::PostVersion => ReleaseStage::PostVersion,
        }
    }
}

impl std::fmt::Display for LifecycleHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.script())
    }
}

#[derive(Debug, Clone)]
struct HookTarget {
    directory: PathBuf,
    has_script: bool,
}

/// Runs lifecycle scripts through the package manager
pub struct LifecycleRunner {
    package_manager: Arc<dyn PackageManager>,
    root: PathBuf,
    pool: WorkerPool,
    recursion_guard: Option<String>,
}

impl LifecycleRunner {
    /// Create a runner for a workspace root
    pub fn new(
        package_manager: Arc<dyn PackageManager>,
        root: impl Into<PathBuf>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            package_manager,
            root: root.into(),
            pool,
            recursion_guard: None,
        }
    }

    /// Lifecycle event gantry was started from, if any
    pub fn with_recursion_guard(mut self, event: Option<String>) -> Self {
        self.recursion_guard = event;
        self
    }

    /// Whether root steps are skipped
    pub fn skips_root(&self) -> bool {
        self.recursion_guard.as_deref() == Some(RECURSION_GUARD_EVENT)
    }

    /// Run every step of `hook`.
    ///
    /// Packages are marked done in `state` as their script finishes (or
    /// immediately when they do not define it); scripts that ran are recorded
    /// as side effects.
    #[instrument(skip_all, fields(hook = %hook, packages = packages.len()))]
    pub async fn run(
        &self,
        hook: LifecycleHook,
        root_manifest: Option<&PackageManifest>,
        packages: &[PackageManifest],
        predecessors: &BTreeMap<String, Vec<String>>,
        state: &mut ReleaseState,
    ) -> Result<()> {
        for (scope, step) in hook.steps() {
            match scope {
                HookScope::Root => self.run_root(*step, root_manifest, state).await?,
                HookScope::Packages => self.run_packages(*step, packages, predecessors, state).await?,
            }
        }
        Ok(())
    }

    async fn run_root(
        &self,
        hook: LifecycleHook,
        root_manifest: Option<&PackageManifest>,
        state: &mut ReleaseState,
    ) -> Result<()> {
        if self.skips_root() {
            debug!(hook = %hook, "skipping root script inside the version lifecycle");
            return Ok(());
        }
        let Some(root) = root_manifest.filter(|m| m.has_script(hook.script())) else {
            return Ok(());
        };

        run_script(self.package_manager.as_ref(), &self.root, &root.name, hook.script()).await?;
        state.record(SideEffect::HookRan {
            package: root.name.clone(),
            hook: hook.script().to_string(),
        });
        Ok(())
    }

    async fn run_packages(
        &self,
        hook: LifecycleHook,
        packages: &[PackageManifest],
        predecessors: &BTreeMap<String, Vec<String>>,
        state: &mut ReleaseState,
    ) -> Result<()> {
        let targets: Arc<HashMap<String, HookTarget>> = Arc::new(
            packages
                .iter()
                .map(|m| {
                    let target = HookTarget {
                        directory: self.root.join(&m.location),
                        has_script: m.has_script(hook.script()),
                    };
                    (m.name.clone(), target)
                })
                .collect(),
        );
        let names: Vec<String> = packages.iter().map(|m| m.name.clone()).collect();
        let script = hook.script();

        let report = self
            .pool
            .run(&names, predecessors, |name| {
                let package_manager = self.package_manager.clone();
                let target = targets.get(&name).cloned();
                async move {
                    match target {
                        Some(target) if target.has_script => {
                            run_script(package_manager.as_ref(), &target.directory, &name, script)
                                .await
                                .map(|()| true)
                        }
                        _ => Ok(false),
                    }
                }
            })
            .await;

        for (name, ran) in report.completed {
            if ran {
                state.record(SideEffect::HookRan {
                    package: name.clone(),
                    hook: script.to_string(),
                });
            }
            state.mark_done(name);
        }

        if let Some((_, error)) = report.failures.into_iter().next() {
            return Err(error);
        }
        if report.cancelled {
            return Err(WorkflowError::Cancelled.into());
        }
        Ok(())
    }
}

async fn run_script(
    package_manager: &dyn PackageManager,
    directory: &Path,
    package: &str,
    script: &str,
) -> Result<()> {
    info!(package, script, "running lifecycle script");
    let status = package_manager.run_script(directory, script).await?;
    if status.is_success() {
        return Ok(());
    }

    Err(GantryError::from(LifecycleError::HookFailed {
        package: package.to_string(),
        script: script.to_string(),
        code: status.code,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::CancelSignal;
    use async_trait::async_trait;
    use gantry_core::{ExitStatus, InstallOptions};
    use semver::Version;
    use std::sync::Mutex;

    /// Records `<directory name>.<script>` for every script run
    struct RecordingPackageManager {
        calls: Arc<Mutex<Vec<String>>>,
        failing: Option<String>,
    }

    #[async_trait]
    impl PackageManager for RecordingPackageManager {
        async fn install(&self, _directory: &Path, _options: &InstallOptions) -> Result<()> {
            Ok(())
        }

        async fn run_script(&self, directory: &Path, script: &str) -> Result<ExitStatus> {
            let dir = directory
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let call = format!("{}.{}", dir, script);
            let failed = self.failing.as_deref() == Some(call.as_str());
            self.calls.lock().unwrap().push(call);
            Ok(if failed {
                ExitStatus { code: Some(2) }
            } else {
                ExitStatus::success()
            })
        }
    }

    fn manifest_with_hooks(name: &str, location: &str) -> PackageManifest {
        PackageManifest::new(name, Version::new(1, 0, 0), location)
            .with_script("preversion", "echo pre")
            .with_script("version", "echo version")
            .with_script("postversion", "echo post")
    }

    fn runner(calls: Arc<Mutex<Vec<String>>>, failing: Option<&str>) -> LifecycleRunner {
        let package_manager = Arc::new(RecordingPackageManager {
            calls,
            failing: failing.map(str::to_string),
        });
        LifecycleRunner::new(package_manager, "/ws/root", WorkerPool::new(2, CancelSignal::new()))
    }

    async fn run_all(runner: &LifecycleRunner, state: &mut ReleaseState) {
        let root = manifest_with_hooks("root", "");
        let packages = vec![manifest_with_hooks("pkg-1", "packages/pkg-1")];
        for hook in [
            LifecycleHook::PreVersion,
            LifecycleHook::Version,
            LifecycleHook::PostVersion,
        ] {
            runner
                .run(hook, Some(&root), &packages, &BTreeMap::new(), state)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_six_step_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let runner = runner(calls.clone(), None);
        let mut state = ReleaseState::new();

        run_all(&runner, &mut state).await;

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "root.preversion",
                "pkg-1.preversion",
                "pkg-1.version",
                "root.version",
                "pkg-1.postversion",
                "root.postversion",
            ]
        );
        assert_eq!(state.side_effects.len(), 6);
    }

    #[tokio::test]
    async fn test_recursion_guard_skips_root() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let runner = runner(calls.clone(), None).with_recursion_guard(Some("version".to_string()));
        assert!(runner.skips_root());

        run_all(&runner, &mut ReleaseState::new()).await;

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["pkg-1.preversion", "pkg-1.version", "pkg-1.postversion"]
        );
    }

    #[tokio::test]
    async fn test_other_lifecycle_event_keeps_root() {
        let runner = runner(Arc::new(Mutex::new(Vec::new())), None)
            .with_recursion_guard(Some("release".to_string()));
        assert!(!runner.skips_root());
    }

    #[tokio::test]
    async fn test_undefined_script_is_not_run() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let runner = runner(calls.clone(), None);
        let packages = vec![
            PackageManifest::new("bare", Version::new(1, 0, 0), "packages/bare"),
            manifest_with_hooks("pkg-1", "packages/pkg-1"),
        ];
        let mut state = ReleaseState::new();
        state.begin(ReleaseStage::Version, vec!["bare".into(), "pkg-1".into()]);

        runner
            .run(LifecycleHook::Version, None, &packages, &BTreeMap::new(), &mut state)
            .await
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["pkg-1.version"]);
        assert!(state.unprocessed().is_empty());
        assert_eq!(state.side_effects.len(), 1);
    }

    #[tokio::test]
    async fn test_hook_failure() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let runner = runner(calls, Some("pkg-1.version"));
        let packages = vec![manifest_with_hooks("pkg-1", "packages/pkg-1")];
        let mut state = ReleaseState::new();
        state.begin(ReleaseStage::Version, vec!["pkg-1".into()]);

        let err = runner
            .run(LifecycleHook::Version, None, &packages, &BTreeMap::new(), &mut state)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "ELIFECYCLE");
        assert!(err.to_string().contains("exit code 2"));
        assert_eq!(state.unprocessed(), vec!["pkg-1"]);
    }
}

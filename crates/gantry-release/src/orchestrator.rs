//! Release orchestration
//!
//! A release runs these stages in order:
//!
//! 1. discover: preconditions, then the package graph
//! 2. plan: change collection and version planning
//! 3. confirm
//! 4. apply version bumps in memory (a dry run stops here)
//! 5. `preversion` hooks
//! 6. write manifests and changelogs, optionally refresh the lockfile
//! 7. `version` hooks
//! 8. commit
//! 9. tag
//! 10. `postversion` hooks
//! 11. push
//! 12. publish (publish flow only)
//!
//! A failure up to stage 5 leaves the repository untouched and returns the
//! plain error. From stage 6 on, failures return a [`PartialRelease`] report.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gantry_core::config::Config;
use gantry_core::error::{ConfigError, GitError, GraphError, RegistryError, WorkflowError};
use gantry_core::monorepo::{
    format_tag, release_tag_pattern, ChangeCollector, ChangeOptions, ExplicitBump, ForceInclude,
    PackageDiscovery, PackageGraph, PackageManifest, PackageNode, VersionPlan, VersionPlanner,
    VersioningMode, Workspace,
};
use gantry_core::{
    BumpRecommender, BumpType, ConventionalCommits, GantryError, InstallOptions, ManifestStore,
    PackageManager, PublishRequest, Registry, VersionControl,
};
use globset::{Glob, GlobSetBuilder};
use semver::Version;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use crate::lifecycle::{LifecycleHook, LifecycleRunner};
use crate::pool::{CancelSignal, WorkerPool};
use crate::report::PartialRelease;
use crate::stage::ReleaseStage;
use crate::state::{PublishStatus, ReleaseState, SideEffect};

/// Lockfile refreshed after manifests are rewritten
const LOCKFILE: &str = "package-lock.json";

/// Which stages a release runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseFlow {
    /// Version, commit, tag and push
    Version,
    /// Everything `Version` does, then publish
    Publish,
}

/// Options for a release
#[derive(Debug, Clone)]
pub struct ReleaseOptions {
    /// Stages to run
    pub flow: ReleaseFlow,
    /// Workspace package globs
    pub patterns: Vec<String>,
    /// Fixed or independent versioning
    pub mode: VersioningMode,
    /// Bump every package by this instead of asking commit history
    pub bump: Option<BumpType>,
    /// Use this version for every planned package
    pub exact_version: Option<Version>,
    /// Build metadata for every computed version
    pub build_metadata: Option<String>,
    /// Prerelease identifier
    pub preid: String,
    /// Fixed-mode tag format
    pub tag_format: String,
    /// Independent-mode tag format
    pub independent_tag_format: String,
    /// Dist-tag to publish under
    pub dist_tag: String,
    /// Registry override
    pub registry: Option<String>,
    /// Canary change detection
    pub canary: bool,
    /// Canary commit, HEAD when unset
    pub canary_ref: Option<String>,
    /// Packages forced into the release
    pub force: ForceInclude,
    /// Globs of files that never count as changes
    pub ignore_changes: Vec<String>,
    /// Do not release dependents of changed packages
    pub only_explicit_updates: bool,
    /// Stop after planning
    pub dry_run: bool,
    /// Push the release commit and tags
    pub push: bool,
    /// Remote to push to
    pub remote: String,
    /// Refuse to release from a dirty working tree
    pub require_clean: bool,
    /// Refuse to release when behind the upstream
    pub check_upstream: bool,
    /// Branch globs releases may run from; empty allows any
    pub allow_branches: Vec<String>,
    /// Commit message template
    pub commit_message: String,
    /// Write changelogs
    pub changelog: bool,
    /// Write the workspace root changelog
    pub root_changelog: bool,
    /// Refresh the lockfile after manifests are rewritten
    pub sync_lockfile: bool,
    /// Abort on dependency cycles
    pub reject_cycles: bool,
    /// Maximum concurrent hooks and publishes
    pub concurrency: usize,
    /// Retries for push and publish
    pub retries: u32,
    /// Delay between retries
    pub retry_delay: Duration,
    /// Lifecycle event gantry was started from
    pub recursion_guard: Option<String>,
}

impl ReleaseOptions {
    /// Options taken from configuration
    pub fn from_config(config: &Config, flow: ReleaseFlow) -> Self {
        Self {
            flow,
            patterns: config.packages.patterns().to_vec(),
            mode: config.versioning.mode,
            bump: None,
            exact_version: None,
            build_metadata: config.versioning.build_metadata.clone(),
            preid: config.versioning.preid.clone(),
            tag_format: config.versioning.tag_format.clone(),
            independent_tag_format: config.versioning.independent_tag_format.clone(),
            dist_tag: config.versioning.dist_tag.clone(),
            registry: config.publish.registry.clone(),
            canary: false,
            canary_ref: None,
            force: ForceInclude::None,
            ignore_changes: config.changes.ignore_changes.clone(),
            only_explicit_updates: config.changes.only_explicit_updates,
            dry_run: false,
            push: config.git.push,
            remote: config.git.remote.clone(),
            require_clean: config.git.require_clean,
            check_upstream: config.git.check_upstream,
            allow_branches: config.git.allow_branches.clone(),
            commit_message: config.git.commit_message.clone(),
            changelog: config.changelog.enabled,
            root_changelog: config.changelog.root_changelog,
            sync_lockfile: config.release.sync_lockfile,
            reject_cycles: config.release.reject_cycles,
            concurrency: config.release.concurrency,
            retries: config.publish.retries,
            retry_delay: Duration::from_millis(config.publish.retry_delay_ms),
            recursion_guard: None,
        }
    }

    /// Set dry run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set an explicit bump
    pub fn with_bump(mut self, bump: Option<BumpType>) -> Self {
        self.bump = bump;
        self
    }

    /// Force packages into the release
    pub fn with_force(mut self, force: ForceInclude) -> Self {
        self.force = force;
        self
    }

    /// Use canary change detection
    pub fn with_canary(mut self, commit: Option<String>) -> Self {
        self.canary = true;
        self.canary_ref = commit;
        self
    }

    /// Lifecycle event gantry was started from
    pub fn with_recursion_guard(mut self, event: Option<String>) -> Self {
        self.recursion_guard = event;
        self
    }

    /// Change detection settings these options imply
    pub fn change_options(&self) -> ChangeOptions {
        let options = ChangeOptions::default()
            .with_tag_pattern(release_tag_pattern(self.mode, &self.tag_format))
            .with_force(self.force.clone())
            .with_ignore_changes(self.ignore_changes.clone())
            .with_only_explicit_updates(self.only_explicit_updates);
        if self.canary {
            options.with_canary(self.canary_ref.clone())
        } else {
            options
        }
    }
}

/// External collaborators of a release
pub struct Capabilities<'a> {
    /// Manifest reads and writes
    pub manifests: &'a dyn ManifestStore,
    /// Version control
    pub vcs: &'a dyn VersionControl,
    /// Commit analysis and changelogs
    pub commits: &'a dyn ConventionalCommits,
    /// Lifecycle scripts and lockfile refresh
    pub package_manager: Arc<dyn PackageManager>,
    /// Publishing
    pub registry: Arc<dyn Registry>,
}

/// Decides whether a planned release goes ahead
pub trait Confirmation {
    /// Return `true` to continue with `plan`
    fn confirm(&self, plan: &VersionPlan) -> gantry_core::Result<bool>;
}

/// Fixed answer, used for `--yes` and in non-interactive runs
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl Confirmation for AutoConfirm {
    fn confirm(&self, _plan: &VersionPlan) -> gantry_core::Result<bool> {
        Ok(self.0)
    }
}

/// Notified as a release moves through its stages
pub trait ReleaseProgress {
    /// A stage is starting
    fn stage_started(&self, stage: ReleaseStage);
}

/// What a finished release did
#[derive(Debug, Clone)]
pub struct ReleaseSummary {
    /// The executed plan
    pub plan: VersionPlan,
    /// Release commit
    pub commit: String,
    /// Created tags
    pub tags: Vec<String>,
    /// Publish results in completion order
    pub published: Vec<(String, PublishStatus)>,
    /// Everything done to the outside world
    pub side_effects: Vec<SideEffect>,
}

/// How a release ended
#[derive(Debug, Clone)]
pub enum ReleaseOutcome {
    /// No package needs a release
    NothingToRelease,
    /// The confirmation was declined
    Declined,
    /// Dry run; the plan was not applied
    DryRun(VersionPlan),
    /// The release completed
    Released(ReleaseSummary),
}

/// Bump recommendations from commit history
struct CommitHistory<'a>(&'a dyn ConventionalCommits);

impl BumpRecommender for CommitHistory<'_> {
    fn recommend_bump(&self, node: &PackageNode) -> gantry_core::Result<BumpType> {
        self.0.recommend_bump(node)
    }
}

/// Drives a release through its stages
pub struct ReleaseOrchestrator<'a> {
    root: PathBuf,
    caps: Capabilities<'a>,
    options: ReleaseOptions,
    confirmation: &'a dyn Confirmation,
    progress: Option<&'a dyn ReleaseProgress>,
    cancel: CancelSignal,
    state: ReleaseState,
}

impl<'a> ReleaseOrchestrator<'a> {
    /// Create an orchestrator for the workspace at `root`
    pub fn new(
        root: impl Into<PathBuf>,
        caps: Capabilities<'a>,
        options: ReleaseOptions,
        confirmation: &'a dyn Confirmation,
    ) -> Self {
        Self {
            root: root.into(),
            caps,
            options,
            confirmation,
            progress: None,
            cancel: CancelSignal::new(),
            state: ReleaseState::new(),
        }
    }

    /// Share a cancel signal with the caller
    pub fn with_cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Report stage transitions
    pub fn with_progress(mut self, progress: &'a dyn ReleaseProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run the release
    #[instrument(skip(self), fields(root = %self.root.display(), mode = %self.options.mode))]
    pub async fn run(mut self) -> Result<ReleaseOutcome> {
        info!(
            flow = ?self.options.flow,
            dry_run = self.options.dry_run,
            "starting release"
        );

        let workspace = self.discover()?;
        let Some(plan) = self.plan(&workspace.graph)? else {
            info!("nothing to release");
            return Ok(ReleaseOutcome::NothingToRelease);
        };

        self.enter(ReleaseStage::Confirm, Vec::new())?;
        if !self.confirmation.confirm(&plan)? {
            info!("release declined");
            return Ok(ReleaseOutcome::Declined);
        }
        self.state.finish();

        let manifests = plan.apply(&workspace.graph);
        let touched: Vec<String> = manifests.iter().map(|m| m.name.clone()).collect();
        self.enter(ReleaseStage::ApplyVersionBumps, touched.clone())?;
        for name in &touched {
            self.state.mark_done(name.clone());
        }
        self.state.touched = touched;
        self.state.finish();

        if self.options.dry_run {
            info!(packages = plan.packages.len(), "dry run, stopping before any change");
            return Ok(ReleaseOutcome::DryRun(plan));
        }

        let versioned: Vec<PackageManifest> = manifests
            .iter()
            .filter(|m| plan.get(&m.name).is_some())
            .cloned()
            .collect();
        let predecessors = workspace.graph.ordering_constraints(&plan.names());
        let hooks = HookBatch {
            root_manifest: workspace.root_manifest.as_ref(),
            packages: &versioned,
            predecessors: &predecessors,
        };
        self.run_hook(LifecycleHook::PreVersion, &hooks).await?;

        match self.release(&workspace.graph, &plan, &manifests, &hooks).await {
            Ok(summary) => {
                info!(
                    commit = %summary.commit,
                    tags = summary.tags.len(),
                    published = summary.published.len(),
                    "release complete"
                );
                Ok(ReleaseOutcome::Released(summary))
            }
            Err(source) => {
                let report = PartialRelease::from_state(&self.state, source);
                error!(
                    stage = %report.failed_stage,
                    code = report.source.code(),
                    "release failed after modifying the repository"
                );
                Err(report.into())
            }
        }
    }

    /// Stages 6 to 12
    async fn release(
        &mut self,
        graph: &PackageGraph,
        plan: &VersionPlan,
        manifests: &[PackageManifest],
        hooks: &HookBatch<'_>,
    ) -> gantry_core::Result<ReleaseSummary> {
        self.write_files(graph, plan, manifests).await?;
        self.run_hook(LifecycleHook::Version, hooks).await?;
        let commit = self.commit(plan)?;
        let tags = self.tag(plan)?;
        self.run_hook(LifecycleHook::PostVersion, hooks).await?;
        self.push(&tags).await?;

        let published = match self.options.flow {
            ReleaseFlow::Publish => self.publish(graph, plan, manifests).await?,
            ReleaseFlow::Version => Vec::new(),
        };

        Ok(ReleaseSummary {
            plan: plan.clone(),
            commit,
            tags,
            published,
            side_effects: self.state.side_effects.clone(),
        })
    }

    fn enter(&mut self, stage: ReleaseStage, packages: Vec<String>) -> gantry_core::Result<()> {
        self.state.begin(stage, packages);
        if self.cancel.is_cancelled() {
            return Err(WorkflowError::Cancelled.into());
        }

        debug!(stage = %stage, "entering stage");
        if let Some(progress) = self.progress {
            progress.stage_started(stage);
        }
        Ok(())
    }

    fn pool(&self) -> WorkerPool {
        WorkerPool::new(self.options.concurrency, self.cancel.clone())
    }

    fn discover(&mut self) -> gantry_core::Result<Workspace> {
        self.enter(ReleaseStage::Discover, Vec::new())?;
        let vcs = self.caps.vcs;

        if !vcs.has_commits()? {
            return Err(GitError::NoCommits.into());
        }
        if self.options.require_clean && !vcs.is_clean()? {
            return Err(GitError::DirtyWorkingDirectory.into());
        }

        let branch = vcs.current_branch()?;
        self.check_branch(branch.as_deref())?;

        if self.options.push && self.options.check_upstream {
            let behind = vcs.commits_behind_upstream(&self.options.remote)?;
            if behind > 0 {
                return Err(GitError::BehindUpstream {
                    remote: self.options.remote.clone(),
                    branch: branch.unwrap_or_else(|| "HEAD".to_string()),
                    behind,
                }
                .into());
            }
        }

        let mut discovery = PackageDiscovery::new(self.root.clone(), self.options.patterns.clone());
        let workspace = discovery.discover_workspace(self.caps.manifests)?;
        info!(packages = workspace.graph.len(), "discovered workspace");

        if self.options.reject_cycles {
            if let Some(cycle) = workspace.graph.cycle_diagnostic() {
                return Err(cycle.into());
            }
        }

        self.state.finish();
        Ok(workspace)
    }

    fn check_branch(&self, branch: Option<&str>) -> gantry_core::Result<()> {
        if self.options.allow_branches.is_empty() {
            return Ok(());
        }

        let invalid = |e: globset::Error| ConfigError::InvalidValue {
            field: "git.allow_branches".to_string(),
            message: e.to_string(),
        };
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.options.allow_branches {
            builder.add(Glob::new(pattern).map_err(invalid)?);
        }
        let allowed = builder.build().map_err(invalid)?;

        // A detached HEAD never matches
        let branch = branch.unwrap_or("HEAD");
        if branch != "HEAD" && allowed.is_match(branch) {
            return Ok(());
        }
        Err(GitError::BranchNotAllowed {
            branch: branch.to_string(),
            allowed: self.options.allow_branches.join(", "),
        }
        .into())
    }

    fn plan(&mut self, graph: &PackageGraph) -> gantry_core::Result<Option<VersionPlan>> {
        self.enter(ReleaseStage::Plan, Vec::new())?;

        let affected =
            ChangeCollector::new(graph, self.caps.vcs, self.options.change_options()).collect_affected()?;
        if affected.is_empty() {
            return Ok(None);
        }

        let history = CommitHistory(self.caps.commits);
        let explicit;
        let recommender: &dyn BumpRecommender = match self.options.bump {
            Some(bump) => {
                explicit = ExplicitBump(bump);
                &explicit
            }
            None => &history,
        };

        let plan = VersionPlanner::new(self.options.mode, recommender)
            .with_build_metadata(self.options.build_metadata.clone())
            .with_exact_version(self.options.exact_version.clone())
            .with_preid(self.options.preid.clone())
            .plan(graph, &affected)?;

        for drift in &plan.drifts {
            warn!(drift = %drift, "dependency range left unchanged");
        }
        self.state.finish();

        if plan.is_empty() {
            return Ok(None);
        }
        info!(packages = plan.packages.len(), "planned versions");
        Ok(Some(plan))
    }

    async fn run_hook(&mut self, hook: LifecycleHook, batch: &HookBatch<'_>) -> gantry_core::Result<()> {
        let names = batch.packages.iter().map(|m| m.name.clone()).collect();
        self.enter(hook.stage(), names)?;

        let runner = LifecycleRunner::new(self.caps.package_manager.clone(), self.root.clone(), self.pool())
            .with_recursion_guard(self.options.recursion_guard.clone());
        runner
            .run(
                hook,
                batch.root_manifest,
                batch.packages,
                batch.predecessors,
                &mut self.state,
            )
            .await?;

        self.state.finish();
        Ok(())
    }

    /// Manifests, then package changelogs, then the root changelog
    async fn write_files(
        &mut self,
        graph: &PackageGraph,
        plan: &VersionPlan,
        manifests: &[PackageManifest],
    ) -> gantry_core::Result<()> {
        let names = manifests.iter().map(|m| m.name.clone()).collect();
        self.enter(ReleaseStage::Changelog, names)?;

        for manifest in manifests {
            let path = self.caps.manifests.write_manifest(&manifest.location, manifest)?;
            debug!(package = %manifest.name, path = %path.display(), "manifest written");
            self.state.record(SideEffect::ManifestWritten { path });
            if !self.options.changelog || plan.get(&manifest.name).is_none() {
                self.state.mark_done(manifest.name.clone());
            }
        }

        if self.options.changelog {
            let mut entries = Vec::with_capacity(plan.packages.len());
            for planned in &plan.packages {
                let node = graph
                    .get(&planned.name)
                    .ok_or_else(|| GraphError::UnknownPackage(planned.name.clone()))?;
                let update = self.caps.commits.update_changelog(node, &planned.next)?;
                self.state.record(SideEffect::ChangelogWritten {
                    path: update.path.clone(),
                });
                self.state.mark_done(planned.name.clone());
                entries.push((planned.name.clone(), update));
            }

            if let (true, Some(version)) = (self.options.root_changelog, &plan.fixed_version) {
                let update = self
                    .caps
                    .commits
                    .update_root_changelog(&version.to_string(), &entries)?;
                self.state.record(SideEffect::ChangelogWritten { path: update.path });
            }
        }

        if self.options.sync_lockfile {
            let options = InstallOptions {
                package_lock_only: true,
                ignore_scripts: true,
            };
            self.caps.package_manager.install(&self.root, &options).await?;
            if self.root.join(LOCKFILE).is_file() {
                self.state.record(SideEffect::LockfileUpdated {
                    path: PathBuf::from(LOCKFILE),
                });
            }
        }

        self.state.finish();
        Ok(())
    }

    fn commit(&mut self, plan: &VersionPlan) -> gantry_core::Result<String> {
        let touched = self.state.touched.clone();
        self.enter(ReleaseStage::Commit, touched.clone())?;

        let files = self.state.written_files();
        let message = commit_message(&self.options.commit_message, plan);
        let sha = self.caps.vcs.commit(&message, &files)?;
        info!(sha = %sha, files = files.len(), "created release commit");

        self.state.record(SideEffect::CommitCreated { sha: sha.clone() });
        for name in touched {
            self.state.mark_done(name);
        }
        self.state.finish();
        Ok(sha)
    }

    fn tag(&mut self, plan: &VersionPlan) -> gantry_core::Result<Vec<String>> {
        self.enter(ReleaseStage::Tag, plan.names())?;
        let mut tags = Vec::new();

        match plan.mode {
            VersioningMode::Independent => {
                for planned in &plan.packages {
                    let name = format_tag(&self.options.independent_tag_format, &planned.name, &planned.next);
                    self.create_tag(&name)?;
                    tags.push(name);
                    self.state.mark_done(planned.name.clone());
                }
            }
            VersioningMode::Fixed => {
                for name in plan.tag_names(&self.options.tag_format, &self.options.independent_tag_format) {
                    self.create_tag(&name)?;
                    tags.push(name);
                }
                for name in plan.names() {
                    self.state.mark_done(name);
                }
            }
        }

        self.state.finish();
        Ok(tags)
    }

    fn create_tag(&mut self, name: &str) -> gantry_core::Result<()> {
        self.caps.vcs.tag(name, name)?;
        info!(tag = %name, "created tag");
        self.state.record(SideEffect::TagCreated {
            name: name.to_string(),
        });
        Ok(())
    }

    async fn push(&mut self, tags: &[String]) -> gantry_core::Result<()> {
        self.enter(ReleaseStage::Push, Vec::new())?;
        if !self.options.push {
            info!("push disabled");
            self.state.finish();
            return Ok(());
        }

        let vcs = self.caps.vcs;
        let mut refs = Vec::with_capacity(tags.len() + 1);
        match vcs.current_branch()? {
            Some(branch) => refs.push(branch),
            None => warn!("HEAD is detached, pushing tags only"),
        }
        refs.extend(tags.iter().cloned());

        let remote = self.options.remote.as_str();
        let pushed = &refs;
        let result = with_retries(self.options.retries, self.options.retry_delay, "push", || async move {
            vcs.push(remote, pushed)
        })
        .await;

        match result {
            Ok(()) => info!(remote = %remote, refs = refs.len(), "pushed release"),
            Err(GantryError::Git(GitError::RefAlreadyExists(reference))) => {
                warn!(remote = %remote, reference = %reference, "remote already has the release refs")
            }
            Err(e) => return Err(e),
        }

        self.state.record(SideEffect::RefsPushed {
            remote: self.options.remote.clone(),
            refs,
        });
        self.state.finish();
        Ok(())
    }

    /// Publish non-private versioned packages in topological order
    async fn publish(
        &mut self,
        graph: &PackageGraph,
        plan: &VersionPlan,
        manifests: &[PackageManifest],
    ) -> gantry_core::Result<Vec<(String, PublishStatus)>> {
        let mut candidates = Vec::new();
        for node in graph.topological_order() {
            if plan.get(node.name()).is_none() {
                continue;
            }
            if node.is_private() {
                debug!(package = %node.name(), "skipping private package");
                continue;
            }
            candidates.push(node.name().to_string());
        }
        self.enter(ReleaseStage::Publish, candidates.clone())?;

        let predecessors = graph.ordering_constraints(&candidates);
        let to_publish: HashMap<String, PackageManifest> = manifests
            .iter()
            .filter(|m| candidates.contains(&m.name))
            .map(|m| (m.name.clone(), m.clone()))
            .collect();
        let request = PublishRequest {
            dist_tag: self.options.dist_tag.clone(),
            registry: self.options.registry.clone(),
        };
        let retries = self.options.retries;
        let delay = self.options.retry_delay;

        let report = self
            .pool()
            .run(&candidates, &predecessors, |name| {
                let registry = self.caps.registry.clone();
                let manifest = to_publish.get(&name).cloned();
                let request = request.clone();
                let directory = manifest.as_ref().map(|m| self.root.join(&m.location));
                async move {
                    let (Some(manifest), Some(directory)) = (manifest, directory) else {
                        return Err(GantryError::from(GraphError::UnknownPackage(name)));
                    };
                    publish_package(registry.as_ref(), &manifest, &directory, &request, retries, delay).await
                }
            })
            .await;

        let mut published = Vec::with_capacity(report.completed.len());
        for (name, status) in report.completed {
            let version = plan
                .new_version(&name)
                .map(|v| v.to_string())
                .unwrap_or_default();
            self.state.record(SideEffect::Published {
                package: name.clone(),
                version,
                status,
            });
            self.state.mark_done(name.clone());
            published.push((name, status));
        }

        if let Some((_, e)) = report.failures.into_iter().next() {
            return Err(e);
        }
        if report.cancelled {
            return Err(WorkflowError::Cancelled.into());
        }

        self.state.finish();
        Ok(published)
    }
}

/// Lifecycle inputs shared by the three hook stages
struct HookBatch<'a> {
    root_manifest: Option<&'a PackageManifest>,
    packages: &'a [PackageManifest],
    predecessors: &'a BTreeMap<String, Vec<String>>,
}

async fn publish_package(
    registry: &dyn Registry,
    manifest: &PackageManifest,
    directory: &Path,
    request: &PublishRequest,
    retries: u32,
    delay: Duration,
) -> gantry_core::Result<PublishStatus> {
    let result = with_retries(retries, delay, "publish", || async move {
        registry.publish(manifest, directory, request).await
    })
    .await;

    match result {
        Ok(()) => {
            info!(package = %manifest.name, version = %manifest.version, "published");
            Ok(PublishStatus::Published)
        }
        Err(GantryError::Registry(RegistryError::PublishConflict { .. })) => {
            warn!(package = %manifest.name, version = %manifest.version, "version already published");
            Ok(PublishStatus::AlreadyPublished)
        }
        Err(e) => Err(e),
    }
}

/// Retry `attempt` while it fails with a retryable error
async fn with_retries<T, F, Fut>(
    retries: u32,
    delay: Duration,
    operation: &str,
    mut attempt: F,
) -> gantry_core::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = gantry_core::Result<T>>,
{
    let mut retried = 0;
    loop {
        match attempt().await {
            Err(e) if e.is_retryable() && retried < retries => {
                retried += 1;
                warn!(operation, attempt = retried, retries, error = %e, "transient failure, retrying");
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}

/// Release commit message.
///
/// Fixed mode substitutes the shared version for `{version}`. Independent
/// mode drops the placeholder and lists ` - name@version` in the body.
pub fn commit_message(template: &str, plan: &VersionPlan) -> String {
    if let (VersioningMode::Fixed, Some(version)) = (plan.mode, &plan.fixed_version) {
        return template.replace("{version}", &version.to_string());
    }

    let subject = template.replace("{version}", "");
    let body: Vec<String> = plan
        .packages
        .iter()
        .map(|p| format!(" - {}@{}", p.name, p.next))
        .collect();
    format!("{}\n\n{}", subject.trim_end(), body.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReleaseError;
    use async_trait::async_trait;
    use gantry_core::error::{LifecycleError, ManifestError};
    use gantry_core::monorepo::{DependencyCollection, PlannedVersion};
    use gantry_core::{ChangelogUpdate, ErrorKind, ExitStatus};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    type Log = Arc<Mutex<Vec<String>>>;

    fn note(log: &Log, entry: String) {
        log.lock().unwrap().push(entry);
    }

    struct MemoryStore {
        manifests: Vec<PackageManifest>,
        root: Option<PackageManifest>,
        log: Log,
    }

    impl ManifestStore for MemoryStore {
        fn load_manifest(&self, location: &Path) -> gantry_core::Result<PackageManifest> {
            self.manifests
                .iter()
                .find(|m| m.location == location)
                .cloned()
                .ok_or_else(|| ManifestError::NotFound(location.to_path_buf()).into())
        }

        fn load_root_manifest(&self) -> gantry_core::Result<Option<PackageManifest>> {
            Ok(self.root.clone())
        }

        fn write_manifest(&self, location: &Path, manifest: &PackageManifest) -> gantry_core::Result<PathBuf> {
            note(&self.log, format!("write {}@{}", manifest.name, manifest.version));
            Ok(location.join("package.json"))
        }
    }

    #[derive(Default)]
    struct FakeVcs {
        log: Log,
        tag: Option<String>,
        dirty: bool,
        branch: Option<String>,
        fail_tag: bool,
        push_errors: Mutex<VecDeque<GantryError>>,
    }

    impl VersionControl for FakeVcs {
        fn has_commits(&self) -> gantry_core::Result<bool> {
            Ok(true)
        }
        fn last_release_tag(&self, _pattern: Option<&str>) -> gantry_core::Result<Option<String>> {
            Ok(self.tag.clone())
        }
        fn first_commit(&self) -> gantry_core::Result<String> {
            Ok("0000000".to_string())
        }
        fn head_sha(&self) -> gantry_core::Result<String> {
            Ok("abcdef1234567890".to_string())
        }
        fn commits_since(&self, _reference: &str) -> gantry_core::Result<usize> {
            Ok(0)
        }
        fn diff_files(&self, _since: &str, _location: &Path) -> gantry_core::Result<Vec<String>> {
            Ok(Vec::new())
        }
        fn is_clean(&self) -> gantry_core::Result<bool> {
            Ok(!self.dirty)
        }
        fn current_branch(&self) -> gantry_core::Result<Option<String>> {
            Ok(self.branch.clone())
        }
        fn commits_behind_upstream(&self, _remote: &str) -> gantry_core::Result<usize> {
            Ok(0)
        }
        fn commit(&self, message: &str, files: &[PathBuf]) -> gantry_core::Result<String> {
            note(&self.log, format!("commit {} ({} files)", message, files.len()));
            Ok("c0ffee1".to_string())
        }
        fn tag(&self, name: &str, _message: &str) -> gantry_core::Result<()> {
            if self.fail_tag {
                return Err(GitError::TagExists(name.to_string()).into());
            }
            note(&self.log, format!("tag {}", name));
            Ok(())
        }
        fn push(&self, remote: &str, refs: &[String]) -> gantry_core::Result<()> {
            if let Some(e) = self.push_errors.lock().unwrap().pop_front() {
                return Err(e);
            }
            note(&self.log, format!("push {} {}", remote, refs.join(" ")));
            Ok(())
        }
    }

    struct FakeCommits {
        log: Log,
    }

    impl BumpRecommender for FakeCommits {
        fn recommend_bump(&self, _node: &PackageNode) -> gantry_core::Result<BumpType> {
            Ok(BumpType::Patch)
        }
    }

    impl ConventionalCommits for FakeCommits {
        fn update_changelog(&self, node: &PackageNode, version: &Version) -> gantry_core::Result<ChangelogUpdate> {
            note(&self.log, format!("changelog {}@{}", node.name(), version));
            Ok(ChangelogUpdate {
                path: node.location().join("CHANGELOG.md"),
                new_entry: format!("## {}", version),
            })
        }

        fn update_root_changelog(
            &self,
            version: &str,
            entries: &[(String, ChangelogUpdate)],
        ) -> gantry_core::Result<ChangelogUpdate> {
            note(&self.log, format!("root changelog {} ({} entries)", version, entries.len()));
            Ok(ChangelogUpdate {
                path: PathBuf::from("CHANGELOG.md"),
                new_entry: format!("## {}", version),
            })
        }
    }

    struct FakePackageManager {
        root: PathBuf,
        log: Log,
        failing: Option<String>,
        cancel_after: Option<(String, CancelSignal)>,
    }

    #[async_trait]
    impl PackageManager for FakePackageManager {
        async fn install(&self, _directory: &Path, options: &InstallOptions) -> gantry_core::Result<()> {
            note(&self.log, format!("install lock-only={}", options.package_lock_only));
            Ok(())
        }

        async fn run_script(&self, directory: &Path, script: &str) -> gantry_core::Result<ExitStatus> {
            let label = if directory == self.root {
                "root".to_string()
            } else {
                directory
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default()
            };
            let call = format!("{}.{}", label, script);
            note(&self.log, format!("script {}", call));

            if let Some((trigger, cancel)) = &self.cancel_after {
                if *trigger == call {
                    cancel.cancel();
                }
            }
            if self.failing.as_deref() == Some(call.as_str()) {
                return Ok(ExitStatus { code: Some(1) });
            }
            Ok(ExitStatus::success())
        }
    }

    #[derive(Default)]
    struct FakeRegistry {
        log: Log,
        errors: Mutex<HashMap<String, VecDeque<GantryError>>>,
        attempts: AtomicUsize,
    }

    impl FakeRegistry {
        fn fail(&self, package: &str, error: GantryError) {
            self.errors
                .lock()
                .unwrap()
                .entry(package.to_string())
                .or_default()
                .push_back(error);
        }
    }

    #[async_trait]
    impl Registry for FakeRegistry {
        async fn dist_tags(
            &self,
            _package: &str,
            _registry: Option<&str>,
        ) -> gantry_core::Result<BTreeMap<String, String>> {
            Ok(BTreeMap::new())
        }

        async fn publish(
            &self,
            manifest: &PackageManifest,
            _directory: &Path,
            request: &PublishRequest,
        ) -> gantry_core::Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let error = self
                .errors
                .lock()
                .unwrap()
                .get_mut(&manifest.name)
                .and_then(|errors| errors.pop_front());
            if let Some(e) = error {
                return Err(e);
            }
            note(
                &self.log,
                format!("publish {}@{} --tag {}", manifest.name, manifest.version, request.dist_tag),
            );
            Ok(())
        }
    }

    struct Harness {
        temp: TempDir,
        log: Log,
        store: MemoryStore,
        vcs: FakeVcs,
        commits: FakeCommits,
        registry: Arc<FakeRegistry>,
        failing_script: Option<String>,
        cancel: CancelSignal,
        cancel_after: Option<String>,
        options: ReleaseOptions,
    }

    impl Harness {
        fn new(manifests: Vec<PackageManifest>, root: Option<PackageManifest>) -> Self {
            let temp = TempDir::new().unwrap();
            for manifest in &manifests {
                let dir = temp.path().join(&manifest.location);
                std::fs::create_dir_all(&dir).unwrap();
                std::fs::write(dir.join("package.json"), "{}").unwrap();
            }

            let log = Log::default();
            let mut options = ReleaseOptions::from_config(&Config::default(), ReleaseFlow::Publish)
                .with_bump(Some(BumpType::Minor));
            options.concurrency = 2;
            options.retry_delay = Duration::ZERO;

            Self {
                store: MemoryStore {
                    manifests,
                    root,
                    log: log.clone(),
                },
                vcs: FakeVcs {
                    log: log.clone(),
                    branch: Some("main".to_string()),
                    ..Default::default()
                },
                commits: FakeCommits { log: log.clone() },
                registry: Arc::new(FakeRegistry {
                    log: log.clone(),
                    ..Default::default()
                }),
                failing_script: None,
                cancel: CancelSignal::new(),
                cancel_after: None,
                options,
                log,
                temp,
            }
        }

        async fn run(&self, confirm: bool) -> Result<ReleaseOutcome> {
            let package_manager = Arc::new(FakePackageManager {
                root: self.temp.path().to_path_buf(),
                log: self.log.clone(),
                failing: self.failing_script.clone(),
                cancel_after: self
                    .cancel_after
                    .clone()
                    .map(|trigger| (trigger, self.cancel.clone())),
            });
            let caps = Capabilities {
                manifests: &self.store,
                vcs: &self.vcs,
                commits: &self.commits,
                package_manager,
                registry: self.registry.clone(),
            };
            let confirmation = AutoConfirm(confirm);
            ReleaseOrchestrator::new(self.temp.path(), caps, self.options.clone(), &confirmation)
                .with_cancel_signal(self.cancel.clone())
                .run()
                .await
        }

        fn events(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    fn with_hooks(manifest: PackageManifest) -> PackageManifest {
        manifest
            .with_script("preversion", "true")
            .with_script("version", "true")
            .with_script("postversion", "true")
    }

    fn pkg(name: &str) -> PackageManifest {
        PackageManifest::new(name, Version::new(1, 0, 0), format!("packages/{}", name))
    }

    fn single_package() -> Harness {
        Harness::new(
            vec![with_hooks(pkg("pkg-1"))],
            Some(with_hooks(PackageManifest::new(
                "root",
                Version::new(0, 0, 0),
                "",
            ))),
        )
    }

    fn partial(result: Result<ReleaseOutcome>) -> PartialRelease {
        match result {
            Err(ReleaseError::Partial(report)) => *report,
            other => panic!("expected a partial release, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_release_sequence() {
        let h = single_package();

        let outcome = h.run(true).await.unwrap();

        assert_eq!(
            h.events(),
            vec![
                "script root.preversion",
                "script pkg-1.preversion",
                "write pkg-1@1.1.0",
                "changelog pkg-1@1.1.0",
                "root changelog 1.1.0 (1 entries)",
                "script pkg-1.version",
                "script root.version",
                "commit chore(release): publish 1.1.0 (3 files)",
                "tag v1.1.0",
                "script pkg-1.postversion",
                "script root.postversion",
                "push origin main v1.1.0",
                "publish pkg-1@1.1.0 --tag latest",
            ]
        );

        let ReleaseOutcome::Released(summary) = outcome else {
            panic!("expected a release");
        };
        assert_eq!(summary.commit, "c0ffee1");
        assert_eq!(summary.tags, vec!["v1.1.0"]);
        assert_eq!(
            summary.published,
            vec![("pkg-1".to_string(), PublishStatus::Published)]
        );
    }

    #[tokio::test]
    async fn test_version_flow_does_not_publish() {
        let mut h = single_package();
        h.options.flow = ReleaseFlow::Version;
        h.options.push = false;

        let outcome = h.run(true).await.unwrap();

        let events = h.events();
        assert!(events.iter().all(|e| !e.starts_with("publish")));
        assert!(events.iter().all(|e| !e.starts_with("push")));
        assert!(matches!(outcome, ReleaseOutcome::Released(s) if s.published.is_empty()));
    }

    #[tokio::test]
    async fn test_recursion_guard_skips_root_hooks() {
        let mut h = single_package();
        h.options.recursion_guard = Some("version".to_string());

        h.run(true).await.unwrap();

        let scripts: Vec<String> = h
            .events()
            .into_iter()
            .filter(|e| e.starts_with("script"))
            .collect();
        assert_eq!(
            scripts,
            vec![
                "script pkg-1.preversion",
                "script pkg-1.version",
                "script pkg-1.postversion"
            ]
        );
    }

    #[tokio::test]
    async fn test_nothing_to_release() {
        let mut h = single_package();
        h.vcs.tag = Some("v1.0.0".to_string());

        let outcome = h.run(true).await.unwrap();

        assert!(matches!(outcome, ReleaseOutcome::NothingToRelease));
        assert!(h.events().is_empty());
    }

    #[tokio::test]
    async fn test_declined_and_dry_run_touch_nothing() {
        let h = single_package();
        assert!(matches!(h.run(false).await.unwrap(), ReleaseOutcome::Declined));
        assert!(h.events().is_empty());

        let mut h = single_package();
        h.options.dry_run = true;
        let ReleaseOutcome::DryRun(plan) = h.run(true).await.unwrap() else {
            panic!("expected a dry run");
        };
        assert_eq!(plan.new_version("pkg-1"), Some(&Version::new(1, 1, 0)));
        assert!(h.events().is_empty());
    }

    #[tokio::test]
    async fn test_preconditions() {
        let mut h = single_package();
        h.vcs.dirty = true;
        let err = h.run(true).await.unwrap_err();
        assert_eq!(err.code(), "EUNCOMMITTED");
        assert_eq!(err.kind(), ErrorKind::Precondition);

        let mut h = single_package();
        h.options.allow_branches = vec!["release/*".to_string()];
        let err = h.run(true).await.unwrap_err();
        assert_eq!(err.code(), "ENOTALLOWED");

        let mut h = single_package();
        h.options.allow_branches = vec!["ma*".to_string()];
        h.vcs.branch = None;
        assert_eq!(h.run(true).await.unwrap_err().code(), "ENOTALLOWED");

        let mut h = single_package();
        h.options.allow_branches = vec!["ma*".to_string()];
        assert!(h.run(true).await.is_ok());
    }

    #[tokio::test]
    async fn test_reject_cycles() {
        let a = pkg("a").with_dependency(DependencyCollection::Dependencies, "b", "^1.0.0");
        let b = pkg("b").with_dependency(DependencyCollection::Dependencies, "a", "^1.0.0");
        let mut h = Harness::new(vec![a, b], None);
        h.options.reject_cycles = true;

        let err = h.run(true).await.unwrap_err();
        assert_eq!(err.code(), "ECYCLE");
        assert!(h.events().is_empty());
    }

    #[tokio::test]
    async fn test_preversion_failure_is_not_partial() {
        let mut h = single_package();
        h.failing_script = Some("pkg-1.preversion".to_string());

        let err = h.run(true).await.unwrap_err();

        assert!(matches!(
            err.root_cause(),
            GantryError::Lifecycle(LifecycleError::HookFailed { .. })
        ));
        assert!(err.partial().is_none());
        assert!(h.events().iter().all(|e| !e.starts_with("write")));
    }

    #[tokio::test]
    async fn test_tag_failure_reports_partial_release() {
        let mut h = single_package();
        h.vcs.fail_tag = true;

        let err = h.run(true).await.unwrap_err();
        assert_eq!(err.code(), "EPARTIAL");

        let report = partial(Err(err));
        assert_eq!(report.failed_stage, ReleaseStage::Tag);
        assert_eq!(report.source.code(), "ETAGEXISTS");
        assert_eq!(report.unprocessed, vec!["pkg-1"]);

        let commit = report
            .completed
            .iter()
            .find(|c| c.stage == ReleaseStage::Commit)
            .unwrap();
        assert_eq!(commit.packages, vec!["pkg-1"]);
        assert!(report
            .side_effects
            .contains(&SideEffect::CommitCreated { sha: "c0ffee1".into() }));
        assert!(report.to_string().contains("release stopped in stage 'tag'"));
    }

    #[tokio::test]
    async fn test_publish_conflict_counts_as_success() {
        let h = single_package();
        h.registry.fail(
            "pkg-1",
            RegistryError::PublishConflict {
                package: "pkg-1".into(),
                version: "1.1.0".into(),
            }
            .into(),
        );

        let ReleaseOutcome::Released(summary) = h.run(true).await.unwrap() else {
            panic!("expected a release");
        };
        assert_eq!(
            summary.published,
            vec![("pkg-1".to_string(), PublishStatus::AlreadyPublished)]
        );
    }

    fn network_error() -> GantryError {
        RegistryError::Network {
            package: "pkg-1".into(),
            message: "ECONNRESET".into(),
        }
        .into()
    }

    #[tokio::test]
    async fn test_network_errors_are_retried() {
        let h = single_package();
        h.registry.fail("pkg-1", network_error());
        h.registry.fail("pkg-1", network_error());

        let outcome = h.run(true).await.unwrap();

        assert!(matches!(outcome, ReleaseOutcome::Released(_)));
        assert_eq!(h.registry.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let mut h = single_package();
        h.options.retries = 1;
        h.registry.fail("pkg-1", network_error());
        h.registry.fail("pkg-1", network_error());

        let report = partial(h.run(true).await);

        assert_eq!(report.failed_stage, ReleaseStage::Publish);
        assert_eq!(report.source.code(), "ENETWORK");
        assert_eq!(report.unprocessed, vec!["pkg-1"]);
        assert_eq!(h.registry.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_push_retry_and_existing_ref() {
        let h = single_package();
        h.vcs
            .push_errors
            .lock()
            .unwrap()
            .push_back(GitError::RemoteUnreachable("origin".into()).into());
        h.run(true).await.unwrap();
        assert!(h.events().contains(&"push origin main v1.1.0".to_string()));

        let h = single_package();
        h.vcs
            .push_errors
            .lock()
            .unwrap()
            .push_back(GitError::RefAlreadyExists("v1.1.0".into()).into());
        assert!(matches!(h.run(true).await.unwrap(), ReleaseOutcome::Released(_)));
    }

    #[tokio::test]
    async fn test_cancel_after_commit_reports_partial_release() {
        let mut h = single_package();
        h.cancel_after = Some("root.postversion".to_string());

        let report = partial(h.run(true).await);

        assert_eq!(report.failed_stage, ReleaseStage::Push);
        assert_eq!(report.source.code(), "ECANCELLED");
        assert!(report
            .completed
            .iter()
            .any(|c| c.stage == ReleaseStage::PostVersion));
        assert!(h.events().iter().all(|e| !e.starts_with("push")));
    }

    #[tokio::test]
    async fn test_publish_order_skips_private_packages() {
        let app = pkg("app").with_dependency(DependencyCollection::Dependencies, "lib", "workspace:^");
        let lib = pkg("lib");
        let internal = pkg("internal").with_private(true);
        let mut h = Harness::new(vec![app, internal, lib], None);
        h.options.concurrency = 4;

        let ReleaseOutcome::Released(summary) = h.run(true).await.unwrap() else {
            panic!("expected a release");
        };

        let names: Vec<&str> = summary.published.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["lib", "app"]);
        assert!(h.events().contains(&"write internal@1.1.0".to_string()));
    }

    #[tokio::test]
    async fn test_dependent_of_cycle_is_published_last() {
        let a = pkg("a").with_dependency(DependencyCollection::Dependencies, "b", "^1.0.0");
        let b = pkg("b").with_dependency(DependencyCollection::Dependencies, "c", "^1.0.0");
        let c = pkg("c").with_dependency(DependencyCollection::Dependencies, "b", "^1.0.0");
        let mut h = Harness::new(vec![a, b, c], None);
        h.options.concurrency = 4;

        let ReleaseOutcome::Released(summary) = h.run(true).await.unwrap() else {
            panic!("expected a release");
        };

        let names: Vec<&str> = summary.published.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "a"]);

        let publishes: Vec<String> = h
            .events()
            .into_iter()
            .filter(|e| e.starts_with("publish "))
            .collect();
        assert_eq!(publishes.last().map(String::as_str), Some("publish a@1.1.0 --tag latest"));
    }

    #[tokio::test]
    async fn test_sync_lockfile_is_committed() {
        let mut h = single_package();
        h.options.sync_lockfile = true;
        h.options.changelog = false;
        std::fs::write(h.temp.path().join(LOCKFILE), "{}").unwrap();

        h.run(true).await.unwrap();

        let events = h.events();
        assert!(events.contains(&"install lock-only=true".to_string()));
        assert!(events.contains(&"commit chore(release): publish 1.1.0 (2 files)".to_string()));
    }

    #[test]
    fn test_commit_messages() {
        let planned = |name: &str, next: Version| PlannedVersion {
            name: name.to_string(),
            current: Version::new(1, 0, 0),
            next,
            bump: BumpType::Minor,
        };

        let fixed = VersionPlan {
            mode: VersioningMode::Fixed,
            fixed_version: Some(Version::new(2, 0, 0)),
            packages: vec![planned("a", Version::new(2, 0, 0))],
            rewrites: Vec::new(),
            drifts: Vec::new(),
        };
        assert_eq!(
            commit_message("chore(release): publish {version}", &fixed),
            "chore(release): publish 2.0.0"
        );

        let independent = VersionPlan {
            mode: VersioningMode::Independent,
            fixed_version: None,
            packages: vec![
                planned("a", Version::new(1, 1, 0)),
                planned("b", Version::new(2, 0, 0)),
            ],
            rewrites: Vec::new(),
            drifts: Vec::new(),
        };
        assert_eq!(
            commit_message("chore(release): publish {version}", &independent),
            "chore(release): publish\n\n - a@1.1.0\n - b@2.0.0"
        );
    }
}

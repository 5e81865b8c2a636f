//! Version and publish commands

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, ValueEnum};
use console::style;
use dialoguer::Confirm;
use gantry_changelog::GitConventionalCommits;
use gantry_core::monorepo::{ForceInclude, VersionPlan, VersioningMode};
use gantry_core::{BumpType, GantryError};
use gantry_npm::{NpmClient, NpmRegistry};
use gantry_release::{
    CancelSignal, Capabilities, Confirmation, ReleaseFlow, ReleaseOptions, ReleaseOrchestrator,
    ReleaseOutcome, ReleaseProgress, ReleaseStage,
};
use indicatif::{ProgressBar, ProgressStyle};
use semver::Version;
use tracing::{info, warn};

use crate::cli::context::WorkspaceContext;
use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// npm sets this to the running lifecycle event
const LIFECYCLE_EVENT_ENV: &str = "npm_lifecycle_event";

/// Bump override
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BumpArg {
    /// Breaking changes
    Major,
    /// New features
    Minor,
    /// Fixes
    Patch,
    /// Next prerelease
    Prerelease,
}

impl From<BumpArg> for BumpType {
    fn from(bump: BumpArg) -> Self {
        match bump {
            BumpArg::Major => BumpType::Major,
            BumpArg::Minor => BumpType::Minor,
            BumpArg::Patch => BumpType::Patch,
            BumpArg::Prerelease => BumpType::Prerelease,
        }
    }
}

/// Flags shared by `version` and `publish`
#[derive(Debug, Clone, Args)]
pub struct ReleaseArgs {
    /// Version packages independently
    #[arg(long)]
    pub independent: bool,

    /// Treat packages as changed: `*` or a comma-separated list, all when bare
    #[arg(long, value_name = "PACKAGES", num_args = 0..=1, default_missing_value = "*")]
    pub force_publish: Option<String>,

    /// Ignore changes to files matching these globs
    #[arg(long, value_name = "GLOB", num_args = 1..)]
    pub ignore_changes: Vec<String>,

    /// Attach build metadata to every new version
    #[arg(long)]
    pub build_metadata: Option<String>,

    /// Use this exact version for every released package
    #[arg(long, value_name = "VERSION")]
    pub version_override: Option<Version>,

    /// Bump every released package by this instead of reading commits
    #[arg(long, value_enum)]
    pub bump: Option<BumpArg>,

    /// Prerelease identifier
    #[arg(long)]
    pub preid: Option<String>,

    /// Treat every package as changed since a commit, HEAD when no sha is given.
    ///
    /// Only change detection differs: the new versions are still committed,
    /// tagged and pushed like any other release.
    #[arg(long, value_name = "SHA", num_args = 0..=1)]
    pub canary: Option<Option<String>>,

    /// Maximum concurrent lifecycle scripts and publishes
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Plan without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Do not push the release commit and tags
    #[arg(long)]
    pub no_push: bool,

    /// Fail when the package graph has cycles
    #[arg(long)]
    pub reject_cycles: bool,

    /// Dist-tag to publish under
    #[arg(long)]
    pub dist_tag: Option<String>,

    /// Registry to publish to
    #[arg(long)]
    pub registry: Option<String>,
}

impl ReleaseArgs {
    /// Release options from configuration with these flags applied on top
    pub fn options(&self, ctx: &WorkspaceContext, flow: ReleaseFlow) -> ReleaseOptions {
        let mut options = ReleaseOptions::from_config(&ctx.config, flow)
            .with_dry_run(self.dry_run)
            .with_bump(self.bump.map(BumpType::from))
            .with_recursion_guard(std::env::var(LIFECYCLE_EVENT_ENV).ok());

        if self.independent {
            options.mode = VersioningMode::Independent;
        }
        if let Some(force) = &self.force_publish {
            options = options.with_force(force.parse::<ForceInclude>().unwrap_or_default());
        }
        options.ignore_changes.extend(self.ignore_changes.iter().cloned());
        if let Some(metadata) = &self.build_metadata {
            options.build_metadata = Some(metadata.clone());
        }
        options.exact_version = self.version_override.clone();
        if let Some(preid) = &self.preid {
            options.preid = preid.clone();
        }
        if let Some(commit) = &self.canary {
            options = options.with_canary(commit.clone());
        }
        if let Some(concurrency) = self.concurrency {
            options.concurrency = concurrency;
        }
        if self.no_push {
            options.push = false;
        }
        if self.reject_cycles {
            options.reject_cycles = true;
        }
        if let Some(tag) = &self.dist_tag {
            options.dist_tag = tag.clone();
        }
        if let Some(registry) = &self.registry {
            options.registry = Some(registry.clone());
        }
        options
    }
}

/// Bump versions, write changelogs, commit, tag and push
#[derive(Debug, Args)]
pub struct VersionCommand {
    #[command(flatten)]
    pub release: ReleaseArgs,
}

impl VersionCommand {
    /// Execute the version command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(dry_run = self.release.dry_run, "executing version command");
        run_release(&self.release, cli, ReleaseFlow::Version)
    }
}

/// Version, then publish the released packages
#[derive(Debug, Args)]
pub struct PublishCommand {
    #[command(flatten)]
    pub release: ReleaseArgs,
}

impl PublishCommand {
    /// Execute the publish command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(dry_run = self.release.dry_run, "executing publish command");
        run_release(&self.release, cli, ReleaseFlow::Publish)
    }
}

fn run_release(args: &ReleaseArgs, cli: &Cli, flow: ReleaseFlow) -> anyhow::Result<()> {
    let ctx = WorkspaceContext::load(cli)?;
    let options = args.options(&ctx, flow);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(release(&ctx, options, args.yes, cli))
}

async fn release(
    ctx: &WorkspaceContext,
    options: ReleaseOptions,
    yes: bool,
    cli: &Cli,
) -> anyhow::Result<()> {
    let manifests = ctx.manifests();
    let vcs = ctx.repo()?;
    let commits = GitConventionalCommits::new(ctx.repo()?, ctx.config.changelog.clone(), &ctx.config.versioning);
    let npm = NpmClient::locate()?;
    let registry = NpmRegistry::new(options.registry.as_deref(), npm.clone())?;

    let caps = Capabilities {
        manifests: &manifests,
        vcs: &vcs,
        commits: &commits,
        package_manager: Arc::new(npm),
        registry: Arc::new(registry),
    };

    let review = PlanReview {
        show: cli.is_chatty(),
        prompt: !yes && !options.dry_run,
    };
    let spinner = StageSpinner::new(cli.is_chatty());

    let cancel = CancelSignal::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing in-flight work");
            on_interrupt.cancel();
        }
    });

    let outcome = ReleaseOrchestrator::new(&ctx.root, caps, options, &review)
        .with_cancel_signal(cancel)
        .with_progress(&spinner)
        .run()
        .await;
    spinner.finish();
    let outcome = outcome?;

    match cli.format {
        OutputFormat::Json => print_json(&outcome)?,
        OutputFormat::Text if cli.quiet => {}
        OutputFormat::Text => match &outcome {
            ReleaseOutcome::NothingToRelease => {
                output::info("No changed packages to release");
            }
            ReleaseOutcome::Declined => println!("{}", style("Aborted.").yellow()),
            ReleaseOutcome::DryRun(plan) => {
                output::success(&format!(
                    "Dry run complete, {} package(s) would be released",
                    plan.packages.len()
                ));
            }
            ReleaseOutcome::Released(summary) => output::print_summary(summary),
        },
    }
    Ok(())
}

fn print_json(outcome: &ReleaseOutcome) -> anyhow::Result<()> {
    let value = match outcome {
        ReleaseOutcome::NothingToRelease => serde_json::json!({ "outcome": "nothing_to_release" }),
        ReleaseOutcome::Declined => serde_json::json!({ "outcome": "declined" }),
        ReleaseOutcome::DryRun(plan) => serde_json::json!({
            "outcome": "dry_run",
            "plan": plan,
        }),
        ReleaseOutcome::Released(summary) => serde_json::json!({
            "outcome": "released",
            "plan": summary.plan,
            "commit": summary.commit,
            "tags": summary.tags,
            "published": summary.published.iter().map(|(name, status)| serde_json::json!({
                "name": name,
                "status": status,
            })).collect::<Vec<_>>(),
            "side_effects": summary.side_effects,
        }),
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Shows the plan and asks before anything is changed
struct PlanReview {
    show: bool,
    prompt: bool,
}

impl Confirmation for PlanReview {
    fn confirm(&self, plan: &VersionPlan) -> gantry_core::Result<bool> {
        if self.show {
            output::print_plan(plan);
        }
        if !self.prompt {
            return Ok(true);
        }

        Confirm::new()
            .with_prompt("Are you sure you want to create these versions?")
            .default(true)
            .interact()
            .map_err(|e| GantryError::other(format!("confirmation prompt failed: {}", e)))
    }
}

/// Spinner naming the running stage once the plan is confirmed
struct StageSpinner {
    bar: Option<ProgressBar>,
}

impl StageSpinner {
    fn new(enabled: bool) -> Self {
        let bar = enabled.then(|| {
            let bar = ProgressBar::hidden();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
                bar.set_style(style);
            }
            bar
        });
        Self { bar }
    }

    fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

impl ReleaseProgress for StageSpinner {
    fn stage_started(&self, stage: ReleaseStage) {
        let Some(bar) = &self.bar else {
            return;
        };
        if stage <= ReleaseStage::Confirm {
            return;
        }
        if bar.is_hidden() {
            bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            bar.enable_steady_tick(Duration::from_millis(100));
        }
        bar.set_message(stage.to_string());
    }
}

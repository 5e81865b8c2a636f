//! Changed command

use clap::Args;
use console::style;
use gantry_core::monorepo::{AffectCause, AffectedPackages, ChangeCollector, ForceInclude, VersioningMode};
use gantry_release::{ReleaseFlow, ReleaseOptions};
use tracing::info;

use crate::cli::context::WorkspaceContext;
use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// List packages changed since the last release
#[derive(Debug, Args)]
pub struct ChangedCommand {
    /// Look up independent release tags
    #[arg(long)]
    pub independent: bool,

    /// Treat packages as changed: `*` or a comma-separated list, all when bare
    #[arg(long, value_name = "PACKAGES", num_args = 0..=1, default_missing_value = "*")]
    pub force_publish: Option<String>,

    /// Ignore changes to files matching these globs
    #[arg(long, value_name = "GLOB", num_args = 1..)]
    pub ignore_changes: Vec<String>,

    /// Do not include dependents of changed packages
    #[arg(long)]
    pub only_explicit_updates: bool,
}

impl ChangedCommand {
    /// Execute the changed command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(independent = self.independent, "executing changed command");
        let ctx = WorkspaceContext::load(cli)?;
        let workspace = ctx.discover()?;
        let repo = ctx.repo()?;

        let options = self.options(&ctx);
        let affected =
            ChangeCollector::new(&workspace.graph, &repo, options.change_options()).collect_affected()?;

        match cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&affected)?);
            }
            OutputFormat::Text => print_affected(&affected, cli.quiet),
        }
        Ok(())
    }

    fn options(&self, ctx: &WorkspaceContext) -> ReleaseOptions {
        let mut options = ReleaseOptions::from_config(&ctx.config, ReleaseFlow::Version);
        if self.independent {
            options.mode = VersioningMode::Independent;
        }
        if let Some(force) = &self.force_publish {
            options = options.with_force(force.parse::<ForceInclude>().unwrap_or_default());
        }
        options.ignore_changes.extend(self.ignore_changes.iter().cloned());
        options.only_explicit_updates |= self.only_explicit_updates;
        options
    }
}

fn print_affected(affected: &AffectedPackages, quiet: bool) {
    if affected.is_empty() {
        if !quiet {
            output::info("No changed packages found");
        }
        return;
    }

    for package in &affected.affected {
        let cause = match &package.cause {
            AffectCause::Changed(reason) => reason.to_string(),
            AffectCause::DependencyChanged { via } => format!("depends on {}", via),
        };
        if quiet {
            println!("{}", package.name);
        } else {
            println!("{} {}", package.name, style(format!("({})", cause)).dim());
        }
    }

    if !quiet {
        output::success(&format!("found {} package(s) ready to publish", affected.len()));
    }
}

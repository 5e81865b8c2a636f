//! Workspace context shared by commands

use std::path::PathBuf;

use console::style;
use gantry_core::config::{load_config_or_default, workspace_root_for, Config};
use gantry_core::monorepo::{PackageDiscovery, Workspace};
use gantry_git::GitRepo;
use gantry_npm::NpmManifestStore;
use tracing::{debug, warn};

use crate::cli::Cli;

/// Configuration and locations of the workspace a command runs in
pub struct WorkspaceContext {
    /// Loaded configuration
    pub config: Config,
    /// Configuration file, if one was found
    pub config_path: Option<PathBuf>,
    /// Workspace root, the repository work tree
    pub root: PathBuf,
}

impl WorkspaceContext {
    /// Load configuration and locate the repository from the current directory
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let cwd = std::env::current_dir()?;
        let (config, config_path) = load_config_or_default(&cwd)?;

        if config_path.is_none() && cli.is_chatty() {
            println!(
                "{} No configuration found, using defaults (gantry.toml or gantry.yaml).",
                style("!").yellow().bold()
            );
        }

        let root = GitRepo::discover(&cwd)?.path().to_path_buf();
        if let Some(config_root) = config_path.as_deref().and_then(workspace_root_for) {
            if config_root != root {
                warn!(
                    config_root = %config_root.display(),
                    root = %root.display(),
                    "configuration is not at the repository root, using the repository root"
                );
            }
        }
        debug!(root = %root.display(), "workspace root");

        Ok(Self {
            config,
            config_path,
            root,
        })
    }

    /// Open the workspace repository
    pub fn repo(&self) -> anyhow::Result<GitRepo> {
        Ok(GitRepo::open(&self.root)?)
    }

    /// Manifest store for the workspace
    pub fn manifests(&self) -> NpmManifestStore {
        NpmManifestStore::new(&self.root)
    }

    /// Discover the workspace packages
    pub fn discover(&self) -> anyhow::Result<Workspace> {
        let mut discovery = PackageDiscovery::new(&self.root, self.config.packages.patterns().to_vec());
        Ok(discovery.discover_workspace(&self.manifests())?)
    }
}

//! npm CLI client

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use gantry_core::error::{LifecycleError, RegistryError, Result};
use gantry_core::monorepo::manifest::PackageManifest;
use gantry_core::{ExitStatus, InstallOptions, PackageManager, PublishRequest};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// stderr fragments npm prints when the version is already on the registry
const CONFLICT_MARKERS: [&str; 3] = [
    "EPUBLISHCONFLICT",
    "cannot publish over",
    "You cannot publish over the previously published versions",
];

/// stderr fragments of transient network failures
const NETWORK_MARKERS: [&str; 6] = [
    "ENETWORK",
    "ETIMEDOUT",
    "ECONNRESET",
    "ECONNREFUSED",
    "EAI_AGAIN",
    "socket hang up",
];

/// Runs the `npm` executable
#[derive(Debug, Clone)]
pub struct NpmClient {
    program: PathBuf,
}

impl NpmClient {
    /// Locate `npm` on `PATH`
    pub fn locate() -> Result<Self> {
        let program = which::which("npm").map_err(|_| LifecycleError::ToolMissing("npm".to_string()))?;
        debug!(program = %program.display(), "located npm");
        Ok(Self { program })
    }

    /// Use a specific executable
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn output(&self, directory: &Path, args: &[String]) -> Result<std::process::Output> {
        let command = format!("npm {}", args.join(" "));
        debug!(command = %command, directory = %directory.display(), "running npm");
        let start = Instant::now();

        let output = Command::new(&self.program)
            .args(args)
            .current_dir(directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| LifecycleError::CommandFailed {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        debug!(
            command = %command,
            code = ?output.status.code(),
            duration_ms = start.elapsed().as_millis() as u64,
            "npm finished"
        );
        Ok(output)
    }

    /// `npm publish` the package in `directory`
    #[instrument(skip(self, manifest, request), fields(package = %manifest.name, version = %manifest.version, tag = %request.dist_tag))]
    pub async fn publish(
        &self,
        manifest: &PackageManifest,
        directory: &Path,
        request: &PublishRequest,
    ) -> Result<()> {
        let output = self.output(directory, &publish_args(manifest, request)).await?;
        if output.status.success() {
            info!("published");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(classify_publish_failure(manifest, &stderr).into())
    }
}

#[async_trait]
impl PackageManager for NpmClient {
    #[instrument(skip(self, options), fields(directory = %directory.display()))]
    async fn install(&self, directory: &Path, options: &InstallOptions) -> Result<()> {
        let args = install_args(options);
        let output = self.output(directory, &args).await?;
        if output.status.success() {
            return Ok(());
        }

        Err(LifecycleError::CommandFailed {
            command: format!("npm {}", args.join(" ")),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into())
    }

    #[instrument(skip(self), fields(directory = %directory.display()))]
    async fn run_script(&self, directory: &Path, script: &str) -> Result<ExitStatus> {
        let output = self
            .output(directory, &["run".to_string(), script.to_string()])
            .await?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!(script, "{}", line);
        }
        if !output.status.success() {
            for line in String::from_utf8_lossy(&output.stderr).lines() {
                warn!(script, "{}", line);
            }
        }

        Ok(ExitStatus {
            code: output.status.code(),
        })
    }
}

fn install_args(options: &InstallOptions) -> Vec<String> {
    let mut args = vec!["install".to_string()];
    if options.package_lock_only {
        args.push("--package-lock-only".to_string());
    }
    if options.ignore_scripts {
        args.push("--ignore-scripts".to_string());
    }
    args
}

fn publish_args(manifest: &PackageManifest, request: &PublishRequest) -> Vec<String> {
    let mut args = vec![
        "publish".to_string(),
        "--tag".to_string(),
        request.dist_tag.clone(),
    ];
    if let Some(registry) = &request.registry {
        args.push("--registry".to_string());
        args.push(registry.clone());
    }
    // Scoped packages default to restricted access
    if manifest.name.starts_with('@') {
        args.push("--access".to_string());
        args.push("public".to_string());
    }
    args
}

/// Map `npm publish` stderr to a registry error
pub fn classify_publish_failure(manifest: &PackageManifest, stderr: &str) -> RegistryError {
    let package = manifest.name.clone();
    if CONFLICT_MARKERS.iter().any(|m| stderr.contains(m)) {
        return RegistryError::PublishConflict {
            package,
            version: manifest.version.to_string(),
        };
    }

    let message = stderr
        .lines()
        .find(|l| l.contains("ERR!"))
        .unwrap_or_else(|| stderr.trim())
        .to_string();
    if NETWORK_MARKERS.iter().any(|m| stderr.contains(m)) {
        RegistryError::Network { package, message }
    } else {
        RegistryError::PublishFailed { package, message }
    }
}

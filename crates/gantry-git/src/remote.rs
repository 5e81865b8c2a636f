//! Remote operations

use std::path::Path;

use tracing::{info, instrument, warn};

use gantry_core::error::GitError;

use crate::repository::{GitRepo, Result};

impl GitRepo {
    /// Get list of remote names
    pub fn remotes(&self) -> Result<Vec<String>> {
        let remotes = self.repo.remotes()?;
        Ok(remotes
            .iter()
            .filter_map(|r| r.map(|s| s.to_string()))
            .collect())
    }

    /// Check if a remote exists
    pub fn has_remote(&self, name: &str) -> Result<bool> {
        Ok(self.remotes()?.iter().any(|r| r == name))
    }

    /// Get the URL for a remote
    pub fn remote_url(&self, name: &str) -> Result<Option<String>> {
        match self.repo.find_remote(name) {
            Ok(remote) => Ok(remote.url().map(|s| s.to_string())),
            Err(e) if e.code() == git2::ErrorCode::NotFound => {
                Err(GitError::RemoteNotFound(name.to_string()))
            }
            Err(e) => Err(GitError::Git2(e)),
        }
    }

    /// Push refs to a remote through the git CLI
    pub fn push(&self, remote: &str, refs: &[String]) -> Result<()> {
        if !self.has_remote(remote)? {
            return Err(GitError::RemoteNotFound(remote.to_string()));
        }
        git_push(self.path(), remote, refs)
    }
}

/// Map `git push` stderr to a failure class
pub fn classify_push_failure(remote: &str, stderr: &str) -> GitError {
    let lower = stderr.to_lowercase();

    if lower.contains("already exists") {
        GitError::RefAlreadyExists(stderr.trim().to_string())
    } else if lower.contains("could not resolve host")
        || lower.contains("unable to access")
        || lower.contains("connection timed out")
        || lower.contains("connection refused")
        || lower.contains("could not read from remote repository")
    {
        GitError::RemoteUnreachable(format!("{}: {}", remote, stderr.trim()))
    } else if lower.contains("does not appear to be a git repository") {
        GitError::RemoteNotFound(remote.to_string())
    } else {
        GitError::PushFailed(stderr.trim().to_string())
    }
}

/// Push refs using the git CLI (more reliable for authentication)
#[instrument(skip(refs), fields(refs = refs.len()))]
pub fn git_push(workdir: &Path, remote: &str, refs: &[String]) -> Result<()> {
    let start = std::time::Instant::now();
    let output = std::process::Command::new("git")
        .current_dir(workdir)
        .args(["push", "--atomic", "--no-verify", remote])
        .args(refs)
        .output()
        .map_err(|e| GitError::PushFailed(format!("failed to run git: {}", e)))?;

    info!(
        remote,
        refs = ?refs,
        duration_ms = start.elapsed().as_millis(),
        success = output.status.success(),
        "git push (CLI)"
    );

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let err = classify_push_failure(remote, &stderr);
        warn!(error = %err, "git push failed");
        Err(err)
    }
}

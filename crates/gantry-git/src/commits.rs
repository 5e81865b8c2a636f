//! Commit history and release commits

use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use git2::{DiffOptions, Oid, Sort};
use tracing::{debug, info, instrument};

use gantry_core::error::GitError;

use crate::repository::{GitRepo, Result};
use crate::types::CommitInfo;

impl GitRepo {
    fn resolve_commit(&self, reference: &str) -> Result<Oid> {
        let object = self
            .repo
            .revparse_single(reference)
            .map_err(|_| GitError::InvalidRevision(reference.to_string()))?;
        Ok(object.peel_to_commit()?.id())
    }

    fn walk_from_head(&self, hide: Option<Oid>) -> Result<git2::Revwalk<'_>> {
        let head = self.head_commit()?;

        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        revwalk.push(head.id())?;
        if let Some(oid) = hide {
            revwalk.hide(oid)?;
        }
        Ok(revwalk)
    }

    /// Commits reachable from HEAD but not from `since`
    pub fn commits_since(&self, since: &str) -> Result<Vec<CommitInfo>> {
        let since_oid = self.resolve_commit(since)?;
        let mut commits = Vec::new();

        for oid in self.walk_from_head(Some(since_oid))? {
            let commit = self.repo.find_commit(oid?)?;
            commits.push(commit_to_info(&commit));
        }

        Ok(commits)
    }

    /// Number of commits reachable from HEAD but not from `since`
    pub fn count_commits_since(&self, since: &str) -> Result<usize> {
        let since_oid = self.resolve_commit(since)?;
        let mut count = 0;
        for oid in self.walk_from_head(Some(since_oid))? {
            oid?;
            count += 1;
        }
        Ok(count)
    }

    /// Commits touching a repository-relative path, newest first.
    ///
    /// With `since`, only commits after that reference are considered.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn commits_touching(&self, path: &Path, since: Option<&str>) -> Result<Vec<CommitInfo>> {
        let hide = since.map(|s| self.resolve_commit(s)).transpose()?;
        let pathspec = path.to_string_lossy().replace('\\', "/");
        let whole_repo = pathspec.is_empty() || pathspec == ".";
        let mut commits = Vec::new();

        for oid in self.walk_from_head(hide)? {
            let commit = self.repo.find_commit(oid?)?;
            if whole_repo || self.commit_touches(&commit, &pathspec)? {
                commits.push(commit_to_info(&commit));
            }
        }

        debug!(count = commits.len(), "collected commits for path");
        Ok(commits)
    }

    fn commit_touches(&self, commit: &git2::Commit<'_>, pathspec: &str) -> Result<bool> {
        let tree = commit.tree()?;
        let parent_tree = match commit.parents().next() {
            Some(parent) => Some(parent.tree()?),
            None => None,
        };

        let mut opts = DiffOptions::new();
        opts.pathspec(pathspec);
        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))?;
        Ok(diff.deltas().len() > 0)
    }

    /// Stage workspace-relative files and commit them on HEAD.
    ///
    /// Returns the new commit SHA.
    #[instrument(skip(self, files), fields(files = files.len()))]
    pub fn commit_paths(&self, message: &str, files: &[PathBuf]) -> Result<String> {
        let mut index = self.repo.index()?;
        for file in files {
            let absolute = self.path().join(file);
            if absolute.exists() {
                index.add_path(file)?;
            } else {
                index.remove_path(file)?;
            }
        }
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let sig = self
            .repo
            .signature()
            .map_err(|e| GitError::CommitFailed(format!("no author identity: {}", e)))?;
        let parent = self.head_commit()?;

        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])
            .map_err(|e| GitError::CommitFailed(e.to_string()))?;

        info!(sha = %oid, "created release commit");
        Ok(oid.to_string())
    }
}

/// Convert a git2 Commit to CommitInfo
fn commit_to_info(commit: &git2::Commit<'_>) -> CommitInfo {
    let author = commit.author();
    let timestamp = Utc
        .timestamp_opt(commit.time().seconds(), 0)
        .single()
        .unwrap_or_else(Utc::now);

    let info = CommitInfo::new(
        commit.id().to_string(),
        commit.summary().unwrap_or("(no message)"),
        author.name().unwrap_or("Unknown"),
        author.email().unwrap_or("unknown@example.com"),
        timestamp,
    );

    match commit.body() {
        Some(body) => info.with_body(body),
        None => info,
    }
}

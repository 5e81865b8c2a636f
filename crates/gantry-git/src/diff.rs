//! Changed-file queries

use std::path::Path;

use git2::{Diff, DiffOptions};
use tracing::{debug, instrument};

use gantry_core::error::GitError;

use crate::repository::{GitRepo, Result};

impl GitRepo {
    /// Repository-relative files changed under `location`.
    ///
    /// `since` is either a commit-ish, compared against the working tree and
    /// index, or an `a..b` range, compared tree to tree.
    #[instrument(skip(self), fields(location = %location.display()))]
    pub fn diff_files(&self, since: &str, location: &Path) -> Result<Vec<String>> {
        let mut opts = DiffOptions::new();
        let pathspec = location.to_string_lossy().replace('\\', "/");
        if !pathspec.is_empty() && pathspec != "." {
            opts.pathspec(pathspec.as_str());
        }

        let diff = if since.contains("..") {
            let spec = self
                .repo
                .revparse(since)
                .map_err(|_| GitError::InvalidRevision(since.to_string()))?;
            let from = spec
                .from()
                .ok_or_else(|| GitError::InvalidRevision(since.to_string()))?
                .peel_to_tree()?;
            let to = match spec.to() {
                Some(object) => object.peel_to_tree()?,
                None => self.head_commit()?.tree()?,
            };
            self.repo
                .diff_tree_to_tree(Some(&from), Some(&to), Some(&mut opts))?
        } else {
            let tree = self
                .repo
                .revparse_single(since)
                .map_err(|_| GitError::InvalidRevision(since.to_string()))?
                .peel_to_tree()?;
            self.repo
                .diff_tree_to_workdir_with_index(Some(&tree), Some(&mut opts))?
        };

        let files = changed_paths(&diff);
        debug!(since, count = files.len(), "diffed files");
        Ok(files)
    }
}

fn changed_paths(diff: &Diff<'_>) -> Vec<String> {
    let mut files: Vec<String> = diff
        .deltas()
        .filter_map(|delta| delta.new_file().path().or_else(|| delta.old_file().path()))
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .collect();
    files.sort();
    files.dedup();
    files
}

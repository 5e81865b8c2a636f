//! Repository status operations

use tracing::debug;

use gantry_core::error::GitError;

use crate::repository::{GitRepo, Result};

impl GitRepo {
    /// Check if the working directory is clean (no uncommitted changes).
    ///
    /// Untracked files count as changes.
    pub fn is_clean(&self) -> Result<bool> {
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true).include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut opts))?;

        for entry in statuses.iter() {
            let status = entry.status();

            if status.is_index_new()
                || status.is_index_modified()
                || status.is_index_deleted()
                || status.is_index_renamed()
                || status.is_index_typechange()
                || status.is_wt_new()
                || status.is_wt_modified()
                || status.is_wt_deleted()
                || status.is_wt_renamed()
                || status.is_wt_typechange()
            {
                debug!(path = ?entry.path(), "working tree not clean");
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Get the current branch name, `None` when HEAD is detached or unborn
    pub fn current_branch(&self) -> Result<Option<String>> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if head.is_branch() {
            Ok(head.shorthand().map(|s| s.to_string()))
        } else {
            Ok(None)
        }
    }

    /// Commits the current branch lacks from its upstream on `remote`.
    ///
    /// Uses the last fetched state of the remote-tracking branch; a branch
    /// without one is not behind.
    pub fn commits_behind_upstream(&self, remote: &str) -> Result<usize> {
        let Some(branch) = self.current_branch()? else {
            return Ok(0);
        };

        let tracking = format!("refs/remotes/{}/{}", remote, branch);
        let upstream = match self.repo.find_reference(&tracking) {
            Ok(reference) => reference.peel_to_commit()?.id(),
            Err(e) if e.code() == git2::ErrorCode::NotFound => {
                debug!(tracking = %tracking, "no remote-tracking branch");
                return Ok(0);
            }
            Err(e) => return Err(GitError::Git2(e)),
        };

        let local = self.head_commit()?.id();
        let (_ahead, behind) = self.repo.graph_ahead_behind(local, upstream)?;
        debug!(remote, branch = %branch, behind, "compared with upstream");
        Ok(behind)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{commit_files, setup_repo};

    #[test]
    fn test_is_clean() {
        let (_temp, repo) = setup_repo();
        assert!(repo.is_clean().unwrap());
    }

    #[test]
    fn test_is_dirty() {
        let (temp, repo) = setup_repo();
        std::fs::write(temp.path().join("new_file.txt"), "new").unwrap();
        assert!(!repo.is_clean().unwrap());
    }

    #[test]
    fn test_current_branch() {
        let (_temp, repo) = setup_repo();
        // Git might default to 'master' or 'main' depending on config
        assert!(repo.current_branch().unwrap().is_some());
    }

    #[test]
    fn test_behind_upstream() {
        let (_temp, repo) = setup_repo();
        let branch = repo.current_branch().unwrap().unwrap();
        assert_eq!(repo.commits_behind_upstream("origin").unwrap(), 0);

        let base = repo.head_commit().unwrap().id();
        let ahead = commit_files(repo.inner(), &[("a.txt", "a")], "feat: a");
        repo.inner()
            .reference(&format!("refs/remotes/origin/{}", branch), ahead, true, "test")
            .unwrap();
        repo.inner()
            .reference(&format!("refs/heads/{}", branch), base, true, "reset")
            .unwrap();

        assert_eq!(repo.commits_behind_upstream("origin").unwrap(), 1);
    }
}

//! `VersionControl` implementation

use std::path::{Path, PathBuf};

use gantry_core::capabilities::VersionControl;
use gantry_core::Result;

use crate::repository::GitRepo;

impl VersionControl for GitRepo {
    fn has_commits(&self) -> Result<bool> {
        Ok(GitRepo::has_commits(self)?)
    }

    fn last_release_tag(&self, pattern: Option<&str>) -> Result<Option<String>> {
        Ok(GitRepo::last_release_tag(self, pattern)?.map(|t| t.name))
    }

    fn first_commit(&self) -> Result<String> {
        Ok(GitRepo::first_commit(self)?)
    }

    fn head_sha(&self) -> Result<String> {
        Ok(GitRepo::head_sha(self)?)
    }

    fn commits_since(&self, reference: &str) -> Result<usize> {
        Ok(self.count_commits_since(reference)?)
    }

    fn diff_files(&self, since: &str, location: &Path) -> Result<Vec<String>> {
        Ok(GitRepo::diff_files(self, since, location)?)
    }

    fn is_clean(&self) -> Result<bool> {
        Ok(GitRepo::is_clean(self)?)
    }

    fn current_branch(&self) -> Result<Option<String>> {
        Ok(GitRepo::current_branch(self)?)
    }

    fn commits_behind_upstream(&self, remote: &str) -> Result<usize> {
        Ok(GitRepo::commits_behind_upstream(self, remote)?)
    }

    fn commit(&self, message: &str, files: &[PathBuf]) -> Result<String> {
        Ok(self.commit_paths(message, files)?)
    }

    fn tag(&self, name: &str, message: &str) -> Result<()> {
        self.create_tag(name, message)?;
        Ok(())
    }

    fn push(&self, remote: &str, refs: &[String]) -> Result<()> {
        Ok(GitRepo::push(self, remote, refs)?)
    }
}

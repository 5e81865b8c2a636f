//! Gantry Git - Git operations for workspace releases
//!
//! This crate provides repository inspection (commit history, tags, status,
//! diffs), release commits and tags, and pushing through the git CLI. The
//! [`GitRepo`] type implements `gantry_core::VersionControl`.

mod commits;
mod diff;
mod remote;
mod repository;
mod status;
mod tags;
pub mod types;
mod vcs;

pub use remote::{classify_push_failure, git_push};
pub use repository::{GitRepo, Result};
pub use types::{CommitInfo, TagInfo};

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    use git2::{Repository, Signature};
    use tempfile::TempDir;

    use crate::GitRepo;

    /// Write files and commit them, returning the commit id
    pub fn commit_files(repo: &Repository, files: &[(&str, &str)], message: &str) -> git2::Oid {
        let workdir = repo.workdir().unwrap().to_path_buf();
        let mut index = repo.index().unwrap();
        for (path, content) in files {
            let full = workdir.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&full, content).unwrap();
            index.add_path(Path::new(path)).unwrap();
        }
        index.write().unwrap();

        let sig = Signature::now("Test", "test@example.com").unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let parents = match repo.head() {
            Ok(head) => vec![head.peel_to_commit().unwrap()],
            Err(_) => Vec::new(),
        };
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .unwrap()
    }

    /// A repository with a user identity configured and one commit
    pub fn setup_repo() -> (TempDir, GitRepo) {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init(temp.path()).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "Test").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();

        commit_files(&repo, &[("README.md", "# workspace")], "chore: initial commit");

        let git_repo = GitRepo::open(temp.path()).unwrap();
        (temp, git_repo)
    }
}

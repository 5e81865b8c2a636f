//! Tag operations

use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use git2::Oid;
use globset::Glob;
use tracing::{debug, info, instrument};

use gantry_core::error::GitError;

use crate::repository::{GitRepo, Result};
use crate::types::TagInfo;

impl GitRepo {
    /// Get all tags, peeled to the commits they point at
    #[instrument(skip(self))]
    pub fn tags(&self) -> Result<Vec<TagInfo>> {
        let mut tags = Vec::new();

        self.repo.tag_foreach(|oid, name| {
            let name = String::from_utf8_lossy(name)
                .trim_start_matches("refs/tags/")
                .to_string();

            if let Ok(commit) = self.repo.find_commit(oid) {
                tags.push(TagInfo::new(&name, commit.id().to_string()));
            } else if let Ok(tag) = self.repo.find_tag(oid) {
                // Annotated tag
                let target = tag
                    .target()
                    .and_then(|t| t.peel_to_commit())
                    .map(|c| c.id())
                    .unwrap_or_else(|_| tag.target_id());
                let mut tag_info = TagInfo::new(&name, target.to_string());

                if let Some(msg) = tag.message() {
                    tag_info = tag_info.with_message(msg.trim());
                }
                if let Some(tagger) = tag.tagger() {
                    let timestamp = Utc
                        .timestamp_opt(tagger.when().seconds(), 0)
                        .single()
                        .unwrap_or_else(Utc::now);
                    tag_info = tag_info.with_timestamp(timestamp);
                }

                tags.push(tag_info);
            }

            true
        })?;

        debug!(count = tags.len(), "listed all tags");
        Ok(tags)
    }

    /// Tags whose name matches a glob such as `*@*` or `v*`
    pub fn tags_matching(&self, pattern: &str) -> Result<Vec<TagInfo>> {
        let matcher = Glob::new(pattern)
            .map_err(|e| GitError::InvalidRevision(format!("{}: {}", pattern, e)))?
            .compile_matcher();

        Ok(self
            .tags()?
            .into_iter()
            .filter(|t| matcher.is_match(&t.name))
            .collect())
    }

    /// Most recent tag reachable from HEAD, optionally restricted to a glob.
    ///
    /// Walks history from HEAD and returns the first commit carrying a
    /// matching tag; several tags on that commit resolve to the highest
    /// version, then the greatest name.
    #[instrument(skip(self))]
    pub fn last_release_tag(&self, pattern: Option<&str>) -> Result<Option<TagInfo>> {
        let tags = match pattern {
            Some(p) => self.tags_matching(p)?,
            None => self.tags()?,
        };
        if tags.is_empty() {
            return Ok(None);
        }

        let mut by_commit: HashMap<Oid, Vec<TagInfo>> = HashMap::new();
        for tag in tags {
            if let Ok(oid) = Oid::from_str(&tag.commit_hash) {
                by_commit.entry(oid).or_default().push(tag);
            }
        }

        let head = self.head_commit()?;
        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::TIME)?;
        revwalk.push(head.id())?;

        for oid in revwalk {
            let oid = oid?;
            if let Some(mut candidates) = by_commit.remove(&oid) {
                candidates.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.name.cmp(&b.name)));
                let latest = candidates.pop();
                debug!(latest = ?latest.as_ref().map(|t| &t.name), "found last release tag");
                return Ok(latest);
            }
        }

        Ok(None)
    }

    /// Find a specific tag by name
    pub fn find_tag(&self, name: &str) -> Result<Option<TagInfo>> {
        let tag_ref = format!("refs/tags/{}", name);

        match self.repo.find_reference(&tag_ref) {
            Ok(reference) => {
                let target = reference.peel_to_commit()?;
                Ok(Some(TagInfo::new(name, target.id().to_string())))
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::Git2(e)),
        }
    }

    /// Create an annotated tag at HEAD
    #[instrument(skip(self, message))]
    pub fn create_tag(&self, name: &str, message: &str) -> Result<TagInfo> {
        if self.find_tag(name)?.is_some() {
            return Err(GitError::TagExists(name.to_string()));
        }

        let head = self.head_commit()?;
        let sig = self.repo.signature()?;
        self.repo
            .tag(name, head.as_object(), &sig, message, false)
            .map_err(|e| GitError::TagCreationFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        info!(name, "created tag");
        Ok(TagInfo::new(name, head.id().to_string()).with_message(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{commit_files, setup_repo};

    fn lightweight(repo: &GitRepo, name: &str) {
        let head = repo.head_commit().unwrap();
        repo.inner()
            .tag_lightweight(name, head.as_object(), false)
            .unwrap();
    }

    #[test]
    fn test_list_tags() {
        let (_temp, repo) = setup_repo();
        lightweight(&repo, "v1.0.0");
        let tags = repo.tags().unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "v1.0.0");
        assert_eq!(tags[0].version, Some(semver::Version::new(1, 0, 0)));
    }

    #[test]
    fn test_last_release_tag_is_nearest_reachable() {
        let (_temp, repo) = setup_repo();
        lightweight(&repo, "a@1.0.0");
        commit_files(repo.inner(), &[("packages/a/index.js", "a")], "feat(a): add a");
        lightweight(&repo, "a@1.1.0");
        lightweight(&repo, "b@2.0.0");
        lightweight(&repo, "v9.0.0");
        commit_files(repo.inner(), &[("packages/a/index.js", "a2")], "fix(a): a");

        let tag = repo.last_release_tag(Some("*@*")).unwrap().unwrap();
        assert_eq!(tag.name, "b@2.0.0");

        let fixed = repo.last_release_tag(Some("v*")).unwrap().unwrap();
        assert_eq!(fixed.name, "v9.0.0");

        assert!(repo.last_release_tag(Some("release-*")).unwrap().is_none());
    }

    #[test]
    fn test_create_annotated_tag() {
        let (_temp, repo) = setup_repo();
        let tag = repo.create_tag("v2.0.0", "v2.0.0").unwrap();
        assert_eq!(tag.name, "v2.0.0");

        let found = repo.last_release_tag(None).unwrap().unwrap();
        assert_eq!(found.name, "v2.0.0");
        assert_eq!(found.commit_hash, repo.head_sha().unwrap());
    }

    #[test]
    fn test_tag_already_exists() {
        let (_temp, repo) = setup_repo();
        lightweight(&repo, "v1.0.0");
        let result = repo.create_tag("v1.0.0", "again");
        assert!(matches!(result, Err(GitError::TagExists(_))));
    }
}

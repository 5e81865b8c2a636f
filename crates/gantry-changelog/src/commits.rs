//! Git-backed conventional-commit capability

use std::path::Path;

use chrono::Utc;
use gantry_core::config::{ChangelogConfig, VersioningConfig};
use gantry_core::monorepo::graph::PackageNode;
use gantry_core::monorepo::versioning::VersioningMode;
use gantry_core::{BumpRecommender, BumpType, ChangelogUpdate, ConventionalCommits, Result};
use gantry_git::{CommitInfo, GitRepo};
use semver::Version;
use tracing::{debug, info, instrument};

use crate::formatter::MarkdownFormatter;
use crate::generator::ChangelogGenerator;
use crate::writer::ChangelogWriter;

/// Recommends bumps from conventional commits and writes changelogs.
///
/// Commits are those touching a package directory since the package's last
/// release tag: the shared tag in fixed mode, `name@*` in independent mode.
pub struct GitConventionalCommits {
    repo: GitRepo,
    config: ChangelogConfig,
    mode: VersioningMode,
    tag_format: String,
    independent_tag_format: String,
    generator: ChangelogGenerator,
    writer: ChangelogWriter,
}

impl GitConventionalCommits {
    /// Create the capability over a repository whose work tree is the
    /// workspace root
    pub fn new(repo: GitRepo, config: ChangelogConfig, versioning: &VersioningConfig) -> Self {
        let writer = ChangelogWriter::new(&config.header);
        Self {
            repo,
            config,
            mode: versioning.mode,
            tag_format: versioning.tag_format.clone(),
            independent_tag_format: versioning.independent_tag_format.clone(),
            generator: ChangelogGenerator::new().with_formatter(MarkdownFormatter::new()),
            writer,
        }
    }

    fn root(&self) -> &Path {
        self.repo.path()
    }

    fn tag_pattern(&self, package: &str) -> String {
        let format = match self.mode {
            VersioningMode::Fixed => &self.tag_format,
            VersioningMode::Independent => &self.independent_tag_format,
        };
        format.replace("{name}", package).replace("{version}", "*")
    }

    /// Commits touching the package since its last release
    pub fn pending_commits(&self, node: &PackageNode) -> Result<Vec<CommitInfo>> {
        let pattern = self.tag_pattern(node.name());
        let since = self.repo.last_release_tag(Some(&pattern))?;
        let commits = self
            .repo
            .commits_touching(node.location(), since.as_ref().map(|t| t.name.as_str()))?;

        debug!(
            package = %node.name(),
            since = ?since.as_ref().map(|t| &t.name),
            count = commits.len(),
            "pending commits"
        );
        Ok(commits)
    }
}

impl BumpRecommender for GitConventionalCommits {
    /// Affected packages always get at least a patch: a package pulled in
    /// by a dependency has no commits of its own
    #[instrument(skip(self, node), fields(package = %node.name()))]
    fn recommend_bump(&self, node: &PackageNode) -> Result<BumpType> {
        let commits = self.pending_commits(node)?;
        let bump = self.generator.recommend_bump(&commits).max(BumpType::Patch);
        debug!(bump = %bump, "recommended bump");
        Ok(bump)
    }
}

impl ConventionalCommits for GitConventionalCommits {
    #[instrument(skip(self, node, version), fields(package = %node.name(), version = %version))]
    fn update_changelog(&self, node: &PackageNode, version: &Version) -> Result<ChangelogUpdate> {
        let commits = self.pending_commits(node)?;
        let mut entry = self.generator.generate(&version.to_string(), &commits);
        if entry.is_empty() {
            entry = entry.with_notes(format!(
                "**Note:** Version bump only for package {}",
                node.name()
            ));
        }

        let new_entry = self.generator.format(&entry);
        let path = node.location().join(&self.config.file);
        self.writer.prepend(&self.root().join(&path), &new_entry)?;

        info!(path = %path.display(), "package changelog updated");
        Ok(ChangelogUpdate { path, new_entry })
    }

    #[instrument(skip(self, entries), fields(packages = entries.len()))]
    fn update_root_changelog(
        &self,
        version: &str,
        entries: &[(String, ChangelogUpdate)],
    ) -> Result<ChangelogUpdate> {
        let new_entry = root_entry(version, &Utc::now().format("%Y-%m-%d").to_string(), entries);
        let path = self.config.file.clone();
        self.writer.prepend(&self.root().join(&path), &new_entry)?;

        info!(path = %path.display(), "root changelog updated");
        Ok(ChangelogUpdate { path, new_entry })
    }
}

/// Root entry: one sub-heading per package holding that package's entry
/// with its version heading dropped and sections demoted one level
fn root_entry(version: &str, date: &str, entries: &[(String, ChangelogUpdate)]) -> String {
    let mut output = format!("## [{}] - {}\n\n", version, date);

    for (package, update) in entries {
        output.push_str(&format!("### {}\n\n", package));
        for line in update.new_entry.lines().skip_while(|l| l.is_empty() || l.starts_with("## ")) {
            match line.strip_prefix("### ") {
                Some(title) => output.push_str(&format!("#### {}\n", title)),
                None => {
                    output.push_str(line);
                    output.push('\n');
                }
            }
        }
        if !output.ends_with("\n\n") {
            output.push('\n');
        }
    }

    output
}

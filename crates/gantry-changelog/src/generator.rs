//! Changelog generation

use gantry_core::BumpType;
use gantry_git::CommitInfo;
use tracing::{debug, info, instrument};

use crate::formatter::{ChangelogFormatter, MarkdownFormatter};
use crate::parser::{CommitParser, ConventionalParser};
use crate::types::{ChangelogEntry, ParsedCommit, Section, SECTIONS};

/// Changelog generator
pub struct ChangelogGenerator {
    parser: Box<dyn CommitParser>,
    formatter: Box<dyn ChangelogFormatter>,
}

impl ChangelogGenerator {
    /// Create a new generator with the conventional parser and markdown output
    pub fn new() -> Self {
        Self {
            parser: Box::new(ConventionalParser::new()),
            formatter: Box::new(MarkdownFormatter::new()),
        }
    }

    /// Use a custom parser
    pub fn with_parser<P: CommitParser + 'static>(mut self, parser: P) -> Self {
        self.parser = Box::new(parser);
        self
    }

    /// Use a custom formatter
    pub fn with_formatter<F: ChangelogFormatter + 'static>(mut self, formatter: F) -> Self {
        self.formatter = Box::new(formatter);
        self
    }

    /// Conventional commits among `commits` that belong in a changelog
    pub fn parse(&self, commits: &[CommitInfo]) -> Vec<ParsedCommit> {
        commits
            .iter()
            .filter_map(|c| self.parser.parse(c))
            .filter(|c| self.parser.should_include(c))
            .collect()
    }

    /// Highest bump called for by `commits`; `None` when there are none
    pub fn recommend_bump(&self, commits: &[CommitInfo]) -> BumpType {
        let parsed = self.parse(commits);
        let bump = parsed
            .iter()
            .fold(BumpType::None, |bump, commit| bump.max(commit.bump()));

        // Commits that do not follow the convention still call for a release
        if bump == BumpType::None && !commits.is_empty() {
            BumpType::Patch
        } else {
            bump
        }
    }

    /// Generate a changelog entry from commits
    #[instrument(skip(self, commits), fields(commit_count = commits.len()))]
    pub fn generate(&self, version: &str, commits: &[CommitInfo]) -> ChangelogEntry {
        info!(version, commit_count = commits.len(), "generating changelog entry");
        let mut entry = ChangelogEntry::new(version);
        let parsed = self.parse(commits);

        for commit in parsed.iter().filter(|c| c.breaking) {
            entry.add_breaking_change(commit.clone());
        }

        for (commit_type, title) in SECTIONS {
            let mut section = Section::new(title);
            for commit in parsed.iter().filter(|c| c.commit_type == commit_type) {
                section.add_commit(commit.clone());
            }
            entry.add_section(section);
        }

        debug!(
            section_count = entry.sections.len(),
            breaking_count = entry.breaking_changes.len(),
            "changelog sections built"
        );
        entry
    }

    /// Format a changelog entry to string
    pub fn format(&self, entry: &ChangelogEntry) -> String {
        self.formatter.format(entry)
    }
}

impl Default for ChangelogGenerator {
    fn default() -> Self {
        Self::new()
    }
}

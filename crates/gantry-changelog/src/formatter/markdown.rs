//! Markdown changelog formatter

use tracing::{debug, instrument};

use super::ChangelogFormatter;
use crate::types::{ChangelogEntry, ParsedCommit};

/// Markdown changelog formatter
#[derive(Debug, Clone)]
pub struct MarkdownFormatter {
    /// Append the short commit hash to each line
    pub include_hashes: bool,
    /// Append the commit author to each line
    pub include_authors: bool,
}

impl MarkdownFormatter {
    /// Create a formatter that shows hashes but not authors
    pub fn new() -> Self {
        Self {
            include_hashes: true,
            include_authors: false,
        }
    }

    /// Show or hide commit hashes
    pub fn with_hashes(mut self, include: bool) -> Self {
        self.include_hashes = include;
        self
    }

    /// Show or hide commit authors
    pub fn with_authors(mut self, include: bool) -> Self {
        self.include_authors = include;
        self
    }

    fn commit_line(&self, commit: &ParsedCommit) -> String {
        let mut line = String::from("- ");
        if let Some(scope) = &commit.scope {
            line.push_str(&format!("**{}:** ", scope));
        }
        line.push_str(&commit.description);
        if self.include_hashes {
            line.push_str(&format!(" ({})", commit.short_hash()));
        }
        if self.include_authors {
            line.push_str(&format!(" - {}", commit.author));
        }
        line.push('\n');
        line
    }
}

impl Default for MarkdownFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangelogFormatter for MarkdownFormatter {
    #[instrument(skip(self, entry), fields(version = %entry.version, section_count = entry.sections.len()))]
    fn format(&self, entry: &ChangelogEntry) -> String {
        let mut output = String::new();

        let date_str = entry.date.format("%Y-%m-%d").to_string();
        output.push_str(&format!("## [{}] - {}\n\n", entry.version, date_str));

        if !entry.breaking_changes.is_empty() {
            output.push_str("### ⚠ BREAKING CHANGES\n\n");
            for commit in &entry.breaking_changes {
                output.push_str(&self.commit_line(commit));
            }
            output.push('\n');
        }

        for section in &entry.sections {
            output.push_str(&format!("### {}\n\n", section.title));
            for commit in &section.commits {
                output.push_str(&self.commit_line(commit));
            }
            output.push('\n');
        }

        if let Some(notes) = &entry.notes {
            output.push_str(&format!("{}\n\n", notes));
        }

        debug!(output_len = output.len(), "markdown changelog formatted");
        output
    }
}

//! Changelog types

use chrono::{DateTime, Utc};
use gantry_core::BumpType;
use serde::{Deserialize, Serialize};

/// A parsed commit from conventional commit format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedCommit {
    /// Original commit hash
    pub hash: String,
    /// Commit type (feat, fix, etc.)
    pub commit_type: String,
    /// Scope (optional, in parentheses)
    pub scope: Option<String>,
    /// Whether this is a breaking change
    pub breaking: bool,
    /// Commit description
    pub description: String,
    /// Commit body
    pub body: Option<String>,
    /// Footer fields
    pub footers: Vec<Footer>,
    /// Author name
    pub author: String,
    /// Commit timestamp
    pub timestamp: DateTime<Utc>,
}

impl ParsedCommit {
    /// Bump this commit calls for on its own
    pub fn bump(&self) -> BumpType {
        if self.breaking {
            BumpType::Major
        } else if self.commit_type == "feat" {
            BumpType::Minor
        } else {
            BumpType::Patch
        }
    }

    /// Abbreviated hash
    pub fn short_hash(&self) -> &str {
        &self.hash[..7.min(self.hash.len())]
    }
}

/// A footer field from a conventional commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Footer {
    /// Footer token (e.g., "BREAKING CHANGE", "Fixes", "Refs")
    pub token: String,
    /// Footer value
    pub value: String,
}

impl Footer {
    /// Whether the footer announces a breaking change
    pub fn is_breaking(&self) -> bool {
        self.token.eq_ignore_ascii_case("BREAKING CHANGE")
            || self.token.eq_ignore_ascii_case("BREAKING-CHANGE")
    }
}

/// Commit types that get a changelog section, in display order
pub const SECTIONS: [(&str, &str); 5] = [
    ("feat", "Features"),
    ("fix", "Bug Fixes"),
    ("perf", "Performance Improvements"),
    ("revert", "Reverts"),
    ("docs", "Documentation"),
];

/// A section in a changelog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    /// Section title
    pub title: String,
    /// Commits in this section
    pub commits: Vec<ParsedCommit>,
}

impl Section {
    /// Create a new section
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            commits: Vec::new(),
        }
    }

    /// Add a commit to the section
    pub fn add_commit(&mut self, commit: ParsedCommit) {
        self.commits.push(commit);
    }

    /// Check if section is empty
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }
}

/// A changelog entry for one version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangelogEntry {
    /// Version string
    pub version: String,
    /// Release date
    pub date: DateTime<Utc>,
    /// Sections in this entry
    pub sections: Vec<Section>,
    /// Breaking changes (highlighted separately)
    pub breaking_changes: Vec<ParsedCommit>,
    /// Free text shown when there is nothing else to say
    pub notes: Option<String>,
}

impl ChangelogEntry {
    /// Create a new changelog entry dated now
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            date: Utc::now(),
            sections: Vec::new(),
            breaking_changes: Vec::new(),
            notes: None,
        }
    }

    /// Set the date
    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    /// Set notes
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Add a section, dropping it when empty
    pub fn add_section(&mut self, section: Section) {
        if !section.is_empty() {
            self.sections.push(section);
        }
    }

    /// Add a breaking change
    pub fn add_breaking_change(&mut self, commit: ParsedCommit) {
        self.breaking_changes.push(commit);
    }

    /// Check if entry has any commit content
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty() && self.breaking_changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(commit_type: &str, breaking: bool) -> ParsedCommit {
        ParsedCommit {
            hash: "abc1234567890".to_string(),
            commit_type: commit_type.to_string(),
            scope: None,
            breaking,
            description: "change".to_string(),
            body: None,
            footers: Vec::new(),
            author: "Test".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_commit_bump() {
        assert_eq!(commit("fix", true).bump(), BumpType::Major);
        assert_eq!(commit("feat", false).bump(), BumpType::Minor);
        assert_eq!(commit("chore", false).bump(), BumpType::Patch);
        assert_eq!(commit("fix", false).short_hash(), "abc1234");
    }

    #[test]
    fn test_empty_sections_are_dropped() {
        let mut entry = ChangelogEntry::new("1.0.0");
        entry.add_section(Section::new("Features"));
        assert!(entry.is_empty());

        let mut section = Section::new("Bug Fixes");
        section.add_commit(commit("fix", false));
        entry.add_section(section);
        assert!(!entry.is_empty());
    }
}

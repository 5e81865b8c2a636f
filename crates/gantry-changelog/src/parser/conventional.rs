//! Conventional Commits parser
//!
//! Parses commits following the Conventional Commits format:
//! https://www.conventionalcommits.org/

use regex::Regex;
use std::sync::LazyLock;

use super::{CommitParser, ParserConfig};
use crate::types::{Footer, ParsedCommit};
use gantry_git::CommitInfo;

/// Header line: `type(scope)!: description`
static HEADER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<type>[a-zA-Z]+)(?:\((?P<scope>[^)]+)\))?(?P<breaking>!)?: (?P<description>.+)$",
    )
    .expect("Invalid regex")
});

/// Footer line: `Token: value` or `BREAKING CHANGE: value`
static FOOTER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<token>BREAKING CHANGE|[A-Za-z-]+): (?P<value>.+)$").expect("Invalid regex")
});

/// Parser for the Conventional Commits format
#[derive(Debug, Clone, Default)]
pub struct ConventionalParser {
    config: ParserConfig,
}

struct ParsedMessage {
    commit_type: String,
    scope: Option<String>,
    breaking: bool,
    description: String,
    body: Option<String>,
    footers: Vec<Footer>,
}

impl ConventionalParser {
    /// Create a parser that keeps every conventional commit except merges
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a parser with custom configuration
    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    fn parse_message(&self, message: &str, body: Option<&str>) -> Option<ParsedMessage> {
        let caps = HEADER_REGEX.captures(message.trim())?;

        let commit_type = caps.name("type")?.as_str().to_lowercase();
        let scope = caps.name("scope").map(|m| m.as_str().to_string());
        let description = caps.name("description")?.as_str().to_string();

        let (body, footers) = body.map(parse_body).unwrap_or_default();
        let breaking_in_footer = footers.iter().any(Footer::is_breaking);

        Some(ParsedMessage {
            commit_type,
            scope,
            breaking: caps.name("breaking").is_some() || breaking_in_footer,
            description,
            body,
            footers,
        })
    }
}

/// Split a commit body into free text and trailing footers
fn parse_body(body: &str) -> (Option<String>, Vec<Footer>) {
    let mut footers: Vec<Footer> = Vec::new();
    let mut body_lines = Vec::new();
    let mut in_footer = false;

    for line in body.lines() {
        if let Some(caps) = FOOTER_REGEX.captures(line) {
            let (Some(token), Some(value)) = (caps.name("token"), caps.name("value")) else {
                continue;
            };
            in_footer = true;
            footers.push(Footer {
                token: token.as_str().to_string(),
                value: value.as_str().to_string(),
            });
        } else if in_footer && line.starts_with(' ') {
            if let Some(last) = footers.last_mut() {
                last.value.push('\n');
                last.value.push_str(line.trim());
            }
        } else if !in_footer {
            body_lines.push(line);
        }
    }

    let text = body_lines.join("\n").trim().to_string();
    let body = if text.is_empty() { None } else { Some(text) };
    (body, footers)
}

impl CommitParser for ConventionalParser {
    fn parse(&self, commit: &CommitInfo) -> Option<ParsedCommit> {
        if !self.config.include_merges && commit.message.starts_with("Merge ") {
            return None;
        }

        let parsed = self.parse_message(&commit.message, commit.body.as_deref())?;

        Some(ParsedCommit {
            hash: commit.hash.clone(),
            commit_type: parsed.commit_type,
            scope: parsed.scope,
            breaking: parsed.breaking,
            description: parsed.description,
            body: parsed.body,
            footers: parsed.footers,
            author: commit.author.clone(),
            timestamp: commit.timestamp,
        })
    }

    fn should_include(&self, commit: &ParsedCommit) -> bool {
        if self.config.exclude_types.contains(&commit.commit_type) {
            return false;
        }

        self.config.include_types.is_empty()
            || self.config.include_types.contains(&commit.commit_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_commit(message: &str) -> CommitInfo {
        CommitInfo::new(
            "abc1234567890",
            message,
            "Test Author",
            "test@example.com",
            Utc::now(),
        )
    }

    #[test]
    fn test_parse_simple_feat() {
        let parser = ConventionalParser::new();
        let parsed = parser.parse(&make_commit("feat: add new feature")).unwrap();

        assert_eq!(parsed.commit_type, "feat");
        assert_eq!(parsed.description, "add new feature");
        assert!(parsed.scope.is_none());
        assert!(!parsed.breaking);
    }

    #[test]
    fn test_parse_breaking_with_scope() {
        let parser = ConventionalParser::new();
        let parsed = parser
            .parse(&make_commit("refactor(core)!: drop node 16"))
            .unwrap();

        assert_eq!(parsed.commit_type, "refactor");
        assert_eq!(parsed.scope.as_deref(), Some("core"));
        assert!(parsed.breaking);
    }

    #[test]
    fn test_parse_non_conventional() {
        let parser = ConventionalParser::new();
        assert!(parser.parse(&make_commit("Just a regular commit")).is_none());
        assert!(parser.parse(&make_commit("Merge branch 'main'")).is_none());
    }

    #[test]
    fn test_footers_and_breaking_footer() {
        let parser = ConventionalParser::new();
        let commit = make_commit("feat: add option")
            .with_body("Explains the option.\n\nRefs: #123\nBREAKING CHANGE: removes the old flag");

        let parsed = parser.parse(&commit).unwrap();
        assert!(parsed.breaking);
        assert_eq!(parsed.body.as_deref(), Some("Explains the option."));
        assert_eq!(parsed.footers.len(), 2);
        assert_eq!(parsed.footers[0].token, "Refs");
        assert_eq!(parsed.footers[0].value, "#123");
    }

    #[test]
    fn test_should_include_with_config() {
        let parser = ConventionalParser::with_config(ParserConfig::default().exclude_type("chore"));
        let feat = parser.parse(&make_commit("feat: feature")).unwrap();
        let chore = parser.parse(&make_commit("chore: cleanup")).unwrap();
        assert!(parser.should_include(&feat));
        assert!(!parser.should_include(&chore));

        let only_fix = ConventionalParser::with_config(ParserConfig::default().include_type("fix"));
        assert!(!only_fix.should_include(&feat));
    }
}

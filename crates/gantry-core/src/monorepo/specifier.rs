//! Dependency specifier classification
//!
//! npm specifiers are richer than `semver::VersionReq`: a bare version is an
//! exact pin, comparators are separated by spaces, `||` joins alternatives
//! and `a - b` is a hyphen range. [`NpmRange`] bridges those forms onto
//! `VersionReq`.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

const WORKSPACE_PROTOCOL: &str = "workspace:";

/// Alias used with the `workspace:` protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkspaceAlias {
    /// `workspace:*`, the exact version
    #[serde(rename = "*")]
    Star,
    /// `workspace:^`, a caret range
    #[serde(rename = "^")]
    Caret,
    /// `workspace:~`, a tilde range
    #[serde(rename = "~")]
    Tilde,
}

impl WorkspaceAlias {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "*" => Some(Self::Star),
            "^" => Some(Self::Caret),
            "~" => Some(Self::Tilde),
            _ => None,
        }
    }

    /// Concrete specifier for a target version
    pub fn resolve(&self, version: &Version) -> String {
        match self {
            Self::Star => version.to_string(),
            Self::Caret => format!("^{}", version),
            Self::Tilde => format!("~{}", version),
        }
    }

    /// The alias symbol
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Star => "*",
            Self::Caret => "^",
            Self::Tilde => "~",
        }
    }
}

/// An npm range: alternatives joined by `||`, each a comparator set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpmRange {
    alternatives: Vec<VersionReq>,
}

impl NpmRange {
    /// Parse an npm range, `None` if any alternative is not a valid range
    pub fn parse(raw: &str) -> Option<Self> {
        let alternatives = raw
            .split("||")
            .map(|alt| parse_comparator_set(alt.trim()))
            .collect::<Option<Vec<_>>>()?;
        Some(Self { alternatives })
    }

    /// Whether a version satisfies any alternative
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

fn parse_comparator_set(set: &str) -> Option<VersionReq> {
    if set.is_empty() || set == "*" || set.eq_ignore_ascii_case("x") {
        return Some(VersionReq::STAR);
    }

    if let Some((low, high)) = set.split_once(" - ") {
        return VersionReq::parse(&format!(">={}, <={}", low.trim(), high.trim())).ok();
    }

    let comparators: Vec<String> = set
        .split_whitespace()
        .map(|token| {
            if Version::parse(token).is_ok() {
                format!("={}", token)
            } else {
                token.to_string()
            }
        })
        .collect();
    VersionReq::parse(&comparators.join(", ")).ok()
}

/// Resolved form of a dependency specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSpecifier {
    /// A pinned version
    Exact {
        version: Version,
        workspace_protocol: bool,
    },
    /// A semantic range
    Range {
        range: NpmRange,
        workspace_protocol: bool,
    },
    /// `workspace:*`, `workspace:^` or `workspace:~`
    WorkspaceAlias(WorkspaceAlias),
    /// `file:` or `link:` reference, resolved to a workspace-relative path
    Directory(PathBuf),
    /// Not satisfied from the workspace
    External,
}

impl ResolvedSpecifier {
    /// Classify a specifier that names a workspace package.
    ///
    /// `source_location` is the workspace-relative directory of the package
    /// declaring the dependency; directory references resolve against it.
    pub fn classify(raw: &str, source_location: &Path) -> Self {
        let raw = raw.trim();

        if let Some(path) = raw
            .strip_prefix("file:")
            .or_else(|| raw.strip_prefix("link:"))
        {
            return Self::Directory(normalize(&source_location.join(path)));
        }

        let (spec, workspace_protocol) = match raw.strip_prefix(WORKSPACE_PROTOCOL) {
            Some(rest) => {
                if let Some(alias) = WorkspaceAlias::parse(rest) {
                    return Self::WorkspaceAlias(alias);
                }
                (rest, true)
            }
            None => (raw, false),
        };

        if let Ok(version) = Version::parse(spec.trim_start_matches('=')) {
            return Self::Exact {
                version,
                workspace_protocol,
            };
        }

        match NpmRange::parse(spec) {
            Some(range) => Self::Range {
                range,
                workspace_protocol,
            },
            None => Self::External,
        }
    }

    /// Whether a target version satisfies this specifier; `None` for
    /// external specifiers
    pub fn matches(&self, version: &Version) -> Option<bool> {
        match self {
            Self::Exact { version: pinned, .. } => Some(same_release(pinned, version)),
            Self::Range { range, .. } => Some(range.matches(version)),
            Self::WorkspaceAlias(_) | Self::Directory(_) => Some(true),
            Self::External => None,
        }
    }

    /// Whether this specifier is rewritten when the target is versioned
    pub fn is_alias(&self) -> bool {
        matches!(self, Self::WorkspaceAlias(_))
    }

    /// Short kind label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Exact { .. } => "exact",
            Self::Range { .. } => "range",
            Self::WorkspaceAlias(_) => "workspace-alias",
            Self::Directory(_) => "directory",
            Self::External => "external",
        }
    }
}

impl fmt::Display for ResolvedSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkspaceAlias(alias) => write!(f, "workspace-alias({})", alias.as_str()),
            Self::Directory(path) => write!(f, "directory({})", path.display()),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Equality ignoring build metadata
fn same_release(a: &Version, b: &Version) -> bool {
    a.major == b.major && a.minor == b.minor && a.patch == b.patch && a.pre == b.pre
}

/// Lexically resolve `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(raw: &str) -> ResolvedSpecifier {
        ResolvedSpecifier::classify(raw, Path::new("packages/b"))
    }

    #[test]
    fn test_workspace_aliases() {
        assert_eq!(
            classify("workspace:*"),
            ResolvedSpecifier::WorkspaceAlias(WorkspaceAlias::Star)
        );
        assert_eq!(
            classify("workspace:^"),
            ResolvedSpecifier::WorkspaceAlias(WorkspaceAlias::Caret)
        );
        assert_eq!(
            classify("workspace:~"),
            ResolvedSpecifier::WorkspaceAlias(WorkspaceAlias::Tilde)
        );
    }

    #[test]
    fn test_alias_resolution() {
        let v = Version::parse("2.1.0").unwrap();
        assert_eq!(WorkspaceAlias::Star.resolve(&v), "2.1.0");
        assert_eq!(WorkspaceAlias::Caret.resolve(&v), "^2.1.0");
        assert_eq!(WorkspaceAlias::Tilde.resolve(&v), "~2.1.0");
    }

    #[test]
    fn test_workspace_range_keeps_protocol() {
        match classify("workspace:^1.0.0") {
            ResolvedSpecifier::Range {
                workspace_protocol, ..
            } => assert!(workspace_protocol),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_exact_and_range() {
        let v104 = Version::parse("1.0.4").unwrap();
        assert!(matches!(classify("1.0.4"), ResolvedSpecifier::Exact { .. }));
        assert_eq!(classify("1.0.4").matches(&v104), Some(true));
        assert_eq!(classify("1.0.0").matches(&v104), Some(false));
        assert_eq!(classify("^1.0.0").matches(&v104), Some(true));
        assert_eq!(classify("^2.0.0").matches(&v104), Some(false));
    }

    #[test]
    fn test_npm_range_forms() {
        let v = Version::parse("1.5.0").unwrap();
        assert_eq!(classify(">=1.0.0 <2.0.0").matches(&v), Some(true));
        assert_eq!(classify("^0.9.0 || ^1.0.0").matches(&v), Some(true));
        assert_eq!(classify("1.0.0 - 1.4.0").matches(&v), Some(false));
        assert_eq!(classify("1.x").matches(&v), Some(true));
        assert_eq!(classify("*").matches(&v), Some(true));
    }

    #[test]
    fn test_directory_references() {
        assert_eq!(
            classify("file:../a"),
            ResolvedSpecifier::Directory(PathBuf::from("packages/a"))
        );
        assert_eq!(
            classify("link:../a"),
            ResolvedSpecifier::Directory(PathBuf::from("packages/a"))
        );
    }

    #[test]
    fn test_non_semver_is_external() {
        assert_eq!(classify("latest"), ResolvedSpecifier::External);
        assert_eq!(
            classify("github:user/repo#main"),
            ResolvedSpecifier::External
        );
        assert_eq!(classify("latest").matches(&Version::new(1, 0, 0)), None);
    }
}

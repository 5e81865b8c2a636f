//! Gantry Changelog - Conventional-commit analysis and changelog writing
//!
//! This crate parses conventional commits, recommends version bumps from
//! them and maintains `CHANGELOG.md` files. [`GitConventionalCommits`]
//! implements `gantry_core::ConventionalCommits` on top of a git repository.

mod commits;
pub mod formatter;
pub mod generator;
pub mod parser;
pub mod types;
pub mod writer;

pub use commits::GitConventionalCommits;
pub use generator::ChangelogGenerator;
pub use parser::{CommitParser, ConventionalParser};
pub use types::{ChangelogEntry, ParsedCommit, Section};
pub use writer::ChangelogWriter;

//! Parser configuration types

use std::collections::HashSet;

/// Configuration for the commit parser
#[derive(Debug, Clone, Default)]
pub struct ParserConfig {
    /// Commit types to include; empty includes every type not excluded
    pub include_types: HashSet<String>,
    /// Commit types to exclude
    pub exclude_types: HashSet<String>,
    /// Whether to include merge commits
    pub include_merges: bool,
}

impl ParserConfig {
    /// Add a type to include
    pub fn include_type(mut self, type_name: impl Into<String>) -> Self {
        self.include_types.insert(type_name.into());
        self
    }

    /// Add a type to exclude
    pub fn exclude_type(mut self, type_name: impl Into<String>) -> Self {
        self.exclude_types.insert(type_name.into());
        self
    }
}

//! Gantry Core - Core library for workspace releases
//!
//! This crate provides the foundational types, error handling, configuration,
//! collaborator traits and the workspace model (package graph, change
//! collection and version planning) used by the gantry release tool.

pub mod capabilities;
pub mod config;
pub mod error;
pub mod monorepo;
pub mod types;

pub use capabilities::{
    BumpRecommender, ChangelogUpdate, ConventionalCommits, ExitStatus, InstallOptions,
    ManifestStore, PackageManager, PublishRequest, Registry, VersionControl,
};
pub use error::{ErrorKind, GantryError, Result};
pub use types::BumpType;

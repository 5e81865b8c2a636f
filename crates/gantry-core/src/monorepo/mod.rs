//! Workspace model for multi-package repositories
//!
//! This module provides:
//! - Package discovery with glob patterns
//! - Dependency graph analysis with cycle detection and topological sorting
//! - Change detection against the last release and dependent propagation
//! - Version planning in fixed or independent mode

pub mod changes;
pub mod discovery;
pub mod graph;
pub mod manifest;
pub mod specifier;
pub mod versioning;

pub use changes::{
    release_tag_pattern, AffectCause, AffectedPackage, AffectedPackages, Baseline, ChangeCollector,
    ChangeOptions, ChangeReason, ChangeSet, ChangedPackage, DependentClosure, ForceInclude,
    IgnoreMatcher,
};
pub use discovery::{ManifestCache, PackageDiscovery, Workspace, MANIFEST_FILE};
pub use graph::{DependencyEdge, PackageGraph, PackageNode};
pub use manifest::{DependencyCollection, PackageManifest};
pub use specifier::{NpmRange, ResolvedSpecifier, WorkspaceAlias};
pub use versioning::{
    bump_version, current_published_version, format_tag, validate_build_metadata, ExplicitBump,
    PlannedVersion, SpecifierDrift, SpecifierRewrite, VersionPlan, VersionPlanner, VersioningMode,
};

//! Gantry npm - npm integration for gantry
//!
//! This crate provides the `package.json` manifest store, the `npm` CLI
//! package manager and the registry client used for dist-tag queries and
//! publishing.

mod client;
pub mod manifest;
mod registry;
mod store;

pub use client::{classify_publish_failure, NpmClient};
pub use manifest::PackageJson;
pub use registry::{parse_registry, NpmRegistry, DEFAULT_REGISTRY};
pub use store::NpmManifestStore;

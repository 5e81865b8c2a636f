//! Version planning for workspace packages

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use semver::{BuildMetadata, Prerelease, Version};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::capabilities::{BumpRecommender, Registry};
use crate::error::{GantryError, RegistryError, Result, VersionError};
use crate::types::BumpType;

use super::changes::AffectedPackages;
use super::graph::PackageGraph;
use super::manifest::{DependencyCollection, PackageManifest};
use super::specifier::{ResolvedSpecifier, WorkspaceAlias};

static BUILD_METADATA_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9A-Za-z-]+(\.[0-9A-Za-z-]+)*$").expect("Invalid build metadata regex")
});

/// Versioning mode for the workspace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersioningMode {
    /// All packages share one version
    #[default]
    Fixed,
    /// Each package has its own version
    Independent,
}

impl std::fmt::Display for VersioningMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::Independent => write!(f, "independent"),
        }
    }
}

/// Check build metadata against the semver build grammar
pub fn validate_build_metadata(metadata: &str) -> Result<()> {
    if BUILD_METADATA_REGEX.is_match(metadata) {
        Ok(())
    } else {
        Err(VersionError::InvalidBuildMetadata(metadata.to_string()).into())
    }
}

/// Recommends the same bump for every package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExplicitBump(pub BumpType);

impl BumpRecommender for ExplicitBump {
    fn recommend_bump(&self, _node: &super::graph::PackageNode) -> Result<BumpType> {
        Ok(self.0)
    }
}

/// Apply a bump to a version.
///
/// A prerelease bump of a prerelease version increments its trailing
/// numeric identifier (appending `.0` when there is none); of a release
/// version it bumps patch and starts `<preid>.0`.
pub fn bump_version(version: &Version, bump: BumpType, preid: &str) -> Result<Version> {
    let mut v = version.clone();
    v.build = BuildMetadata::EMPTY;

    match bump {
        BumpType::Major => {
            v.major += 1;
            v.minor = 0;
            v.patch = 0;
            v.pre = Prerelease::EMPTY;
        }
        BumpType::Minor => {
            v.minor += 1;
            v.patch = 0;
            v.pre = Prerelease::EMPTY;
        }
        BumpType::Patch => {
            v.patch += 1;
            v.pre = Prerelease::EMPTY;
        }
        BumpType::Prerelease => {
            let pre = if v.pre.is_empty() {
                v.patch += 1;
                format!("{}.0", preid)
            } else {
                let current = v.pre.as_str();
                match current.rsplit_once('.') {
                    Some((prefix, num)) if num.parse::<u64>().is_ok() => {
                        let n: u64 = num.parse().unwrap_or_default();
                        format!("{}.{}", prefix, n + 1)
                    }
                    _ => match current.parse::<u64>() {
                        Ok(n) => (n + 1).to_string(),
                        Err(_) => format!("{}.0", current),
                    },
                }
            };
            v.pre = Prerelease::new(&pre)
                .map_err(|e| VersionError::ParseFailed(pre.clone(), e.to_string()))?;
        }
        BumpType::None => {}
    }

    Ok(v)
}

/// Magnitude of the change between two versions
fn infer_bump(current: &Version, next: &Version) -> BumpType {
    if next.major != current.major {
        BumpType::Major
    } else if next.minor != current.minor {
        BumpType::Minor
    } else if next.patch != current.patch {
        BumpType::Patch
    } else if next.pre != current.pre {
        BumpType::Prerelease
    } else {
        BumpType::None
    }
}

/// Substitute `{name}` and `{version}` into a tag format
pub fn format_tag(format: &str, name: &str, version: &Version) -> String {
    format
        .replace("{name}", name)
        .replace("{version}", &version.to_string())
}

/// The planned version of one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedVersion {
    /// Package name
    pub name: String,
    /// Version before the release
    pub current: Version,
    /// Version after the release
    pub next: Version,
    /// Bump magnitude
    pub bump: BumpType,
}

impl PlannedVersion {
    /// Concrete specifier a workspace alias on this package resolves to
    pub fn resolve_alias(&self, alias: WorkspaceAlias) -> String {
        alias.resolve(&self.next)
    }
}

/// A specifier that will be rewritten on write-back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecifierRewrite {
    /// Package declaring the dependency
    pub package: String,
    /// Dependency name
    pub dependency: String,
    /// Collection holding the specifier
    pub collection: DependencyCollection,
    /// Specifier before
    pub from: String,
    /// Specifier after
    pub to: String,
}

/// An explicit specifier left untouched that no longer admits the new
/// version of its target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecifierDrift {
    /// Package declaring the dependency
    pub package: String,
    /// Dependency name
    pub dependency: String,
    /// Collection holding the specifier
    pub collection: DependencyCollection,
    /// Specifier as written
    pub specifier: String,
    /// Target's new version
    pub new_version: Version,
}

impl std::fmt::Display for SpecifierDrift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {}@{} does not admit {}",
            self.package, self.collection, self.dependency, self.specifier, self.new_version
        )
    }
}

/// New versions and specifier write-backs for one release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionPlan {
    /// Versioning mode
    pub mode: VersioningMode,
    /// Shared version in fixed mode
    pub fixed_version: Option<Version>,
    /// Planned packages in discovery order
    pub packages: Vec<PlannedVersion>,
    /// Specifiers to rewrite
    pub rewrites: Vec<SpecifierRewrite>,
    /// Explicit specifiers that drift from their target
    pub drifts: Vec<SpecifierDrift>,
}

impl VersionPlan {
    /// Planned version of a package
    pub fn get(&self, name: &str) -> Option<&PlannedVersion> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// New version of a package
    pub fn new_version(&self, name: &str) -> Option<&Version> {
        self.get(name).map(|p| &p.next)
    }

    /// Whether nothing is versioned
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Names of versioned packages in discovery order
    pub fn names(&self) -> Vec<String> {
        self.packages.iter().map(|p| p.name.clone()).collect()
    }

    /// Release tags: one shared tag in fixed mode, one per package otherwise
    pub fn tag_names(&self, tag_format: &str, independent_tag_format: &str) -> Vec<String> {
        match (self.mode, &self.fixed_version) {
            (VersioningMode::Fixed, Some(version)) => vec![format_tag(tag_format, "", version)],
            (VersioningMode::Fixed, None) => Vec::new(),
            (VersioningMode::Independent, _) => self
                .packages
                .iter()
                .map(|p| format_tag(independent_tag_format, &p.name, &p.next))
                .collect(),
        }
    }

    /// Manifests to write: versioned packages and dependents with rewritten
    /// specifiers, in discovery order
    pub fn apply(&self, graph: &PackageGraph) -> Vec<PackageManifest> {
        graph
            .nodes()
            .iter()
            .filter_map(|node| {
                let planned = self.get(node.name());
                let rewrites: Vec<&SpecifierRewrite> = self
                    .rewrites
                    .iter()
                    .filter(|r| r.package == node.name())
                    .collect();
                if planned.is_none() && rewrites.is_empty() {
                    return None;
                }

                let mut manifest = match planned {
                    Some(p) => node.manifest.with_version(p.next.clone()),
                    None => node.manifest.clone(),
                };
                for rewrite in rewrites {
                    manifest = manifest.with_specifier(rewrite.collection, &rewrite.dependency, &rewrite.to);
                }
                Some(manifest)
            })
            .collect()
    }
}

/// Computes next versions for affected packages
pub struct VersionPlanner<'a> {
    mode: VersioningMode,
    recommender: &'a dyn BumpRecommender,
    build_metadata: Option<String>,
    exact_version: Option<Version>,
    preid: String,
}

impl<'a> VersionPlanner<'a> {
    /// Create a planner
    pub fn new(mode: VersioningMode, recommender: &'a dyn BumpRecommender) -> Self {
        Self {
            mode,
            recommender,
            build_metadata: None,
            exact_version: None,
            preid: "alpha".to_string(),
        }
    }

    /// Append build metadata to every computed version
    pub fn with_build_metadata(mut self, metadata: Option<String>) -> Self {
        self.build_metadata = metadata;
        self
    }

    /// Use one exact version for every planned package
    pub fn with_exact_version(mut self, version: Option<Version>) -> Self {
        self.exact_version = version;
        self
    }

    /// Prerelease identifier
    pub fn with_preid(mut self, preid: impl Into<String>) -> Self {
        self.preid = preid.into();
        self
    }

    /// Plan versions for the affected packages
    #[instrument(skip_all, fields(mode = %self.mode, affected = affected.len()))]
    pub fn plan(&self, graph: &PackageGraph, affected: &AffectedPackages) -> Result<VersionPlan> {
        if let Some(metadata) = &self.build_metadata {
            validate_build_metadata(metadata)?;
        }

        let (fixed_version, packages) = match self.mode {
            VersioningMode::Fixed => self.plan_fixed(graph, affected)?,
            VersioningMode::Independent => (None, self.plan_independent(graph, affected)?),
        };

        for p in &packages {
            debug!(
                package = %p.name,
                from = %p.current,
                to = %p.next,
                bump = %p.bump,
                "version bump"
            );
        }

        let (rewrites, drifts) = write_back(graph, &packages);
        for drift in &drifts {
            warn!(drift = %drift, "specifier no longer satisfied by new version");
        }

        info!(
            count = packages.len(),
            rewrites = rewrites.len(),
            drifts = drifts.len(),
            "version plan computed"
        );
        Ok(VersionPlan {
            mode: self.mode,
            fixed_version,
            packages,
            rewrites,
            drifts,
        })
    }

    fn plan_fixed(
        &self,
        graph: &PackageGraph,
        affected: &AffectedPackages,
    ) -> Result<(Option<Version>, Vec<PlannedVersion>)> {
        if affected.is_empty() {
            return Ok((None, Vec::new()));
        }

        let next = match &self.exact_version {
            Some(exact) => self.finish(exact.clone())?,
            None => {
                let mut bump = BumpType::None;
                for name in affected.names() {
                    if let Some(node) = graph.get(&name) {
                        bump = bump.max(self.recommender.recommend_bump(node)?);
                    }
                }
                if !bump.is_bump() {
                    debug!("no package needs a bump");
                    return Ok((None, Vec::new()));
                }

                let Some(highest) = graph.nodes().iter().map(|n| n.version()).max() else {
                    return Ok((None, Vec::new()));
                };
                self.finish(bump_version(highest, bump, &self.preid)?)?
            }
        };

        let packages = graph
            .nodes()
            .iter()
            .map(|node| PlannedVersion {
                name: node.name().to_string(),
                current: node.version().clone(),
                next: next.clone(),
                bump: infer_bump(node.version(), &next),
            })
            .collect();
        Ok((Some(next), packages))
    }

    fn plan_independent(
        &self,
        graph: &PackageGraph,
        affected: &AffectedPackages,
    ) -> Result<Vec<PlannedVersion>> {
        let mut packages = Vec::new();

        for name in affected.names() {
            let Some(node) = graph.get(&name) else {
                continue;
            };

            let next = match &self.exact_version {
                Some(exact) => self.finish(exact.clone())?,
                None => {
                    let bump = self.recommender.recommend_bump(node)?;
                    if !bump.is_bump() {
                        debug!(package = %name, "no bump, excluded from version updates");
                        continue;
                    }
                    self.finish(bump_version(node.version(), bump, &self.preid)?)?
                }
            };

            packages.push(PlannedVersion {
                name,
                current: node.version().clone(),
                bump: infer_bump(node.version(), &next),
                next,
            });
        }

        Ok(packages)
    }

    /// Attach build metadata
    fn finish(&self, mut version: Version) -> Result<Version> {
        if let Some(metadata) = &self.build_metadata {
            version.build = BuildMetadata::new(metadata)
                .map_err(|_| VersionError::InvalidBuildMetadata(metadata.clone()))?;
        }
        Ok(version)
    }
}

/// Rewrites for workspace aliases on versioned targets, drift diagnostics
/// for explicit specifiers that no longer match
fn write_back(
    graph: &PackageGraph,
    packages: &[PlannedVersion],
) -> (Vec<SpecifierRewrite>, Vec<SpecifierDrift>) {
    let planned: HashMap<&str, &PlannedVersion> =
        packages.iter().map(|p| (p.name.as_str(), p)).collect();
    let mut rewrites = Vec::new();
    let mut drifts = Vec::new();

    for node in graph.nodes() {
        for edge in node.local_edges() {
            let Some(target) = edge.target.as_deref().and_then(|t| planned.get(t)) else {
                continue;
            };

            match &edge.resolved {
                ResolvedSpecifier::WorkspaceAlias(alias) => rewrites.push(SpecifierRewrite {
                    package: edge.source.clone(),
                    dependency: edge.name.clone(),
                    collection: edge.collection,
                    from: edge.raw.clone(),
                    to: target.resolve_alias(*alias),
                }),
                resolved @ (ResolvedSpecifier::Exact { .. } | ResolvedSpecifier::Range { .. }) => {
                    if resolved.matches(&target.next) == Some(false) {
                        drifts.push(SpecifierDrift {
                            package: edge.source.clone(),
                            dependency: edge.name.clone(),
                            collection: edge.collection,
                            specifier: edge.raw.clone(),
                            new_version: target.next.clone(),
                        });
                    }
                }
                ResolvedSpecifier::Directory(_) | ResolvedSpecifier::External => {}
            }
        }
    }

    (rewrites, drifts)
}

/// Version currently published under a dist-tag.
///
/// A failed query is `ENPMVIEW`; a registry answer without the tag is
/// `ENODISTTAG`.
pub async fn current_published_version(
    registry: &dyn Registry,
    name: &str,
    dist_tag: &str,
    registry_url: Option<&str>,
) -> Result<Version> {
    let tags = match registry.dist_tags(name, registry_url).await {
        Ok(tags) => tags,
        Err(GantryError::Registry(e @ RegistryError::QueryFailed { .. })) => return Err(e.into()),
        Err(e) => {
            return Err(RegistryError::QueryFailed {
                package: name.to_string(),
                message: e.to_string(),
            }
            .into())
        }
    };

    let raw = tags.get(dist_tag).ok_or_else(|| RegistryError::DistTagMissing {
        package: name.to_string(),
        tag: dist_tag.to_string(),
    })?;

    Version::parse(raw)
        .map_err(|e| VersionError::ParseFailed(raw.clone(), e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::PublishRequest;
    use crate::monorepo::changes::{AffectCause, AffectedPackage, Baseline, ChangeReason, ChangeSet};
    use crate::monorepo::graph::PackageNode;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::path::Path;

    struct MapBump(HashMap<&'static str, BumpType>);

    impl BumpRecommender for MapBump {
        fn recommend_bump(&self, node: &PackageNode) -> Result<BumpType> {
            Ok(self.0.get(node.name()).copied().unwrap_or(BumpType::None))
        }
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn create_graph() -> PackageGraph {
        PackageGraph::build(vec![
            PackageManifest::new("core", v("1.0.0"), "packages/core"),
            PackageManifest::new("utils", v("1.2.0"), "packages/utils")
                .with_dependency(DependencyCollection::Dependencies, "core", "workspace:^"),
            PackageManifest::new("app", v("0.5.0"), "packages/app")
                .with_dependency(DependencyCollection::Dependencies, "core", "1.0.0")
                .with_dependency(DependencyCollection::DevDependencies, "utils", "workspace:*"),
        ])
        .unwrap()
    }

    fn affected(names: &[&str]) -> AffectedPackages {
        AffectedPackages {
            change_set: ChangeSet {
                changed: Vec::new(),
                baseline: Baseline::LastTag("v1.2.0".to_string()),
                head_released: false,
            },
            affected: names
                .iter()
                .map(|n| AffectedPackage {
                    name: n.to_string(),
                    cause: AffectCause::Changed(ChangeReason::Forced),
                })
                .collect(),
        }
    }

    #[test]
    fn test_bump_version() {
        assert_eq!(bump_version(&v("1.2.3"), BumpType::Major, "alpha").unwrap(), v("2.0.0"));
        assert_eq!(bump_version(&v("1.2.3"), BumpType::Minor, "alpha").unwrap(), v("1.3.0"));
        assert_eq!(bump_version(&v("1.2.3"), BumpType::Patch, "alpha").unwrap(), v("1.2.4"));
        assert_eq!(
            bump_version(&v("1.2.3"), BumpType::Prerelease, "beta").unwrap(),
            v("1.2.4-beta.0")
        );
        assert_eq!(
            bump_version(&v("1.2.4-beta.0"), BumpType::Prerelease, "beta").unwrap(),
            v("1.2.4-beta.1")
        );
        assert_eq!(
            bump_version(&v("1.2.4-rc"), BumpType::Prerelease, "alpha").unwrap(),
            v("1.2.4-rc.0")
        );
        assert_eq!(bump_version(&v("1.2.3+build"), BumpType::None, "alpha").unwrap(), v("1.2.3"));
    }

    #[test]
    fn test_build_metadata_validation() {
        assert!(validate_build_metadata("exp.sha.5114f85").is_ok());
        assert!(validate_build_metadata("001").is_ok());
        let err = validate_build_metadata("bad..meta").unwrap_err();
        assert_eq!(err.code(), "EVERSION");
        assert!(validate_build_metadata("").is_err());
        assert!(validate_build_metadata("a+b").is_err());
    }

    #[test]
    fn test_fixed_mode_applies_max_bump_everywhere() {
        let graph = create_graph();
        let recommender = MapBump(HashMap::from([
            ("core", BumpType::Patch),
            ("utils", BumpType::Minor),
        ]));
        let plan = VersionPlanner::new(VersioningMode::Fixed, &recommender)
            .plan(&graph, &affected(&["core", "utils"]))
            .unwrap();

        assert_eq!(plan.fixed_version, Some(v("1.3.0")));
        assert_eq!(plan.packages.len(), 3);
        assert!(plan.packages.iter().all(|p| p.next == v("1.3.0")));
        assert_eq!(plan.tag_names("v{version}", "{name}@{version}"), vec!["v1.3.0"]);
    }

    #[test]
    fn test_independent_mode_leaves_unaffected_alone() {
        let graph = create_graph();
        let recommender = MapBump(HashMap::from([
            ("core", BumpType::Patch),
            ("utils", BumpType::None),
        ]));
        let plan = VersionPlanner::new(VersioningMode::Independent, &recommender)
            .plan(&graph, &affected(&["core", "utils"]))
            .unwrap();

        assert_eq!(plan.names(), vec!["core"]);
        assert_eq!(plan.new_version("core"), Some(&v("1.0.1")));
        assert!(plan.get("app").is_none());
        assert_eq!(
            plan.tag_names("v{version}", "{name}@{version}"),
            vec!["core@1.0.1"]
        );
    }

    #[test]
    fn test_exact_version_and_build_metadata() {
        let graph = create_graph();
        let plan = VersionPlanner::new(VersioningMode::Independent, &ExplicitBump(BumpType::Patch))
            .with_exact_version(Some(v("3.0.0")))
            .with_build_metadata(Some("exp.sha.5114f85".to_string()))
            .plan(&graph, &affected(&["core"]))
            .unwrap();

        let core = plan.get("core").unwrap();
        assert_eq!(core.next.to_string(), "3.0.0+exp.sha.5114f85");
        assert_eq!(core.bump, BumpType::Major);
    }

    #[test]
    fn test_invalid_build_metadata_rejected_before_planning() {
        let graph = create_graph();
        let result = VersionPlanner::new(VersioningMode::Fixed, &ExplicitBump(BumpType::Patch))
            .with_build_metadata(Some("no spaces".to_string()))
            .plan(&graph, &affected(&["core"]));
        assert!(matches!(
            result,
            Err(GantryError::Version(VersionError::InvalidBuildMetadata(_)))
        ));
    }

    #[test]
    fn test_alias_write_back() {
        let graph = PackageGraph::build(vec![
            PackageManifest::new("a", v("2.0.0"), "packages/a"),
            PackageManifest::new("b", v("1.0.0"), "packages/b")
                .with_dependency(DependencyCollection::Dependencies, "a", "workspace:*")
                .with_dependency(DependencyCollection::DevDependencies, "a", "workspace:^")
                .with_dependency(DependencyCollection::PeerDependencies, "a", "workspace:~")
                .with_dependency(DependencyCollection::OptionalDependencies, "a", "file:../a"),
        ])
        .unwrap();
        let plan = VersionPlanner::new(VersioningMode::Independent, &ExplicitBump(BumpType::Minor))
            .plan(&graph, &affected(&["a"]))
            .unwrap();

        let rewritten: Vec<(&str, &str)> = plan
            .rewrites
            .iter()
            .map(|r| (r.from.as_str(), r.to.as_str()))
            .collect();
        assert_eq!(
            rewritten,
            vec![
                ("workspace:*", "2.1.0"),
                ("workspace:^", "^2.1.0"),
                ("workspace:~", "~2.1.0"),
            ]
        );

        let manifests = plan.apply(&graph);
        assert_eq!(manifests.len(), 2);
        let b = &manifests[1];
        assert_eq!(b.version, v("1.0.0"));
        assert_eq!(b.specifier(DependencyCollection::Dependencies, "a"), Some("2.1.0"));
        assert_eq!(
            b.specifier(DependencyCollection::OptionalDependencies, "a"),
            Some("file:../a")
        );
    }

    #[test]
    fn test_explicit_specifier_drift_flagged_not_rewritten() {
        let graph = create_graph();
        let plan = VersionPlanner::new(VersioningMode::Independent, &ExplicitBump(BumpType::Major))
            .plan(&graph, &affected(&["core", "utils", "app"]))
            .unwrap();

        assert_eq!(plan.drifts.len(), 1);
        assert_eq!(plan.drifts[0].package, "app");
        assert_eq!(plan.drifts[0].specifier, "1.0.0");

        let app = plan.apply(&graph).into_iter().find(|m| m.name == "app").unwrap();
        assert_eq!(app.specifier(DependencyCollection::Dependencies, "core"), Some("1.0.0"));
        assert_eq!(
            app.specifier(DependencyCollection::DevDependencies, "utils"),
            Some("2.0.0")
        );
    }

    struct FakeRegistry {
        tags: Option<BTreeMap<String, String>>,
    }

    #[async_trait]
    impl Registry for FakeRegistry {
        async fn dist_tags(
            &self,
            package: &str,
            _registry: Option<&str>,
        ) -> Result<BTreeMap<String, String>> {
            self.tags.clone().ok_or_else(|| {
                RegistryError::Network {
                    package: package.to_string(),
                    message: "connection reset".to_string(),
                }
                .into()
            })
        }

        async fn publish(
            &self,
            _manifest: &PackageManifest,
            _directory: &Path,
            _request: &PublishRequest,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_current_published_version() {
        let registry = FakeRegistry {
            tags: Some(BTreeMap::from([("latest".to_string(), "1.4.0".to_string())])),
        };
        let version = current_published_version(&registry, "core", "latest", None)
            .await
            .unwrap();
        assert_eq!(version, v("1.4.0"));

        let missing = current_published_version(&registry, "core", "next", None)
            .await
            .unwrap_err();
        assert_eq!(missing.code(), "ENODISTTAG");

        let failing = FakeRegistry { tags: None };
        let failed = current_published_version(&failing, "core", "latest", None)
            .await
            .unwrap_err();
        assert_eq!(failed.code(), "ENPMVIEW");
    }
}

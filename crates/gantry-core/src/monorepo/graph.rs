//! Dependency graph for workspace packages

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::Path;

use semver::Version;
use tracing::{debug, info, warn};

use crate::error::{GraphError, Result};

use super::manifest::{DependencyCollection, PackageManifest};
use super::specifier::ResolvedSpecifier;

/// A dependency declared by a workspace package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    /// Declaring package
    pub source: String,
    /// Workspace package satisfying the dependency, `None` if external
    pub target: Option<String>,
    /// Dependency name as written in the manifest
    pub name: String,
    /// Collection the dependency is declared in
    pub collection: DependencyCollection,
    /// Specifier as written
    pub raw: String,
    /// Classified specifier
    pub resolved: ResolvedSpecifier,
    /// Whether the target's current version satisfies the specifier
    pub target_version_matches: Option<bool>,
}

impl DependencyEdge {
    /// Whether the edge points at a workspace package
    pub fn is_local(&self) -> bool {
        self.target.is_some()
    }
}

impl fmt::Display for DependencyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{} -> {}@{}", self.source, target, self.raw),
            None => write!(f, "{} -> npm:{}", self.source, self.name),
        }
    }
}

/// A workspace package in the graph
#[derive(Debug, Clone)]
pub struct PackageNode {
    /// The loaded manifest
    pub manifest: PackageManifest,
    /// Position in location order, the tie-break for every ordering
    pub index: usize,
    /// Every declared dependency, local and external
    pub edges: Vec<DependencyEdge>,
    /// Distinct local dependency names, in declaration order
    pub local_dependencies: Vec<String>,
    /// Local packages depending on this one, in discovery order
    pub dependents: Vec<String>,
}

impl PackageNode {
    /// Package name
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// Current version
    pub fn version(&self) -> &Version {
        &self.manifest.version
    }

    /// Workspace-relative location
    pub fn location(&self) -> &Path {
        &self.manifest.location
    }

    /// Whether the package is excluded from publishing
    pub fn is_private(&self) -> bool {
        self.manifest.private
    }

    /// Local edges only
    pub fn local_edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.edges.iter().filter(|e| e.is_local())
    }
}

/// Dependency graph over the workspace packages
#[derive(Debug, Clone)]
pub struct PackageGraph {
    /// Nodes in discovery order
    nodes: Vec<PackageNode>,
    /// Name to position in `nodes`
    index: HashMap<String, usize>,
    /// Topological order as node positions
    order: Vec<usize>,
    /// Cycles found during build
    cycles: Vec<Vec<String>>,
}

impl PackageGraph {
    /// Build the graph from loaded manifests.
    ///
    /// Nodes are ordered by location. Duplicate or empty names are rejected;
    /// cycles are recorded and logged but do not fail the build.
    pub fn build(mut manifests: Vec<PackageManifest>) -> Result<Self> {
        manifests.sort_by(|a, b| a.location.cmp(&b.location));

        let mut index: HashMap<String, usize> = HashMap::with_capacity(manifests.len());
        for (i, manifest) in manifests.iter().enumerate() {
            if manifest.name.trim().is_empty() {
                return Err(GraphError::EmptyName(manifest.location.clone()).into());
            }
            if let Some(&first) = index.get(&manifest.name) {
                return Err(GraphError::DuplicatePackage {
                    name: manifest.name.clone(),
                    first: manifests[first].location.clone(),
                    second: manifest.location.clone(),
                }
                .into());
            }
            index.insert(manifest.name.clone(), i);
        }

        let versions: HashMap<&str, &Version> = manifests
            .iter()
            .map(|m| (m.name.as_str(), &m.version))
            .collect();

        let mut nodes: Vec<PackageNode> = manifests
            .iter()
            .enumerate()
            .map(|(i, manifest)| {
                let edges = resolve_edges(manifest, &versions);
                let mut local_dependencies: Vec<String> = Vec::new();
                for edge in &edges {
                    if let Some(target) = &edge.target {
                        if !local_dependencies.contains(target) {
                            local_dependencies.push(target.clone());
                        }
                    }
                }
                PackageNode {
                    manifest: manifest.clone(),
                    index: i,
                    edges,
                    local_dependencies,
                    dependents: Vec::new(),
                }
            })
            .collect();

        // Reverse edges; iterating sources in order keeps dependents sorted
        for source in 0..nodes.len() {
            let source_name = nodes[source].manifest.name.clone();
            let targets: Vec<usize> = nodes[source]
                .local_dependencies
                .iter()
                .filter_map(|dep| index.get(dep).copied())
                .collect();
            for target in targets {
                nodes[target].dependents.push(source_name.clone());
            }
        }

        let mut graph = Self {
            nodes,
            index,
            order: Vec::new(),
            cycles: Vec::new(),
        };
        graph.cycles = graph.find_cycles();
        graph.order = graph.kahn_order();

        if !graph.cycles.is_empty() {
            for cycle in &graph.cycles {
                warn!(cycle = %cycle.join(" -> "), "dependency cycle detected");
            }
        }

        info!(
            packages = graph.nodes.len(),
            cycles = graph.cycles.len(),
            "package graph built"
        );
        Ok(graph)
    }

    /// Kahn's algorithm over strongly connected components. Components are
    /// released lowest discovery index first, so a cycle is placed as a
    /// whole once everything it depends on is placed.
    fn kahn_order(&self) -> Vec<usize> {
        let n = self.nodes.len();
        let components = self.strongly_connected_components();

        let mut component_of = vec![0; n];
        for (c, members) in components.iter().enumerate() {
            for &m in members {
                component_of[m] = c;
            }
        }

        let mut waiting: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); components.len()];
        let mut releases: Vec<Vec<usize>> = vec![Vec::new(); components.len()];
        for node in 0..n {
            let c = component_of[node];
            for dep in self.dependency_indices(node) {
                let d = component_of[dep];
                if d != c && waiting[c].insert(d) {
                    releases[d].push(c);
                }
            }
        }

        // Keyed by lowest member index; members are sorted
        let mut ready: BTreeSet<(usize, usize)> = (0..components.len())
            .filter(|&c| waiting[c].is_empty())
            .map(|c| (components[c][0], c))
            .collect();
        let mut order = Vec::with_capacity(n);

        while let Some((_, c)) = ready.pop_first() {
            order.extend(self.order_within(&components[c]));
            for &next in &releases[c] {
                waiting[next].remove(&c);
                if waiting[next].is_empty() {
                    ready.insert((components[next][0], next));
                }
            }
        }

        order
    }

    /// Order the members of one component. Inside a cycle the lowest-index
    /// unplaced member is released whenever nothing else is ready.
    fn order_within(&self, members: &[usize]) -> Vec<usize> {
        if members.len() == 1 {
            return members.to_vec();
        }

        let inside: HashSet<usize> = members.iter().copied().collect();
        let mut in_degree: HashMap<usize, usize> = members
            .iter()
            .map(|&m| {
                let count = self
                    .dependency_indices(m)
                    .filter(|d| inside.contains(d))
                    .count();
                (m, count)
            })
            .collect();
        let mut ready: BTreeSet<usize> = members
            .iter()
            .copied()
            .filter(|m| in_degree[m] == 0)
            .collect();
        let mut placed: HashSet<usize> = HashSet::with_capacity(members.len());
        let mut order = Vec::with_capacity(members.len());

        while order.len() < members.len() {
            let next = match ready.pop_first() {
                Some(i) => i,
                None => {
                    let stuck = members.iter().copied().find(|m| !placed.contains(m));
                    let Some(stuck) = stuck else {
                        break;
                    };
                    debug!(package = %self.nodes[stuck].name(), "breaking cycle in topological order");
                    stuck
                }
            };

            placed.insert(next);
            order.push(next);

            for dependent in &self.nodes[next].dependents {
                let Some(&d) = self.index.get(dependent) else {
                    continue;
                };
                if !inside.contains(&d) || placed.contains(&d) {
                    continue;
                }
                if let Some(degree) = in_degree.get_mut(&d) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.insert(d);
                    }
                }
            }
        }

        order
    }

    /// Discovery indices of a node's local dependencies
    fn dependency_indices(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.nodes[node]
            .local_dependencies
            .iter()
            .filter_map(|dep| self.index.get(dep).copied())
    }

    /// Tarjan's algorithm over local edges. Each component's members are
    /// sorted by discovery index.
    fn strongly_connected_components(&self) -> Vec<Vec<usize>> {
        struct Tarjan<'a> {
            graph: &'a PackageGraph,
            counter: usize,
            visit_index: Vec<Option<usize>>,
            low_link: Vec<usize>,
            stack: Vec<usize>,
            on_stack: Vec<bool>,
            components: Vec<Vec<usize>>,
        }

        impl Tarjan<'_> {
            fn visit(&mut self, node: usize) {
                self.visit_index[node] = Some(self.counter);
                self.low_link[node] = self.counter;
                self.counter += 1;
                self.stack.push(node);
                self.on_stack[node] = true;

                let deps: Vec<usize> = self.graph.dependency_indices(node).collect();
                for dep in deps {
                    match self.visit_index[dep] {
                        None => {
                            self.visit(dep);
                            self.low_link[node] = self.low_link[node].min(self.low_link[dep]);
                        }
                        Some(seen) if self.on_stack[dep] => {
                            self.low_link[node] = self.low_link[node].min(seen);
                        }
                        Some(_) => {}
                    }
                }

                if Some(self.low_link[node]) == self.visit_index[node] {
                    let mut component = Vec::new();
                    while let Some(member) = self.stack.pop() {
                        self.on_stack[member] = false;
                        component.push(member);
                        if member == node {
                            break;
                        }
                    }
                    component.sort_unstable();
                    self.components.push(component);
                }
            }
        }

        let n = self.nodes.len();
        let mut tarjan = Tarjan {
            graph: self,
            counter: 0,
            visit_index: vec![None; n],
            low_link: vec![0; n],
            stack: Vec::new(),
            on_stack: vec![false; n],
            components: Vec::new(),
        };
        for node in 0..n {
            if tarjan.visit_index[node].is_none() {
                tarjan.visit(node);
            }
        }
        tarjan.components
    }

    /// DFS over local edges in discovery order; each back-edge yields the
    /// stack slice from its target. Cycles are de-duplicated by member set.
    fn find_cycles(&self) -> Vec<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        fn dfs(
            graph: &PackageGraph,
            node: usize,
            colors: &mut [Color],
            stack: &mut Vec<usize>,
            found: &mut Vec<Vec<String>>,
            seen: &mut HashSet<BTreeSet<String>>,
        ) {
            colors[node] = Color::Gray;
            stack.push(node);

            let mut deps: Vec<usize> = graph.nodes[node]
                .local_dependencies
                .iter()
                .filter_map(|d| graph.index.get(d).copied())
                .collect();
            deps.sort_unstable();

            for dep in deps {
                match colors[dep] {
                    Color::Gray => {
                        if let Some(pos) = stack.iter().position(|&s| s == dep) {
                            let cycle: Vec<String> = stack[pos..]
                                .iter()
                                .map(|&i| graph.nodes[i].name().to_string())
                                .collect();
                            let members: BTreeSet<String> = cycle.iter().cloned().collect();
                            if seen.insert(members) {
                                found.push(cycle);
                            }
                        }
                    }
                    Color::White => dfs(graph, dep, colors, stack, found, seen),
                    Color::Black => {}
                }
            }

            stack.pop();
            colors[node] = Color::Black;
        }

        let mut colors = vec![Color::White; self.nodes.len()];
        let mut stack = Vec::new();
        let mut found = Vec::new();
        let mut seen = HashSet::new();

        for i in 0..self.nodes.len() {
            if colors[i] == Color::White {
                dfs(self, i, &mut colors, &mut stack, &mut found, &mut seen);
            }
        }

        found
    }

    /// Get a package by name
    pub fn get(&self, name: &str) -> Option<&PackageNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Whether a package is part of the workspace
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All packages in discovery order
    pub fn nodes(&self) -> &[PackageNode] {
        &self.nodes
    }

    /// Number of packages
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the workspace has no packages
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Discovery index of a package
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Packages directly depending on `name`
    pub fn dependents(&self, name: &str) -> &[String] {
        self.get(name).map_or(&[], |n| n.dependents.as_slice())
    }

    /// Local packages `name` depends on directly
    pub fn local_dependencies(&self, name: &str) -> &[String] {
        self.get(name).map_or(&[], |n| n.local_dependencies.as_slice())
    }

    /// Packages with dependencies before dependents; cycles are broken
    /// by discovery order
    pub fn topological_order(&self) -> Vec<&PackageNode> {
        self.order.iter().map(|&i| &self.nodes[i]).collect()
    }

    /// Cycles detected at build time
    pub fn cycles(&self) -> &[Vec<String>] {
        &self.cycles
    }

    /// Whether the graph contains cycles
    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// An `ECYCLE` error describing every cycle, if any
    pub fn cycle_diagnostic(&self) -> Option<GraphError> {
        if self.cycles.is_empty() {
            None
        } else {
            Some(GraphError::Cycle {
                cycles: self.cycles.clone(),
            })
        }
    }

    /// Local edges whose specifier is not satisfied by the target's current
    /// version
    pub fn drifted_edges(&self) -> Vec<&DependencyEdge> {
        self.nodes
            .iter()
            .flat_map(|n| n.edges.iter())
            .filter(|e| e.target_version_matches == Some(false))
            .collect()
    }

    /// For each member of `subset`, the other members it transitively
    /// depends on that come before it in topological order.
    ///
    /// Paths may pass through packages outside the subset. Predecessors are
    /// listed in topological order.
    pub fn ordering_constraints(&self, subset: &[String]) -> BTreeMap<String, Vec<String>> {
        let position: HashMap<usize, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(pos, &node)| (node, pos))
            .collect();
        let members: HashSet<usize> = subset
            .iter()
            .filter_map(|name| self.index.get(name).copied())
            .collect();

        let mut constraints = BTreeMap::new();
        for name in subset {
            let Some(&start) = self.index.get(name) else {
                continue;
            };
            let start_pos = position[&start];

            let mut reached: HashSet<usize> = HashSet::new();
            let mut queue: VecDeque<usize> = VecDeque::from([start]);
            while let Some(current) = queue.pop_front() {
                for dep in &self.nodes[current].local_dependencies {
                    if let Some(&d) = self.index.get(dep) {
                        if d != start && reached.insert(d) {
                            queue.push_back(d);
                        }
                    }
                }
            }

            let mut predecessors: Vec<usize> = reached
                .into_iter()
                .filter(|d| members.contains(d) && position[d] < start_pos)
                .collect();
            predecessors.sort_by_key(|d| position[d]);

            constraints.insert(
                name.clone(),
                predecessors
                    .into_iter()
                    .map(|d| self.nodes[d].name().to_string())
                    .collect(),
            );
        }

        constraints
    }
}

fn resolve_edges(
    manifest: &PackageManifest,
    versions: &HashMap<&str, &Version>,
) -> Vec<DependencyEdge> {
    manifest
        .dependency_entries()
        .map(|(collection, name, raw)| {
            let (target, resolved, matches) = match versions.get(name) {
                Some(&target_version) => {
                    let resolved = ResolvedSpecifier::classify(raw, &manifest.location);
                    let matches = resolved.matches(target_version);
                    if resolved == ResolvedSpecifier::External {
                        debug!(
                            package = %manifest.name,
                            dependency = %name,
                            specifier = %raw,
                            "local name with non-semver specifier treated as external"
                        );
                        (None, resolved, None)
                    } else {
                        (Some(name.to_string()), resolved, matches)
                    }
                }
                None => (None, ResolvedSpecifier::External, None),
            };

            DependencyEdge {
                source: manifest.name.clone(),
                target,
                name: name.to_string(),
                collection,
                raw: raw.to_string(),
                resolved,
                target_version_matches: matches,
            }
        })
        .collect()
}

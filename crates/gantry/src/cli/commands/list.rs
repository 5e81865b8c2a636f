//! List command

use clap::Args;
use console::style;
use gantry_core::monorepo::{PackageGraph, PackageNode};
use tracing::info;

use crate::cli::context::WorkspaceContext;
use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// List workspace packages
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Include private packages
    #[arg(short, long)]
    pub all: bool,

    /// Order packages so dependencies come first
    #[arg(long)]
    pub toposort: bool,
}

impl ListCommand {
    /// Execute the list command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(all = self.all, toposort = self.toposort, "executing list command");
        let ctx = WorkspaceContext::load(cli)?;
        let workspace = ctx.discover()?;
        let packages = self.select(&workspace.graph);

        match cli.format {
            OutputFormat::Json => {
                let value = serde_json::json!({
                    "root": ctx.root,
                    "config": ctx.config_path,
                    "packages": packages.iter().map(|node| serde_json::json!({
                        "name": node.name(),
                        "version": node.version().to_string(),
                        "location": node.location(),
                        "private": node.is_private(),
                    })).collect::<Vec<_>>(),
                    "cycles": workspace.graph.cycles(),
                    "drift": drift_lines(&workspace.graph),
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
            OutputFormat::Text => {
                print_packages(&packages);
                if !cli.quiet {
                    print_diagnostics(&workspace.graph);
                    output::success(&format!("found {} package(s)", packages.len()));
                }
            }
        }
        Ok(())
    }

    fn select<'g>(&self, graph: &'g PackageGraph) -> Vec<&'g PackageNode> {
        let nodes: Vec<&PackageNode> = if self.toposort {
            graph.topological_order()
        } else {
            graph.nodes().iter().collect()
        };
        nodes
            .into_iter()
            .filter(|node| self.all || !node.is_private())
            .collect()
    }
}

fn print_packages(packages: &[&PackageNode]) {
    let width = packages.iter().map(|n| n.name().len()).max().unwrap_or(0);
    for node in packages {
        let private = if node.is_private() {
            style(" (PRIVATE)").red().to_string()
        } else {
            String::new()
        };
        println!(
            "{:width$}  {}  {}{}",
            node.name(),
            output::version_style().apply_to(format!("v{}", node.version())),
            output::path_style().apply_to(node.location().display()),
            private,
            width = width
        );
    }
}

fn print_diagnostics(graph: &PackageGraph) {
    if graph.has_cycles() {
        println!();
        println!("{}", output::header("Dependency cycles:"));
        for cycle in graph.cycles() {
            println!("{}", output::key_value("cycle", &cycle.join(" -> ")));
        }
    }

    let drift = drift_lines(graph);
    if !drift.is_empty() {
        println!();
        for line in &drift {
            output::warning(line);
        }
    }
}

/// Local dependencies whose range does not admit the target's version
fn drift_lines(graph: &PackageGraph) -> Vec<String> {
    graph
        .drifted_edges()
        .into_iter()
        .map(|edge| {
            let target = edge
                .target
                .as_deref()
                .and_then(|t| graph.get(t))
                .map(|n| n.version().to_string())
                .unwrap_or_default();
            format!(
                "{} {} {}@{} does not admit local version {}",
                edge.source, edge.collection, edge.name, edge.raw, target
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::monorepo::{DependencyCollection, PackageManifest};
    use semver::Version;

    fn graph() -> PackageGraph {
        let pkg = |name: &str, major: u64| {
            PackageManifest::new(name, Version::new(major, 0, 0), format!("packages/{}", name))
        };
        PackageGraph::build(vec![
            pkg("app", 1).with_dependency(DependencyCollection::Dependencies, "lib", "^1.0.0"),
            pkg("internal", 1).with_private(true),
            pkg("lib", 2),
        ])
        .unwrap()
    }

    #[test]
    fn test_private_packages_hidden_by_default() {
        let graph = graph();

        let list = ListCommand { all: false, toposort: false };
        let names: Vec<&str> = list.select(&graph).iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["app", "lib"]);

        let list = ListCommand { all: true, toposort: true };
        let names: Vec<&str> = list.select(&graph).iter().map(|n| n.name()).collect();
        assert_eq!(names.len(), 3);
        let lib = names.iter().position(|n| *n == "lib").unwrap();
        let app = names.iter().position(|n| *n == "app").unwrap();
        assert!(lib < app);
    }

    #[test]
    fn test_drift_lines() {
        let lines = drift_lines(&graph());
        assert_eq!(
            lines,
            vec!["app dependencies lib@^1.0.0 does not admit local version 2.0.0"]
        );
    }
}

//! Output formatting utilities

use console::{style, Style};
use gantry_core::monorepo::VersionPlan;
use gantry_release::{PublishStatus, ReleaseError, ReleaseSummary};

use crate::exit_codes;

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    println!("{} {}", style("!").yellow().bold(), message);
}

/// Print an info message
pub fn info(message: &str) {
    println!("{} {}", style("→").blue(), message);
}

/// Create a styled header
pub fn header(text: &str) -> String {
    style(text).bold().to_string()
}

/// Create a styled key-value line
pub fn key_value(key: &str, value: &str) -> String {
    format!("  {}: {}", style(key).dim(), value)
}

/// Style for version numbers
pub fn version_style() -> Style {
    Style::new().green().bold()
}

/// Style for tags
pub fn tag_style() -> Style {
    Style::new().yellow()
}

/// Style for paths
pub fn path_style() -> Style {
    Style::new().cyan()
}

/// Print a version plan as `name: current => next`
pub fn print_plan(plan: &VersionPlan) {
    println!("{}", header("Changes:"));
    let width = plan.packages.iter().map(|p| p.name.len()).max().unwrap_or(0);
    for planned in &plan.packages {
        println!(
            " - {:width$}: {} => {}",
            planned.name,
            planned.current,
            version_style().apply_to(&planned.next),
            width = width
        );
    }

    if !plan.rewrites.is_empty() {
        println!();
        println!("{}", header("Dependency updates:"));
        for rewrite in &plan.rewrites {
            println!(
                " - {} {}: {} => {}",
                rewrite.package, rewrite.dependency, rewrite.from, rewrite.to
            );
        }
    }

    for drift in &plan.drifts {
        warning(&format!("{} (left unchanged)", drift));
    }
    println!();
}

/// Print what a finished release did
pub fn print_summary(summary: &ReleaseSummary) {
    success(&format!(
        "Released {} package(s) in {}",
        summary.plan.packages.len(),
        style(&summary.commit).dim()
    ));
    for tag in &summary.tags {
        println!("  tag {}", tag_style().apply_to(tag));
    }
    for (name, status) in &summary.published {
        let version = summary
            .plan
            .new_version(name)
            .map(ToString::to_string)
            .unwrap_or_default();
        match status {
            PublishStatus::Published => println!(
                "  published {}@{}",
                name,
                version_style().apply_to(version)
            ),
            PublishStatus::AlreadyPublished => println!(
                "  {}@{} {}",
                name,
                version,
                style("was already published").dim()
            ),
        }
    }
}

/// Print a command failure with its diagnostic code
pub fn report_error(err: &anyhow::Error) {
    if let Some(report) = err.downcast_ref::<ReleaseError>().and_then(ReleaseError::partial) {
        error(&format!("release incomplete [{}]", exit_codes::diagnostic_code(err).unwrap_or("EPARTIAL")));
        eprint!("{}", report);
        return;
    }

    match exit_codes::diagnostic_code(err) {
        Some(code) => error(&format!("{} [{}]", err, style(code).bold())),
        None => error(&format!("{:#}", err)),
    }
}

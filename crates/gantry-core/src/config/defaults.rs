//! Default configuration values

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "gantry.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "gantry.yaml";

/// Get list of config file names to search for, in priority order
pub fn config_file_names() -> Vec<&'static str> {
    vec![DEFAULT_CONFIG_TOML, DEFAULT_CONFIG_YAML, "gantry.yml"]
}

/// Environment variable npm sets to the lifecycle event being run
pub const LIFECYCLE_EVENT_ENV: &str = "npm_lifecycle_event";

/// Default configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# gantry configuration

packages = ["packages/*"]

[versioning]
mode = "fixed"
tag_format = "v{version}"
independent_tag_format = "{name}@{version}"
preid = "alpha"
dist_tag = "latest"

[changes]
ignore_changes = ["*.md", "**/__tests__/**"]
only_explicit_updates = false

[git]
remote = "origin"
allow_branches = ["main"]
require_clean = true
check_upstream = true
push = true
commit_message = "chore(release): publish {version}"

[changelog]
enabled = true
file = "CHANGELOG.md"
header = "Change Log"
root_changelog = true

[publish]
retries = 2
retry_delay_ms = 1000

[release]
reject_cycles = false
sync_lockfile = false
"#;

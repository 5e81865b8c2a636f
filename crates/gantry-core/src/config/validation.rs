//! Configuration validation

use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::monorepo::versioning::validate_build_metadata;

use super::types::Config;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_packages(config)?;
    validate_versioning(config)?;
    validate_changes(config)?;
    validate_git(config)?;
    validate_publish(config)?;
    validate_release(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> crate::error::GantryError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
    .into()
}

fn validate_packages(config: &Config) -> Result<()> {
    if config.packages.patterns().is_empty() {
        return Err(invalid("packages", "at least one package glob is required"));
    }
    for (i, pattern) in config.packages.patterns().iter().enumerate() {
        if let Err(e) = glob::Pattern::new(pattern) {
            return Err(invalid(&format!("packages[{}]", i), e.to_string()));
        }
    }
    Ok(())
}

fn validate_versioning(config: &Config) -> Result<()> {
    if !config.versioning.tag_format.contains("{version}") {
        return Err(invalid(
            "versioning.tag_format",
            "must contain {version} placeholder",
        ));
    }

    let independent = &config.versioning.independent_tag_format;
    if !independent.contains("{version}") || !independent.contains("{name}") {
        return Err(invalid(
            "versioning.independent_tag_format",
            "must contain {name} and {version} placeholders",
        ));
    }

    if let Some(meta) = &config.versioning.build_metadata {
        validate_build_metadata(meta)?;
    }

    if config.versioning.dist_tag.trim().is_empty() {
        return Err(invalid("versioning.dist_tag", "dist-tag cannot be empty"));
    }

    Ok(())
}

fn validate_changes(config: &Config) -> Result<()> {
    for (i, pattern) in config.changes.ignore_changes.iter().enumerate() {
        if let Err(e) = globset::Glob::new(pattern) {
            return Err(invalid(&format!("changes.ignore_changes[{}]", i), e.to_string()));
        }
    }
    Ok(())
}

fn validate_git(config: &Config) -> Result<()> {
    if config.git.remote.is_empty() {
        return Err(invalid("git.remote", "remote cannot be empty"));
    }

    if config.git.commit_message.trim().is_empty() {
        return Err(invalid("git.commit_message", "commit message cannot be empty"));
    }

    Ok(())
}

fn validate_publish(config: &Config) -> Result<()> {
    if let Some(registry) = &config.publish.registry {
        if url::Url::parse(registry).is_err() {
            return Err(invalid("publish.registry", format!("'{}' is not a valid URL", registry)));
        }
    }
    Ok(())
}

fn validate_release(config: &Config) -> Result<()> {
    if config.release.concurrency == 0 {
        return Err(invalid("release.concurrency", "must be at least 1"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_tag_format() {
        let mut config = Config::default();
        config.versioning.tag_format = "release".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_build_metadata() {
        let mut config = Config::default();
        config.versioning.build_metadata = Some("bad meta!".to_string());
        assert!(validate_config(&config).is_err());

        config.versioning.build_metadata = Some("001.sha-5114f85".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_registry() {
        let mut config = Config::default();
        config.publish.registry = Some("not a url".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_concurrency() {
        let mut config = Config::default();
        config.release.concurrency = 0;
        let err = validate_config(&config).unwrap_err();
        assert_eq!(err.code(), "ECONFIG");
    }
}

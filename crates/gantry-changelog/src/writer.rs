//! Changelog file maintenance

use std::path::Path;

use gantry_core::error::{ChangelogError, Result};
use tracing::debug;

const GUIDELINES: &str = "All notable changes to this project will be documented in this file.\n\
See [Conventional Commits](https://conventionalcommits.org) for commit guidelines.";

/// Prepends entries to changelog files, keeping a fixed header on top
#[derive(Debug, Clone)]
pub struct ChangelogWriter {
    title: String,
}

impl ChangelogWriter {
    /// Writer whose files start with `# {title}`
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    /// Header block written at the top of every changelog
    pub fn header(&self) -> String {
        format!("# {}\n\n{}\n\n", self.title, GUIDELINES)
    }

    /// Insert `entry` below the header of the file at `path`, creating the
    /// file when missing
    pub fn prepend(&self, path: &Path, entry: &str) -> Result<()> {
        let existing = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(ChangelogError::WriteFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }
                .into())
            }
        };

        let content = format!("{}{}{}", self.header(), entry, previous_entries(&existing));

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ChangelogError::WriteFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        }
        std::fs::write(path, content).map_err(|e| ChangelogError::WriteFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        debug!(path = %path.display(), "changelog written");
        Ok(())
    }
}

/// Everything from the first version heading on
fn previous_entries(content: &str) -> &str {
    if content.starts_with("## ") {
        return content;
    }
    match content.find("\n## ") {
        Some(index) => &content[index + 1..],
        None => "",
    }
}

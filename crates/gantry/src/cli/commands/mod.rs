//! CLI commands

mod changed;
mod completions;
mod list;
mod release;

pub use changed::ChangedCommand;
pub use completions::CompletionsCommand;
pub use list::ListCommand;
pub use release::{PublishCommand, VersionCommand};

//! CLI command implementations.

pub mod cache;
pub mod config;

use clap::ValueEnum;

/// Result type of command implementations.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Output format of reporting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

//! resync CLI
//!
//! Command-line tools for the resync resource layer.
//!
//! # Commands
//!
//! - `cache stats` - Display cache metrics
//! - `cache clear` - Remove every cache entry and record
//! - `cache invalidate` - Remove the entries of named operations
//! - `cache purge` - Remove expired entries
//! - `cache inspect` - List durable records
//! - `config check` - Validate and print the resolved configuration

mod commands;

use clap::{Parser, Subcommand};
use commands::OutputFormat;
use resync::LayerConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// resync resource layer tools.
#[derive(Parser)]
#[command(name = "resync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and maintain the durable cache
    #[command(subcommand)]
    Cache(CacheCommand),

    /// Work with the configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Display cache metrics
    Stats {
        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Remove every entry and record
    Clear,

    /// Remove the entries of argument-less operations
    Invalidate {
        /// Operation names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Remove expired entries and records
    Purge,

    /// List durable records
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Validate and print the resolved configuration
    Check {
        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => LayerConfig::load(path)?,
        None => LayerConfig::default(),
    };
    tracing::debug!(path = ?cli.config, "configuration resolved");
    let mut out = std::io::stdout().lock();

    match cli.command {
        Commands::Cache(command) => match command {
            CacheCommand::Stats { format } => commands::cache::stats(&config, format, &mut out)?,
            CacheCommand::Clear => commands::cache::clear(&config, &mut out)?,
            CacheCommand::Invalidate { names } => {
                commands::cache::invalidate(&config, &names, &mut out)?;
            }
            CacheCommand::Purge => commands::cache::purge(&config, &mut out)?,
            CacheCommand::Inspect { format } => {
                commands::cache::inspect(&config, format, &mut out)?;
            }
        },
        Commands::Config(ConfigCommand::Check { format }) => {
            commands::config::check(&config, format, &mut out)?;
        }
        Commands::Version => {
            println!("resync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("resync v{}", resync::VERSION);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_nested_commands() {
        let cli = Cli::try_parse_from([
            "resync", "--config", "resync.yaml", "cache", "invalidate", "remote_users", "remote_axes",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("resync.yaml")));
        match cli.command {
            Commands::Cache(CacheCommand::Invalidate { names }) => {
                assert_eq!(names, vec!["remote_users", "remote_axes"]);
            }
            _ => panic!("expected cache invalidate"),
        }

        let cli = Cli::try_parse_from(["resync", "cache", "stats", "--format", "json", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Cache(CacheCommand::Stats {
                format: OutputFormat::Json
            })
        ));
    }

    #[test]
    fn invalidate_requires_a_name() {
        assert!(Cli::try_parse_from(["resync", "cache", "invalidate"]).is_err());
    }
}

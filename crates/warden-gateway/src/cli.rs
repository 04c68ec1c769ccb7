//! The `wardend` command line.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// The warden agent-governance daemon.
#[derive(Debug, Parser)]
#[command(name = "wardend", version, about = "Local agent-governance daemon")]
pub struct Cli {
    /// Path to the configuration file (default: ./warden.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand; defaults to `serve`.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the daemon (the default).
    Serve,
    /// Configuration helpers.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print the version.
    Version,
}

/// Configuration subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Validate the configuration and report findings.
    Validate,
    /// Print the effective configuration.
    Show,
}

//! Command-line surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub const DEFAULT_CONFIG: &str = "scalewatch.toml";

#[derive(Debug, Parser)]
#[command(
    name = "scalewatchd",
    about = "Anomaly-driven autoscaling daemon",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scheduled decision loop and the REST API.
    Run {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,

        /// Port for the REST API.
        #[arg(long, default_value = "8440")]
        port: u16,
    },

    /// Evaluate once and print the cycle reports as JSON.
    Cycle {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,

        /// Limit the run to these services (repeatable). Defaults to all.
        #[arg(long = "service")]
        services: Vec<String>,
    },

    /// Parse and check a config file.
    Validate {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },

    /// Manage secrets in the configured backend.
    Secrets {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,

        #[command(subcommand)]
        action: SecretsAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum SecretsAction {
    /// List secret keys.
    List,
    /// Print one secret value.
    Get { key: String },
    /// Write a secret.
    Set { key: String, value: String },
    /// Remove a secret.
    Delete { key: String },
}

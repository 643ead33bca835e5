//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Run command arguments.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Start the shell without joining the network
    #[arg(long)]
    pub no_join: bool,
}

/// Exec command arguments.
#[derive(Debug, Args)]
pub struct ExecCommand {
    /// Skip the boot-time join
    #[arg(long)]
    pub no_join: bool,

    /// Shell command line, e.g. `loramac tx hello uncnf 10`
    #[arg(required = true, trailing_var_arg = true)]
    pub args: Vec<String>,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

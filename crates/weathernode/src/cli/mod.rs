//! Command-line interface for weathernode.
//!
//! This module provides the CLI structure for the `weathernode` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, ExecCommand, RunCommand};

/// weathernode - LoRaWAN weather-station end-device
///
/// Boots a LoRaWAN end-device, joins the network and opens the device shell.
/// `loramac` controls the MAC stack; `loramac loop` sends synthetic weather
/// readings until Ctrl-C.
#[derive(Debug, Parser)]
#[command(name = "weathernode")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Boot the device and run the interactive shell
    Run(RunCommand),

    /// Boot the device, run one shell command and exit with its status
    Exec(ExecCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Verbosity;
    use clap::CommandFactory;

    fn cli(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            command: Command::Run(RunCommand { no_join: false }),
        }
    }

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "weathernode");
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(cli(0, true).verbosity(), Verbosity::Quiet);
        assert_eq!(cli(3, true).verbosity(), Verbosity::Quiet);
        assert_eq!(cli(0, false).verbosity(), Verbosity::Normal);
        assert_eq!(cli(1, false).verbosity(), Verbosity::Verbose);
        assert_eq!(cli(2, false).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from(["weathernode", "run", "--no-join"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Run(RunCommand { no_join: true })
        ));
    }

    #[test]
    fn test_parse_exec_keeps_shell_args() {
        let cli = Cli::try_parse_from([
            "weathernode",
            "exec",
            "--no-join",
            "loramac",
            "set",
            "dr",
            "3",
        ])
        .unwrap();
        let Command::Exec(exec) = cli.command else {
            panic!("expected exec");
        };
        assert!(exec.no_join);
        assert_eq!(exec.args, ["loramac", "set", "dr", "3"]);
    }

    #[test]
    fn test_parse_exec_requires_args() {
        assert!(Cli::try_parse_from(["weathernode", "exec"]).is_err());
    }

    #[test]
    fn test_parse_config_validate() {
        let cli =
            Cli::try_parse_from(["weathernode", "config", "validate", "-f", "/tmp/x.toml"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Validate { file: Some(_) })
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let cli =
            Cli::try_parse_from(["weathernode", "-c", "/custom/config.toml", "run"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_with_verbose_and_quiet() {
        let cli = Cli::try_parse_from(["weathernode", "-vv", "run"]).unwrap();
        assert_eq!(cli.verbose, 2);

        let cli = Cli::try_parse_from(["weathernode", "-q", "run"]).unwrap();
        assert!(cli.quiet);
    }
}

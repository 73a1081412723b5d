//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cli::commands::guard::GuardArgs;
use crate::cli::commands::metrics::MetricsArgs;
use crate::cli::commands::roster::RosterCommands;
use crate::cli::commands::run::RunArgs;
use crate::cli::commands::status::StatusArgs;
use crate::cli::commands::unfixable::UnfixableCommands;
use crate::cli::commands::worker::WorkerArgs;

#[derive(Parser, Debug)]
#[command(name = "fixloop")]
#[command(about = "fixloop - autonomous test, diagnose, fix and merge loop", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file layered over the project config
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the control loop until it converges or halts
    Run(RunArgs),

    /// Run one worker batch (started by `run`)
    #[command(hide = true)]
    Worker(WorkerArgs),

    /// Persona and scenario roster
    #[command(subcommand)]
    Roster(RosterCommands),

    /// Per-status counts of a run
    Status(StatusArgs),

    /// Scenarios excluded from fixing
    #[command(subcommand)]
    Unfixable(UnfixableCommands),

    /// Convergence history of a loop
    Metrics(MetricsArgs),

    /// Run a command under the circuit breaker until it succeeds
    Guard(GuardArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_global_flags() {
        let cli = Cli::try_parse_from([
            "fixloop",
            "run",
            "--loop-id",
            "nightly",
            "--workers",
            "4",
            "--json",
            "--config",
            "ci.yaml",
        ])
        .unwrap();

        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("ci.yaml")));
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.loop_id.as_deref(), Some("nightly"));
                assert_eq!(args.workers, Some(4));
                assert!(!args.in_process);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_guard_keeps_trailing_command() {
        let cli = Cli::try_parse_from(["fixloop", "guard", "--threshold", "2", "--", "make", "-j4", "test"]).unwrap();
        match cli.command {
            Commands::Guard(args) => {
                assert_eq!(args.threshold, Some(2));
                assert_eq!(args.command, vec!["make", "-j4", "test"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_worker() {
        let cli = Cli::try_parse_from([
            "fixloop",
            "worker",
            "--run-id",
            "l-it01",
            "--index",
            "2",
            "--batch-file",
            "b.json",
            "--out-dir",
            "out",
        ])
        .unwrap();
        match cli.command {
            Commands::Worker(args) => {
                assert_eq!(args.run_id, "l-it01");
                assert_eq!(args.index, 2);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

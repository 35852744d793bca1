//! # CLI Interface
//!
//! Command-line definition for `safebox` using `clap` derive. Subcommands:
//! `run`, `fees` and `version`.

use clap::{Parser, Subcommand, ValueEnum};
use safebox_contracts::ImplementationVersion;
use std::path::PathBuf;

use crate::logging::DEFAULT_FILTER;

/// Safebox vault toolkit.
///
/// Runs scripted vault scenarios against a fresh in-memory runtime and
/// quotes deposit fees for each vault generation.
#[derive(Parser, Debug)]
#[command(
    name = "safebox",
    about = "Safebox vault scenario runner",
    version,
    propagate_version = true
)]
pub struct SafeboxCli {
    /// Log format: `pretty` or `json`.
    #[arg(long, global = true, env = "SAFEBOX_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, global = true, env = "SAFEBOX_LOG", default_value = DEFAULT_FILTER)]
    pub log_filter: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a JSON scenario file and print the report.
    Run(RunArgs),
    /// Print the fee split for a deposit.
    Fees(FeesArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the scenario file.
    #[arg(long, short = 's', env = "SAFEBOX_SCENARIO")]
    pub scenario: PathBuf,

    /// Write the report here instead of stdout.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

/// Arguments for the `fees` subcommand.
#[derive(Parser, Debug)]
pub struct FeesArgs {
    /// Gross deposit amount.
    #[arg(long, short = 'a')]
    pub amount: u64,

    /// Vault generation whose schedule applies.
    #[arg(long, value_enum, default_value_t = Generation::V1)]
    pub generation: Generation,
}

/// Vault generation selector.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    V1,
    V2,
}

impl From<Generation> for ImplementationVersion {
    fn from(g: Generation) -> Self {
        match g {
            Generation::V1 => ImplementationVersion::V1,
            Generation::V2 => ImplementationVersion::V2,
        }
    }
}

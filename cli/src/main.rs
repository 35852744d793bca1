// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Safebox CLI
//!
//! Entry point for the `safebox` binary. Parses arguments, initializes
//! logging, and dispatches:
//!
//! - `run`     — execute a scenario file and print its JSON report
//! - `fees`    — print the fee split for a deposit amount
//! - `version` — print build version information

mod cli;
mod logging;
mod scenario;

use anyhow::{Context, Result};
use clap::Parser;
use safebox_contracts::ImplementationVersion;
use serde::Serialize;

use cli::{Commands, SafeboxCli};
use logging::LogFormat;

fn main() -> Result<()> {
    let cli = SafeboxCli::parse();
    logging::init_logging(&cli.log_filter, LogFormat::from_str_lossy(&cli.log_format));

    match cli.command {
        Commands::Run(args) => run_scenario(args),
        Commands::Fees(args) => print_fees(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Loads, executes and reports a scenario.
fn run_scenario(args: cli::RunArgs) -> Result<()> {
    let raw = std::fs::read_to_string(&args.scenario)
        .with_context(|| format!("failed to read scenario {}", args.scenario.display()))?;
    let scenario: scenario::Scenario = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse scenario {}", args.scenario.display()))?;

    tracing::info!(
        path = %args.scenario.display(),
        actors = scenario.actors.len(),
        steps = scenario.steps.len(),
        "running scenario"
    );

    let report = scenario::run(&scenario)
        .with_context(|| format!("scenario {} failed", args.scenario.display()))?;
    let json = serde_json::to_string_pretty(&report).context("failed to encode report")?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            tracing::info!(path = %path.display(), "report written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[derive(Serialize)]
struct FeeLine {
    implementation: &'static str,
    amount: u64,
    fee: u64,
    net: u64,
}

/// Prints how the chosen generation splits a deposit.
fn print_fees(args: cli::FeesArgs) -> Result<()> {
    let logic = ImplementationVersion::from(args.generation).build();
    let quote = logic
        .fee_schedule()
        .quote(args.amount)
        .with_context(|| format!("cannot price a deposit of {}", args.amount))?;

    let line = FeeLine {
        implementation: logic.name(),
        amount: args.amount,
        fee: quote.fee,
        net: quote.net,
    };
    println!("{}", serde_json::to_string(&line).context("failed to encode quote")?);
    Ok(())
}

fn print_version() {
    println!("safebox {}", env!("CARGO_PKG_VERSION"));
    println!(
        "vault schema {}",
        safebox_protocol::config::VAULT_SCHEMA_VERSION
    );
}

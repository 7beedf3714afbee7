//! # shield CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use shield_cli::demo::{run_demo, DemoArgs};
use shield_cli::genesis::{run_genesis, GenesisArgs};
use shield_cli::params::{run_params, ParamsArgs};
use shield_cli::status::{run_status, StatusArgs};

/// Shield ledger CLI
///
/// Validates and builds genesis documents, reports ledger totals, and runs
/// the protection-pool lifecycle against in-memory collaborators.
#[derive(Parser, Debug)]
#[command(name = "shield", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the YAML operator configuration.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate or initialize a genesis document.
    Genesis(GenesisArgs),

    /// Import a genesis and print the ledger status.
    Status(StatusArgs),

    /// Print the effective pool and claim parameters.
    Params(ParamsArgs),

    /// Run a pool, deposit, purchase and claim end to end.
    Demo(DemoArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = cli.config.as_deref();
    let result = match &cli.command {
        Commands::Genesis(args) => run_genesis(args, config),
        Commands::Status(args) => run_status(args),
        Commands::Params(args) => run_params(args, config),
        Commands::Demo(args) => run_demo(args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

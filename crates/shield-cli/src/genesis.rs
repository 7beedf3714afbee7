//! # Genesis Subcommand
//!
//! - `shield genesis validate <FILE>`: parse a JSON or YAML genesis, check
//!   every cross-record total, and print a summary with the document digest.
//! - `shield genesis init --config <FILE> [--output <FILE>]`: write an empty
//!   ledger genesis carrying the config's admin and parameters.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use shield_ledger::GenesisState;

/// Arguments for the `shield genesis` subcommand.
#[derive(Args, Debug)]
pub struct GenesisArgs {
    #[command(subcommand)]
    pub command: GenesisCommand,
}

#[derive(Subcommand, Debug)]
pub enum GenesisCommand {
    /// Validate a genesis document.
    Validate {
        /// Path to a JSON or YAML genesis file.
        file: PathBuf,
    },

    /// Build an initial genesis from the operator config.
    Init {
        /// Where to write the genesis JSON. Defaults to stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

/// Execute the genesis subcommand.
pub fn run_genesis(args: &GenesisArgs, config: Option<&Path>) -> Result<u8> {
    match &args.command {
        GenesisCommand::Validate { file } => cmd_validate(file),
        GenesisCommand::Init { output } => {
            let Some(config) = config else {
                bail!("genesis init requires --config <FILE>");
            };
            cmd_init(config, output.as_deref())
        }
    }
}

/// One-line counts for a genesis document.
pub fn summarize(genesis: &GenesisState) -> String {
    format!(
        "admin={} next_pool_id={} pools={} providers={} collaterals={} purchases={} withdrawals={} claims={} reimbursements={}",
        genesis.admin.as_ref().map_or("-", |a| a.as_str()),
        genesis.next_pool_id,
        genesis.pools.len(),
        genesis.providers.len(),
        genesis.collaterals.len(),
        genesis.purchases.len(),
        genesis.withdraws.len(),
        genesis.claims.len(),
        genesis.reimbursements.len(),
    )
}

fn cmd_validate(file: &Path) -> Result<u8> {
    let genesis = crate::read_genesis(file)?;
    if let Err(e) = genesis.validate() {
        tracing::error!(file = %file.display(), "{e}");
        println!("INVALID {}: {e}", file.display());
        return Ok(1);
    }
    let digest = genesis.digest().context("failed to canonicalize genesis")?;
    println!("OK {}", file.display());
    println!("  {}", summarize(&genesis));
    println!("  digest: {digest}");
    Ok(0)
}

/// Render the initial genesis for `config_path` as pretty JSON.
pub fn init_genesis_json(config_path: &Path) -> Result<String> {
    let config = crate::load_config(Some(config_path))?;
    let genesis = config.genesis();
    genesis
        .validate()
        .context("config produced an invalid genesis")?;
    let json = serde_json::to_string_pretty(&genesis).context("failed to serialize genesis")?;
    tracing::info!(
        config = %config_path.display(),
        digest = %genesis.digest().context("failed to canonicalize genesis")?,
        "genesis built"
    );
    Ok(json)
}

fn cmd_init(config: &Path, output: Option<&Path>) -> Result<u8> {
    let json = init_genesis_json(config)?;
    match output {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(0)
}

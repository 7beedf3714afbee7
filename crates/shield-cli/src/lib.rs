//! # shield-cli — Command-Line Interface for the Shield Ledger
//!
//! Provides the `shield` binary. Every command works offline against
//! genesis documents, YAML configuration, or a ledger held in memory.
//!
//! ## Subcommands
//!
//! - `shield genesis validate <FILE>`: parse and validate a genesis document.
//! - `shield genesis init --config <FILE>`: build an initial genesis.
//! - `shield status <FILE>`: import a genesis and report ledger totals.
//! - `shield params`: print the effective pool and claim parameters.
//! - `shield demo`: run a pool, deposit, purchase and claim end to end.
//!
//! ```bash
//! shield genesis init --config shield.yaml --output genesis.json
//! shield genesis validate genesis.json
//! shield status genesis.json
//! ```

pub mod demo;
pub mod genesis;
pub mod params;
pub mod status;

use std::path::Path;

use anyhow::{Context, Result};

use shield_ledger::{GenesisState, ShieldConfig};

/// Read a JSON or YAML genesis document.
pub fn read_genesis(path: &Path) -> Result<GenesisState> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read genesis {}", path.display()))?;
    GenesisState::parse(&text).with_context(|| format!("failed to parse genesis {}", path.display()))
}

/// Load the operator config, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<ShieldConfig> {
    match path {
        Some(p) => ShieldConfig::load(p).with_context(|| format!("invalid config {}", p.display())),
        None => Ok(ShieldConfig::default()),
    }
}

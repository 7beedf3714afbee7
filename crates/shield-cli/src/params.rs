//! # Params Subcommand
//!
//! `shield params` prints the pool and claim parameters that a genesis built
//! from `--config` (or from the defaults) would carry, as YAML.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use shield_ledger::{ClaimProposalParams, PoolParams, StakingRateMigration};

/// Arguments for the `shield params` subcommand.
#[derive(Args, Debug)]
pub struct ParamsArgs {}

#[derive(Debug, Serialize)]
struct EffectiveParams {
    pool_params: PoolParams,
    claim_params: ClaimProposalParams,
    shield_staking_rate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    staking_rate_migration: Option<StakingRateMigration>,
}

/// Execute the params subcommand.
pub fn run_params(_args: &ParamsArgs, config: Option<&Path>) -> Result<u8> {
    print!("{}", params_yaml(config)?);
    Ok(0)
}

/// Effective parameters as YAML.
pub fn params_yaml(config: Option<&Path>) -> Result<String> {
    let config = crate::load_config(config)?;
    let genesis = config.genesis();
    let params = EffectiveParams {
        pool_params: genesis.pool_params,
        claim_params: genesis.claim_params,
        shield_staking_rate: genesis.shield_staking_rate.to_string(),
        staking_rate_migration: config.staking_rate_migration,
    };
    serde_yaml::to_string(&params).context("failed to render parameters")
}

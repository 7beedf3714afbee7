//! # Status Subcommand
//!
//! `shield status <FILE>` imports a genesis into an in-memory ledger and
//! prints the status query, optionally with the pool list, as JSON.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;

use shield_core::Timestamp;
use shield_ledger::{
    BlockHeader, Context, GenesisState, Keeper, MemBank, MemStaking, MemStore, PageRequest, Pool, StatusReport,
};

/// Arguments for the `shield status` subcommand.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Path to a JSON or YAML genesis file.
    pub file: PathBuf,

    /// Include the pools on this page in the report.
    #[arg(long)]
    pub pools: bool,

    /// Page of pools to include (1-based).
    #[arg(long, default_value_t = 1)]
    pub page: usize,

    /// Pools per page.
    #[arg(long, default_value_t = PageRequest::DEFAULT_LIMIT)]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
struct Report {
    #[serde(flatten)]
    status: StatusReport,
    shield_staking_rate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pools: Option<Vec<Pool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pool_count: Option<usize>,
}

/// Execute the status subcommand.
pub fn run_status(args: &StatusArgs) -> Result<u8> {
    let genesis = crate::read_genesis(&args.file)?;
    let page = args.pools.then(|| PageRequest::new(args.page, args.limit));
    println!("{}", status_json(&genesis, page.as_ref())?);
    Ok(0)
}

/// Import `genesis` and render its status as pretty JSON.
pub fn status_json(genesis: &GenesisState, page: Option<&PageRequest>) -> Result<String> {
    let mut store = MemStore::new();
    let header = BlockHeader::new(0, Timestamp::from_epoch_secs(0)?);
    let keeper = Keeper::new(MemStaking::default(), MemBank::new());
    let mut ctx = Context::new(&mut store, header);
    keeper
        .init_genesis(&mut ctx, genesis)
        .context("failed to import genesis")?;

    let (pools, pool_count) = match page {
        Some(page) => {
            let listed = keeper.query_pools(&ctx, page)?;
            (Some(listed.items), Some(listed.total))
        }
        None => (None, None),
    };
    let report = Report {
        status: keeper.status(&ctx)?,
        shield_staking_rate: keeper.shield_staking_rate(&ctx)?.to_string(),
        pools,
        pool_count,
    };
    tracing::debug!(pools = pool_count, "status computed");
    Ok(serde_json::to_string_pretty(&report)?)
}

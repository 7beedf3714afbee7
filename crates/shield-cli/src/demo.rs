//! # Demo Subcommand
//!
//! `shield demo` drives one pool through its life against the in-memory
//! staking and bank collaborators:
//!
//! 1. The admin bonds 2000 and opens a pool with 1000 shield.
//! 2. A provider bonds 500 and deposits all of it.
//! 3. A purchaser buys 800 of coverage.
//! 4. A 300 loss is locked, split 200/100 by collateral.
//! 5. With `--approve`, the claim is approved, the payout period elapses and
//!    the purchaser withdraws the reimbursement.
//!
//! The final ledger state is printed as a status report.

use anyhow::{ensure, Context as _, Result};
use clap::Args;
use serde::Serialize;

use shield_core::{Address, Amount, CanonicalBytes, Coins, MixedCoins, PoolId, ProposalId, Timestamp, TxHash, ValidatorAddress};
use shield_ledger::{
    BlockHeader, Context, CreatePoolRequest, GenesisState, Keeper, MemBank, MemStaking, MemStore, Pool, Provider,
    PurchaseRequest, StatusReport,
};

const DAY: i64 = 86_400;
const ADMIN_STAKE: Amount = 2000;
const PROVIDER_STAKE: Amount = 500;
const POOL_SHIELD: Amount = 1000;
const PURCHASED_SHIELD: Amount = 800;
const LOSS: Amount = 300;

/// Arguments for the `shield demo` subcommand.
#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Approve the claim and pay the reimbursement out.
    #[arg(long)]
    pub approve: bool,
}

/// Ledger state after the scenario.
#[derive(Debug, Clone)]
pub struct DemoOutcome {
    pub genesis: GenesisState,
    pub status: StatusReport,
    pub reimbursed: Option<Coins>,
}

#[derive(Debug, Serialize)]
struct DemoReport<'a> {
    status: &'a StatusReport,
    pools: &'a [Pool],
    providers: &'a [Provider],
    #[serde(skip_serializing_if = "Option::is_none")]
    reimbursed: Option<&'a Coins>,
}

/// Execute the demo subcommand.
pub fn run_demo(args: &DemoArgs) -> Result<u8> {
    let outcome = run_scenario(args.approve)?;
    let report = DemoReport {
        status: &outcome.status,
        pools: &outcome.genesis.pools,
        providers: &outcome.genesis.providers,
        reimbursed: outcome.reimbursed.as_ref(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(0)
}

/// A store, collaborators and the block being executed.
struct Ledger {
    store: MemStore,
    header: BlockHeader,
    keeper: Keeper<MemStaking, MemBank>,
}

impl Ledger {
    fn run<T>(&mut self, f: impl FnOnce(&Keeper<MemStaking, MemBank>, &mut Context<'_>) -> Result<T>) -> Result<T> {
        let mut ctx = Context::new(&mut self.store, self.header);
        f(&self.keeper, &mut ctx)
    }

    /// Mint `amount` to `who`, bonding it to `validator` when given.
    fn fund(&mut self, who: &Address, amount: Amount, validator: Option<&ValidatorAddress>) -> Result<()> {
        self.run(|k, ctx| {
            let coins = Coins::from_coin(k.bond_denom(), amount)?;
            k.bank().mint(ctx, who, &coins)?;
            if let Some(v) = validator {
                k.staking().delegate(ctx, k.bank(), who, v, amount)?;
            }
            Ok(())
        })
    }

    fn advance(&mut self, secs: i64) -> Result<()> {
        let time = self
            .header
            .time
            .checked_add_secs(secs)
            .with_context(|| format!("block time overflows adding {secs}s"))?;
        let blocks = u64::try_from(secs / shield_ledger::params::SECONDS_PER_BLOCK).unwrap_or(0);
        self.header = BlockHeader::new(self.header.height + blocks, time);
        Ok(())
    }
}

/// Run the scenario and return the resulting ledger state.
pub fn run_scenario(approve: bool) -> Result<DemoOutcome> {
    let admin = Address::new("cosmos1admin")?;
    let provider = Address::new("cosmos1provider")?;
    let purchaser = Address::new("cosmos1purchaser")?;
    let validator = ValidatorAddress::new("cosmosvaloper1demo")?;

    let mut ledger = Ledger {
        store: MemStore::new(),
        header: BlockHeader::new(1, Timestamp::parse("2026-01-01T00:00:00Z")?),
        keeper: Keeper::new(MemStaking::default(), MemBank::new()),
    };
    let genesis = GenesisState {
        admin: Some(admin.clone()),
        ..GenesisState::default()
    };
    ledger.run(|k, ctx| Ok(k.init_genesis(ctx, &genesis)?))?;
    ledger.fund(&admin, ADMIN_STAKE, Some(&validator))?;
    ledger.fund(&provider, PROVIDER_STAKE, Some(&validator))?;
    ledger.fund(&purchaser, 100, None)?;

    let pool_id: PoolId = ledger.run(|k, ctx| {
        let pool = k.create_pool(
            ctx,
            CreatePoolRequest {
                creator: admin.clone(),
                shield: POOL_SHIELD,
                deposit: MixedCoins::default(),
                sponsor: "demo-project".to_string(),
                sponsor_addr: Address::new("cosmos1sponsor")?,
                description: "demo pool".to_string(),
                time_of_coverage_secs: 60 * DAY,
                blocks_of_coverage: 0,
            },
        )?;
        Ok(pool.id)
    })?;

    let tx_hash = TxHash::of(&CanonicalBytes::new(&serde_json::json!({
        "purchaser": purchaser.as_str(),
        "pool_id": pool_id.0,
        "shield": PURCHASED_SHIELD,
    }))?);
    ledger.run(|k, ctx| {
        k.deposit_collateral(ctx, &provider, pool_id, PROVIDER_STAKE)?;
        k.purchase_shield(
            ctx,
            PurchaseRequest {
                tx_hash,
                pool_id,
                shield: PURCHASED_SHIELD,
                description: "demo coverage".to_string(),
                purchaser: purchaser.clone(),
            },
        )?;
        let loss = Coins::from_coin(k.bond_denom(), LOSS)?;
        let lock_period = k.claim_params(ctx)?.lock_period_secs;
        let locked = k.claim_lock(ctx, ProposalId(1), pool_id, &loss, &tx_hash, lock_period, &purchaser)?;
        ensure!(locked <= LOSS, "locked {locked} exceeds the loss {LOSS}");
        tracing::info!(pool_id = %pool_id, locked, "demo claim locked");
        Ok(())
    })?;

    let mut reimbursed = None;
    if approve {
        let payout_period = ledger.run(|k, ctx| {
            k.approve_claim(ctx, ProposalId(1), &purchaser)?;
            Ok(k.claim_params(ctx)?.payout_period_secs)
        })?;
        ledger.advance(payout_period)?;
        let paid = ledger.run(|k, ctx| Ok(k.withdraw_reimbursement(ctx, ProposalId(1), &purchaser)?))?;
        tracing::info!(amount = %paid, "demo reimbursement paid");
        reimbursed = Some(paid);
    }

    ledger.run(|k, ctx| {
        Ok(DemoOutcome {
            genesis: k.export_genesis(ctx)?,
            status: k.status(ctx)?,
            reimbursed,
        })
    })
}

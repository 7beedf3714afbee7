//! Export and import of a ledger with every kind of record in flight.

use shield_core::{ProposalId, TxHash};
use shield_ledger::{ClaimState, Context, GenesisState, Keeper, MemBank, MemStaking, MemStore, PurchaseRequest, TestEnv};

const DAY: i64 = 86_400;

/// Pool with two providers, a purchase, a pending withdrawal, partially
/// accrued fees, one approved claim and one locked claim.
fn busy_ledger() -> (TestEnv, GenesisState) {
    let mut env = TestEnv::new();
    let provider = env.addr("cosmos1provider");
    let buyer = env.addr("cosmos1buyer");
    let victim = env.addr("cosmos1victim");
    env.delegate(&provider, "cosmosvaloper1a", 500);
    env.fund(&buyer, 100);
    let pool = env.create_pool_with(1000, 90 * DAY, 0);
    let tx = TxHash::from_bytes([5; 32]);
    let (first, second) = (env.coins(300), env.coins(50));
    env.run(|k, ctx| {
        k.deposit_collateral(ctx, &provider, pool, 500)?;
        k.purchase_shield(
            ctx,
            PurchaseRequest {
                tx_hash: tx,
                pool_id: pool,
                shield: 800,
                description: "vault coverage".to_string(),
                purchaser: buyer.clone(),
            },
        )?;
        k.withdraw_collateral(ctx, &provider, pool, 100)?;
        Ok(())
    })
    .unwrap();

    env.advance(10 * DAY, 100);
    env.run(|k, ctx| {
        k.end_block(ctx)?;
        let period = k.claim_params(ctx)?.lock_period_secs;
        k.claim_lock(ctx, ProposalId(1), pool, &first, &tx, period, &buyer)?;
        k.approve_claim(ctx, ProposalId(1), &victim)?;
        k.claim_lock(ctx, ProposalId(2), pool, &second, &tx, period, &buyer)?;
        Ok(())
    })
    .unwrap();

    let exported = env.run(|k, ctx| k.export_genesis(ctx)).unwrap();
    (env, exported)
}

#[test]
fn exported_ledger_carries_every_record() {
    let (_, g) = busy_ledger();
    g.validate().unwrap();
    assert_eq!(g.pools.len(), 1);
    assert_eq!(g.providers.len(), 2);
    assert_eq!(g.purchases.len(), 1);
    assert_eq!(g.withdraws.len(), 1);
    assert_eq!(g.reimbursements.len(), 1);
    let states: Vec<_> = g.claims.iter().map(|c| c.state).collect();
    assert_eq!(states, vec![ClaimState::Reimbursing, ClaimState::Locked]);
    assert!(!g.remaining_service_fees.is_zero());
}

#[test]
fn import_into_a_fresh_store_reproduces_the_export() {
    let (env, exported) = busy_ledger();
    let keeper = Keeper::new(MemStaking::default(), MemBank::new());
    let mut store = MemStore::new();
    let mut ctx = Context::new(&mut store, env.header);
    keeper.init_genesis(&mut ctx, &exported).unwrap();
    let again = keeper.export_genesis(&ctx).unwrap();
    assert_eq!(again, exported);
    assert_eq!(again.digest().unwrap(), exported.digest().unwrap());
}

#[test]
fn json_and_yaml_documents_agree() {
    let (_, exported) = busy_ledger();
    let json = serde_json::to_string_pretty(&exported).unwrap();
    let yaml = serde_yaml::to_string(&exported).unwrap();
    let from_json = GenesisState::parse(&json).unwrap();
    let from_yaml = GenesisState::parse(&yaml).unwrap();
    assert_eq!(from_json, exported);
    assert_eq!(from_yaml, exported);
    assert_eq!(from_json.digest().unwrap(), from_yaml.digest().unwrap());
}

#[test]
fn status_of_an_exported_ledger_matches_its_records() {
    let (_, exported) = busy_ledger();
    let report: serde_json::Value =
        serde_json::from_str(&shield_cli::status::status_json(&exported, None).unwrap()).unwrap();
    let locked: u64 = exported.providers.iter().map(|p| p.total_locked).sum();
    let withdrawing: u64 = exported.providers.iter().map(|p| p.withdrawing).sum();
    let collateral: u64 = exported.pools.iter().map(|p| p.total_collateral).sum();
    assert_eq!(report["total_locked"], locked);
    assert_eq!(report["total_withdrawing"], withdrawing);
    assert_eq!(report["total_collateral"], collateral);
    assert!(report.get("pools").is_none());
}

#[test]
fn tampered_totals_are_refused_on_import() {
    let (env, mut exported) = busy_ledger();
    exported.pools[0].total_collateral += 1;
    assert!(exported.validate().is_err());
    let keeper = Keeper::new(MemStaking::default(), MemBank::new());
    let mut store = MemStore::new();
    let mut ctx = Context::new(&mut store, env.header);
    let err = keeper.init_genesis(&mut ctx, &exported).unwrap_err();
    assert!(!err.is_fatal());
    assert_eq!(store, MemStore::new());
}

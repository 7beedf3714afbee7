//! Every failed operation leaves the store exactly as it found it.

use shield_core::{Address, PoolId, ProposalId, TxHash};
use shield_ledger::{PurchaseRequest, ShieldError, TestEnv, TxResult};

const DAY: i64 = 86_400;

struct Setup {
    env: TestEnv,
    provider: Address,
    buyer: Address,
    pool: PoolId,
}

fn setup() -> Setup {
    let mut env = TestEnv::new();
    let provider = env.addr("cosmos1provider");
    let buyer = env.addr("cosmos1buyer");
    env.delegate(&provider, "cosmosvaloper1a", 500);
    env.fund(&buyer, 50);
    let pool = env.create_pool_with(1000, 90 * DAY, 0);
    env.run(|k, ctx| {
        k.deposit_collateral(ctx, &provider, pool, 400)?;
        k.purchase_shield(
            ctx,
            PurchaseRequest {
                tx_hash: TxHash::from_bytes([1; 32]),
                pool_id: pool,
                shield: 600,
                description: String::new(),
                purchaser: buyer.clone(),
            },
        )?;
        let loss = shield_core::Coins::from_coin(k.bond_denom(), 140)?;
        k.claim_lock(ctx, ProposalId(1), pool, &loss, &TxHash::from_bytes([1; 32]), 28 * DAY, &buyer)?;
        Ok(())
    })
    .unwrap();
    Setup {
        env,
        provider,
        buyer,
        pool,
    }
}

/// Run `op` expecting a rejection, and check nothing was written.
fn assert_rejected_cleanly<T: std::fmt::Debug>(
    env: &mut TestEnv,
    op: impl FnOnce(&shield_ledger::Keeper<shield_ledger::MemStaking, shield_ledger::MemBank>, &mut shield_ledger::Context<'_>) -> TxResult<T>,
) -> ShieldError {
    let before = env.store.clone();
    let err = env.run(op).unwrap_err();
    assert_eq!(env.store, before, "store changed by {err}");
    err.rejection().cloned().unwrap_or_else(|| panic!("expected a rejection, got {err}"))
}

#[test]
fn rejected_requests_write_nothing() {
    let mut s = setup();
    let (pool, provider, buyer) = (s.pool, s.provider.clone(), s.buyer.clone());
    let stranger = s.env.addr("cosmos1stranger");

    let mut req = s.env.pool_request(10, 60 * DAY, 0);
    req.creator = stranger.clone();
    let err = assert_rejected_cleanly(&mut s.env, |k, ctx| k.create_pool(ctx, req));
    assert_eq!(err, ShieldError::NotShieldAdmin { caller: stranger.clone() });

    let err = assert_rejected_cleanly(&mut s.env, |k, ctx| k.deposit_collateral(ctx, &provider, PoolId(99), 10));
    assert_eq!(err, ShieldError::NoPoolFound(PoolId(99)));

    let err = assert_rejected_cleanly(&mut s.env, |k, ctx| {
        k.purchase_shield(
            ctx,
            PurchaseRequest {
                tx_hash: TxHash::from_bytes([2; 32]),
                pool_id: pool,
                shield: 500,
                description: String::new(),
                purchaser: buyer.clone(),
            },
        )
    });
    assert!(matches!(err, ShieldError::NotEnoughShield { .. }));

    let err = assert_rejected_cleanly(&mut s.env, |k, ctx| k.withdraw_collateral(ctx, &provider, pool, 10_000));
    assert!(matches!(err, ShieldError::OverWithdrawal { .. }));

    let err = assert_rejected_cleanly(&mut s.env, |k, ctx| k.withdraw_reimbursement(ctx, ProposalId(1), &stranger));
    assert_eq!(err, ShieldError::CompensationNotFound(ProposalId(1)));

    let err = assert_rejected_cleanly(&mut s.env, |k, ctx| k.reject_claim(ctx, ProposalId(7)));
    assert_eq!(err, ShieldError::ClaimNotFound(ProposalId(7)));
}

#[test]
fn duplicate_purchase_charges_nothing() {
    let mut s = setup();
    let (pool, buyer) = (s.pool, s.buyer.clone());
    let balance = s.env.balance(&buyer);
    let err = assert_rejected_cleanly(&mut s.env, |k, ctx| {
        k.purchase_shield(
            ctx,
            PurchaseRequest {
                tx_hash: TxHash::from_bytes([1; 32]),
                pool_id: pool,
                shield: 1,
                description: String::new(),
                purchaser: buyer.clone(),
            },
        )
    });
    assert_eq!(err, ShieldError::PurchaseAlreadyExists(TxHash::from_bytes([1; 32])));
    assert_eq!(s.env.balance(&buyer), balance);
}

#[test]
fn fatal_abort_rolls_back_partial_work() {
    let mut s = setup();
    let (provider, buyer) = (s.provider.clone(), s.buyer.clone());
    s.env.undelegate(&provider, "cosmosvaloper1a", 500);
    s.env.advance(22 * DAY, 1000);
    s.env.complete_unbonding();

    let module_before = s.env.module_balance();
    let before = s.env.store.clone();
    let err = s
        .env
        .run(|k, ctx| k.approve_claim(ctx, ProposalId(1), &buyer))
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(err.rejection().is_none());
    assert_eq!(s.env.store, before);
    assert_eq!(s.env.module_balance(), module_before);
}

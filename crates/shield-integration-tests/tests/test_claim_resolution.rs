//! Claim resolution: approval funds the payout from bonded stake and, when
//! bonded stake is short, from unbonding entries; rejection gives the
//! collateral and the coverage back.

use rust_decimal_macros::dec;

use shield_core::{Address, PoolId, ProposalId, TxHash};
use shield_ledger::{ClaimState, PurchaseRequest, ShieldError, TestEnv};

const DAY: i64 = 86_400;
const VALIDATOR: &str = "cosmosvaloper1a";

struct Locked {
    env: TestEnv,
    provider: Address,
    buyer: Address,
    pool: PoolId,
    tx: TxHash,
}

/// Admin 1000 and a provider 500 in one pool, 800 purchased, a 300 loss
/// locked as proposal 1 (200 admin, 100 provider).
fn locked() -> Locked {
    let mut env = TestEnv::new();
    let provider = env.addr("cosmos1provider");
    let buyer = env.addr("cosmos1buyer");
    env.delegate(&provider, VALIDATOR, 500);
    env.fund(&buyer, 100);
    let pool = env.create_pool_with(1000, 90 * DAY, 0);
    let tx = TxHash::from_bytes([9; 32]);
    let loss = env.coins(300);
    env.run(|k, ctx| {
        k.deposit_collateral(ctx, &provider, pool, 500)?;
        k.purchase_shield(
            ctx,
            PurchaseRequest {
                tx_hash: tx,
                pool_id: pool,
                shield: 800,
                description: "bridge coverage".to_string(),
                purchaser: buyer.clone(),
            },
        )?;
        let period = k.claim_params(ctx)?.lock_period_secs;
        k.claim_lock(ctx, ProposalId(1), pool, &loss, &tx, period, &buyer)?;
        Ok(())
    })
    .unwrap();
    Locked {
        env,
        provider,
        buyer,
        pool,
        tx,
    }
}

#[test]
fn approval_draws_on_unbonding_stake_when_bonded_is_short() {
    let mut l = locked();
    let (provider, buyer) = (l.provider.clone(), l.buyer.clone());
    l.env.undelegate(&provider, VALIDATOR, 450);

    let module_before = l.env.module_balance();
    l.env
        .run(|k, ctx| k.approve_claim(ctx, ProposalId(1), &buyer).map(|_| ()))
        .unwrap();
    // 200 from the admin, 50 bonded from the provider; the provider's 450
    // entry now unbonds to the module.
    assert_eq!(l.env.module_balance() - module_before, 250);

    let denom = l.env.denom();
    l.env
        .run(|k, ctx| {
            assert!(k.sorted_unbonding_entries(ctx, &provider)?.is_empty());
            let p = k.provider(ctx, &provider)?.unwrap();
            assert_eq!(p.total_locked, 0);
            assert_eq!(p.delegation_bonded, 0);
            assert_eq!(p.rewards.native.amount_of(&denom), dec!(400));
            // Nothing bonded backs the remaining collateral any more.
            assert_eq!(p.withdrawing, p.collateral);
            Ok(())
        })
        .unwrap();

    l.env.advance(22 * DAY, 1000);
    l.env.complete_unbonding();
    assert_eq!(l.env.module_balance() - module_before, 700);
    assert_eq!(l.env.balance(&provider), 0);
}

#[test]
fn approval_without_any_backing_stake_aborts() {
    let mut l = locked();
    let provider = l.provider.clone();
    l.env.undelegate(&provider, VALIDATOR, 500);
    l.env.advance(22 * DAY, 1000);
    l.env.complete_unbonding();
    assert_eq!(l.env.balance(&provider), 500);

    let before = l.env.store.clone();
    let buyer = l.buyer.clone();
    let err = l
        .env
        .run(|k, ctx| k.approve_claim(ctx, ProposalId(1), &buyer))
        .unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(l.env.store, before);
}

#[test]
fn rejection_restores_collateral_and_coverage() {
    let mut l = locked();
    let (provider, pool, tx) = (l.provider.clone(), l.pool, l.tx);
    let admin = l.env.admin.clone();
    let unlocked = l.env.run(|k, ctx| k.reject_claim(ctx, ProposalId(1))).unwrap();
    assert_eq!(unlocked, 300);

    l.env
        .run(|k, ctx| {
            let p = k.require_pool(ctx, pool)?;
            assert_eq!((p.total_collateral, p.shield), (1500, 1000));
            assert_eq!(k.purchase(ctx, &tx)?.unwrap().shield, 800);
            assert_eq!(k.provider(ctx, &provider)?.unwrap().total_locked, 0);
            assert_eq!(k.provider(ctx, &admin)?.unwrap().collateral, 1000);
            assert_eq!(k.collateral(ctx, pool, &provider)?.unwrap().amount, 500);
            assert!(k.claim(ctx, ProposalId(1))?.unwrap().state.is_terminal());
            Ok(())
        })
        .unwrap();

    let err = l.env.run(|k, ctx| k.reject_claim(ctx, ProposalId(1))).unwrap_err();
    assert!(matches!(err.rejection(), Some(ShieldError::Claim(_))));
}

#[test]
fn reimbursement_is_paid_once() {
    let mut l = locked();
    let buyer = l.buyer.clone();
    l.env
        .run(|k, ctx| k.approve_claim(ctx, ProposalId(1), &buyer).map(|_| ()))
        .unwrap();
    let wait = l
        .env
        .run(|k, ctx| Ok(k.claim_params(ctx)?.payout_period_secs))
        .unwrap();
    let early = l
        .env
        .run(|k, ctx| k.withdraw_reimbursement(ctx, ProposalId(1), &buyer))
        .unwrap_err();
    assert!(matches!(early.rejection(), Some(ShieldError::NotPayoutTime { .. })));

    l.env.advance(wait, 1000);
    let balance_before = l.env.balance(&buyer);
    let paid = l
        .env
        .run(|k, ctx| k.withdraw_reimbursement(ctx, ProposalId(1), &buyer))
        .unwrap();
    assert_eq!(paid, l.env.coins(300));
    assert_eq!(l.env.balance(&buyer) - balance_before, 300);

    let again = l
        .env
        .run(|k, ctx| k.withdraw_reimbursement(ctx, ProposalId(1), &buyer))
        .unwrap_err();
    assert_eq!(again.rejection(), Some(&ShieldError::CompensationNotFound(ProposalId(1))));
    let state = l.env.run(|k, ctx| Ok(k.claim(ctx, ProposalId(1))?.unwrap().state)).unwrap();
    assert_eq!(state, ClaimState::Paid);
}

#[test]
fn loss_larger_than_the_purchase_is_refused() {
    let mut l = locked();
    let (pool, tx, buyer) = (l.pool, l.tx, l.buyer.clone());
    let loss = l.env.coins(501);
    let err = l
        .env
        .run(|k, ctx| k.claim_lock(ctx, ProposalId(2), pool, &loss, &tx, DAY, &buyer))
        .unwrap_err();
    assert_eq!(
        err.rejection(),
        Some(&ShieldError::NotEnoughShield {
            requested: 501,
            available: 500
        })
    );
}

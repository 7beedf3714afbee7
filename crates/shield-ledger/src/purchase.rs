//! # Purchase Ledger
//!
//! A purchase buys `shield` of coverage against a pool for the protection
//! period. The purchaser pays `shield × shield_fees_rate` up front; that fee
//! is held as unaccrued service fees on the purchase and accrues linearly
//! until the protection period ends. Accrued fees are distributed to
//! providers in proportion to their collateral.
//!
//! A purchase stays claimable until its claim period ends, and is removed at
//! the first end block after that unless a locked claim still references it.

use std::collections::BTreeSet;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use shield_core::{Address, Amount, Coins, DecCoins, MixedDecCoins, PoolId, Timestamp, TxHash};
use shield_state::ClaimState;

use crate::bank::{BankKeeper, SHIELD_MODULE_NAME};
use crate::context::Context;
use crate::error::{abort, InvariantViolation, ShieldError, TxResult};
use crate::keeper::{add_amount, Keeper};
use crate::staking::StakingKeeper;
use crate::types::Purchase;

/// A request to buy coverage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseRequest {
    /// Hash of the purchasing transaction; the purchase's key.
    pub tx_hash: TxHash,
    pub pool_id: PoolId,
    pub shield: Amount,
    pub description: String,
    pub purchaser: Address,
}

/// Outcome of one fee pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeeSummary {
    pub accrued: DecCoins,
    pub distributed: DecCoins,
    pub expired: Vec<TxHash>,
}

impl<S: StakingKeeper, B: BankKeeper> Keeper<S, B> {
    pub fn purchase_shield(&self, ctx: &mut Context<'_>, req: PurchaseRequest) -> TxResult<Purchase> {
        ctx.atomic(|ctx| {
            if req.shield == 0 {
                return Err(ShieldError::InvalidAmount("shield must be positive".to_string()).into());
            }
            let pool = self.require_pool(ctx, req.pool_id)?;
            if !pool.active || self.pool_ended(ctx, &pool) {
                return Err(ShieldError::PoolInactive(pool.id).into());
            }
            if self.purchase(ctx, &req.tx_hash)?.is_some() {
                return Err(ShieldError::PurchaseAlreadyExists(req.tx_hash).into());
            }
            let unsold = self.unsold_shield(ctx, &pool)?;
            if req.shield > unsold {
                return Err(ShieldError::NotEnoughShield {
                    requested: req.shield,
                    available: unsold,
                }
                .into());
            }

            let pool_params = self.pool_params(ctx)?;
            let claim_params = self.claim_params(ctx)?;
            let now = ctx.block_time();
            let mut protection_end = add_secs(now, pool_params.protection_period_secs)?;
            if pool.end_time > 0 && pool.end_time < protection_end.epoch_secs() {
                protection_end = Timestamp::from_epoch_secs(pool.end_time)?;
            }
            let claim_period_end = add_secs(protection_end, claim_params.claim_period_secs)?;

            let denom = self.bond_denom().to_string();
            let fee = Decimal::from(req.shield)
                .checked_mul(pool_params.shield_fees_rate)
                .and_then(|f| f.trunc().to_u64())
                .ok_or_else(|| crate::error::overflow("purchase: service fee"))?;
            let fee_coins = Coins::from_coin(&denom, fee)?;
            if !fee_coins.is_zero() {
                self.bank()
                    .send_coins_from_account_to_module(ctx, &req.purchaser, SHIELD_MODULE_NAME, &fee_coins)
                    .map_err(ShieldError::Transfer)?;
                let mut remaining = self.remaining_service_fees(ctx)?;
                remaining.native = remaining.native.checked_add(&DecCoins::from(&fee_coins))?;
                self.set_remaining_service_fees(ctx, &remaining)?;
            }

            let purchase = Purchase {
                tx_hash: req.tx_hash,
                pool_id: pool.id,
                shield: req.shield,
                start_block_height: ctx.block_height(),
                protection_end_time: protection_end,
                claim_period_end_time: claim_period_end,
                purchaser: req.purchaser,
                description: req.description,
                service_fees: DecCoins::from(&fee_coins),
                fees_accrued_until: now,
            };
            self.set_purchase(ctx, &purchase)?;
            tracing::info!(
                tx_hash = %purchase.tx_hash,
                pool_id = %purchase.pool_id,
                shield = purchase.shield,
                fee,
                protection_end = %purchase.protection_end_time,
                "shield purchased"
            );
            Ok(purchase)
        })
    }

    /// Purchases made by one account.
    pub fn purchaser_purchases(&self, ctx: &Context<'_>, purchaser: &Address) -> TxResult<Vec<Purchase>> {
        Ok(self
            .purchases(ctx)?
            .into_iter()
            .filter(|p| &p.purchaser == purchaser)
            .collect())
    }

    /// Accrue service fees up to the block time, distribute everything
    /// accrued so far to providers, and remove expired purchases.
    pub fn remove_expired_purchases_and_distribute_fees(&self, ctx: &mut Context<'_>) -> TxResult<FeeSummary> {
        ctx.atomic(|ctx| {
            let now = ctx.block_time();
            let locked: BTreeSet<TxHash> = self
                .claims(ctx)?
                .into_iter()
                .filter(|c| c.state == ClaimState::Locked)
                .map(|c| c.purchase_tx_hash)
                .collect();
            let mut current = self.service_fees(ctx)?;
            let mut remaining = self.remaining_service_fees(ctx)?;
            let mut summary = FeeSummary::default();

            for mut purchase in self.purchases(ctx)? {
                let accrued = accrue(&mut purchase, now)?;
                let expired = now > purchase.claim_period_end_time && !locked.contains(&purchase.tx_hash);
                // Anything still unaccrued on an expiring purchase is released now.
                let accrued = if expired {
                    let rest = std::mem::take(&mut purchase.service_fees);
                    accrued.checked_add(&rest)?
                } else {
                    accrued
                };
                if !accrued.is_zero() {
                    current.native = current.native.checked_add(&accrued)?;
                    remaining.native = remaining.native.saturating_sub(&accrued);
                    summary.accrued = summary.accrued.checked_add(&accrued)?;
                }
                if expired {
                    self.delete_purchase(ctx, &purchase);
                    tracing::debug!(tx_hash = %purchase.tx_hash, pool_id = %purchase.pool_id, "purchase expired");
                    summary.expired.push(purchase.tx_hash);
                } else {
                    self.set_purchase(ctx, &purchase)?;
                }
            }

            summary.distributed = self.distribute_fees(ctx, &current.native)?;
            current.native = current.native.saturating_sub(&summary.distributed);
            self.set_service_fees(ctx, &current)?;
            self.set_remaining_service_fees(ctx, &remaining)?;
            Ok(summary)
        })
    }

    /// Credit `fees` to providers pro rata to their collateral. Returns
    /// what was handed out.
    fn distribute_fees(&self, ctx: &mut Context<'_>, fees: &DecCoins) -> TxResult<DecCoins> {
        if fees.is_zero() {
            return Ok(DecCoins::new());
        }
        let providers: Vec<_> = self
            .providers(ctx)?
            .into_iter()
            .filter(|p| p.collateral > 0)
            .collect();
        let total = providers
            .iter()
            .try_fold(0u64, |acc, p| add_amount(acc, p.collateral, "distribute_fees: total"))?;
        if total == 0 {
            return Ok(DecCoins::new());
        }
        let mut distributed = DecCoins::new();
        for provider in providers {
            let share = fees.mul_ratio(provider.collateral, total)?;
            if share.is_zero() {
                continue;
            }
            self.add_rewards(ctx, &provider.address, &MixedDecCoins::native(share.clone()))?;
            tracing::debug!(provider = %provider.address, share = ?share, "service fees distributed");
            distributed = distributed.checked_add(&share)?;
        }
        Ok(distributed)
    }
}

fn add_secs(base: Timestamp, secs: i64) -> TxResult<Timestamp> {
    base.checked_add_secs(secs)
        .ok_or_else(|| abort(InvariantViolation::TimeOverflow { base, secs }))
}

/// Move the linear share of unaccrued fees for the elapsed part of the
/// protection window out of the purchase.
fn accrue(purchase: &mut Purchase, now: Timestamp) -> TxResult<DecCoins> {
    let end = purchase.protection_end_time;
    let from = purchase.fees_accrued_until;
    if purchase.service_fees.is_zero() || from >= end || now <= from {
        return Ok(DecCoins::new());
    }
    let until = if now < end { now } else { end };
    let elapsed = until.secs_since(from);
    let window = end.secs_since(from);
    let accrued = if elapsed >= window {
        purchase.service_fees.clone()
    } else {
        let elapsed = u64::try_from(elapsed).unwrap_or(0);
        let window = u64::try_from(window).unwrap_or(1);
        purchase.service_fees.mul_ratio(elapsed, window)?
    };
    purchase.service_fees = purchase.service_fees.saturating_sub(&accrued);
    purchase.fees_accrued_until = until;
    Ok(accrued)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::TestEnv;
    use rust_decimal_macros::dec;

    const DAY: i64 = 86_400;

    fn hash(n: u8) -> TxHash {
        TxHash::from_bytes([n; 32])
    }

    fn request(pool_id: PoolId, purchaser: &Address, n: u8, shield: Amount) -> PurchaseRequest {
        PurchaseRequest {
            tx_hash: hash(n),
            pool_id,
            shield,
            description: format!("purchase {n}"),
            purchaser: purchaser.clone(),
        }
    }

    #[test]
    fn purchase_charges_fee_and_sets_windows() {
        let mut env = TestEnv::new();
        let buyer = env.addr("cosmos1buyer");
        env.fund(&buyer, 100);
        let pool = env.create_pool_with(10_000, 90 * DAY, 0);
        let purchase = env
            .run(|k, ctx| k.purchase_shield(ctx, request(pool, &buyer, 1, 1000)))
            .unwrap();
        let denom = env.denom();
        // 1000 × 0.00769 = 7.69, truncated.
        assert_eq!(env.balance(&buyer), 93);
        assert_eq!(purchase.service_fees.amount_of(&denom), dec!(7));
        let start = env.header.time;
        assert_eq!(purchase.protection_end_time.secs_since(start), 21 * DAY);
        assert_eq!(purchase.claim_period_end_time.secs_since(start), 42 * DAY);
        let remaining = env.run(|k, ctx| k.remaining_service_fees(ctx)).unwrap();
        assert_eq!(remaining.native.amount_of(&denom), dec!(7));
    }

    #[test]
    fn protection_is_capped_by_pool_end() {
        let mut env = TestEnv::new();
        let buyer = env.addr("cosmos1buyer");
        env.fund(&buyer, 100);
        let pool = env.create_pool_with(10_000, 60 * DAY, 0);
        env.advance(50 * DAY, 10);
        let purchase = env
            .run(|k, ctx| k.purchase_shield(ctx, request(pool, &buyer, 1, 100)))
            .unwrap();
        assert_eq!(purchase.protection_end_time.secs_since(env.header.time), 10 * DAY);
    }

    #[test]
    fn purchase_rejections() {
        let mut env = TestEnv::new();
        let admin = env.admin.clone();
        let buyer = env.addr("cosmos1buyer");
        env.fund(&buyer, 1000);
        let pool = env.create_pool_with(1000, 90 * DAY, 0);
        env.run(|k, ctx| {
            k.purchase_shield(ctx, request(pool, &buyer, 1, 600))?;
            let err = k.purchase_shield(ctx, request(pool, &buyer, 1, 1)).unwrap_err();
            assert_eq!(err.rejection(), Some(&ShieldError::PurchaseAlreadyExists(hash(1))));
            let err = k.purchase_shield(ctx, request(pool, &buyer, 2, 401)).unwrap_err();
            assert_eq!(
                err.rejection(),
                Some(&ShieldError::NotEnoughShield { requested: 401, available: 400 })
            );
            k.pause_pool(ctx, &admin, pool)?;
            let err = k.purchase_shield(ctx, request(pool, &buyer, 3, 1)).unwrap_err();
            assert_eq!(err.rejection(), Some(&ShieldError::PoolInactive(pool)));
            let err = k.purchase_shield(ctx, request(PoolId(42), &buyer, 4, 1)).unwrap_err();
            assert_eq!(err.rejection(), Some(&ShieldError::NoPoolFound(PoolId(42))));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn unfunded_purchaser_is_rejected_without_side_effects() {
        let mut env = TestEnv::new();
        let buyer = env.addr("cosmos1buyer");
        let pool = env.create_pool_with(10_000, 90 * DAY, 0);
        let before = env.store.clone();
        let err = env
            .run(|k, ctx| k.purchase_shield(ctx, request(pool, &buyer, 1, 1000)))
            .unwrap_err();
        assert!(matches!(err.rejection(), Some(ShieldError::Transfer(_))));
        assert_eq!(env.store, before);
    }

    #[test]
    fn fees_accrue_linearly_and_go_to_providers() {
        let mut env = TestEnv::new();
        let denom = env.denom();
        let admin = env.admin.clone();
        let buyer = env.addr("cosmos1buyer");
        env.fund(&buyer, 10_000);
        let pool = env.create_pool_with(100_000, 90 * DAY, 0);
        // 100_000 × 0.00769 = 769, accrued over 21 days.
        env.run(|k, ctx| k.purchase_shield(ctx, request(pool, &buyer, 1, 100_000)).map(|_| ()))
            .unwrap();
        // A quarter of the protection window.
        env.advance(21 * DAY / 4, 1);
        let summary = env
            .run(|k, ctx| k.remove_expired_purchases_and_distribute_fees(ctx))
            .unwrap();
        assert_eq!(summary.accrued.amount_of(&denom), dec!(192.25));
        assert_eq!(summary.distributed, summary.accrued);
        assert!(summary.expired.is_empty());
        env.run(|k, ctx| {
            let rewards = k.provider(ctx, &admin)?.unwrap().rewards.native;
            assert_eq!(rewards.amount_of(&denom), dec!(192.25));
            assert_eq!(k.remaining_service_fees(ctx)?.native.amount_of(&denom), dec!(576.75));
            assert!(k.service_fees(ctx)?.is_zero());
            let purchase = k.purchase(ctx, &hash(1))?.unwrap();
            assert_eq!(purchase.service_fees.amount_of(&denom), dec!(576.75));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn expired_purchase_is_removed_unless_claim_locked() {
        let mut env = TestEnv::new();
        let denom = env.denom();
        let buyer = env.addr("cosmos1buyer");
        env.fund(&buyer, 10_000);
        let pool = env.create_pool_with(100_000, 90 * DAY, 0);
        env.run(|k, ctx| k.purchase_shield(ctx, request(pool, &buyer, 1, 1000)).map(|_| ()))
            .unwrap();
        env.advance(42 * DAY + 1, 1);
        let summary = env
            .run(|k, ctx| k.remove_expired_purchases_and_distribute_fees(ctx))
            .unwrap();
        assert_eq!(summary.expired, vec![hash(1)]);
        assert_eq!(summary.accrued.amount_of(&denom), dec!(7));
        env.run(|k, ctx| {
            assert!(k.purchase(ctx, &hash(1))?.is_none());
            assert!(k.pool_purchases(ctx, pool)?.is_empty());
            assert!(k.remaining_service_fees(ctx)?.is_zero());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn purchaser_purchases_filters_by_account() {
        let mut env = TestEnv::new();
        let a = env.addr("cosmos1a");
        let b = env.addr("cosmos1b");
        env.fund(&a, 100);
        env.fund(&b, 100);
        let pool = env.create_pool_with(10_000, 90 * DAY, 0);
        env.run(|k, ctx| {
            k.purchase_shield(ctx, request(pool, &a, 1, 100))?;
            k.purchase_shield(ctx, request(pool, &b, 2, 100))?;
            k.purchase_shield(ctx, request(pool, &a, 3, 100))?;
            let hashes: Vec<_> = k.purchaser_purchases(ctx, &a)?.into_iter().map(|p| p.tx_hash).collect();
            assert_eq!(hashes, vec![hash(1), hash(3)]);
            assert_eq!(k.pool_purchases(ctx, pool)?.len(), 3);
            Ok(())
        })
        .unwrap();
    }
}

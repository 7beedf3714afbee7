//! # Collateral Store
//!
//! One record per (pool, provider). Depositing pledges available stake to a
//! pool; withdrawing queues part of the position for release after the
//! withdraw period. Amounts locked against claims are carried inside the
//! record as `locked_collaterals` and are no longer part of `amount`.

use shield_core::{Address, Amount, PoolId, Timestamp};

use crate::bank::BankKeeper;
use crate::context::Context;
use crate::error::{abort, InvariantViolation, ShieldError, TxResult};
use crate::keeper::{add_amount, sub_amount, Keeper};
use crate::staking::StakingKeeper;
use crate::types::{Collateral, Withdrawal};

impl<S: StakingKeeper, B: BankKeeper> Keeper<S, B> {
    /// Pledge `amount` of the provider's available stake to a pool.
    pub fn deposit_collateral(
        &self,
        ctx: &mut Context<'_>,
        provider: &Address,
        pool_id: PoolId,
        amount: Amount,
    ) -> TxResult<Collateral> {
        ctx.atomic(|ctx| {
            let mut pool = self.require_pool(ctx, pool_id)?;
            if amount == 0 {
                return Err(ShieldError::InvalidAmount("collateral deposit must be positive".to_string()).into());
            }
            let mut record = self.add_provider(ctx, provider)?;
            if amount > record.available {
                return Err(ShieldError::InsufficientStaking {
                    provider: provider.clone(),
                    available: record.available,
                    requested: amount,
                }
                .into());
            }
            let mut collateral = self
                .collateral(ctx, pool_id, provider)?
                .unwrap_or_else(|| Collateral::new(pool_id, provider.clone(), 0));
            collateral.amount = add_amount(collateral.amount, amount, "deposit: collateral")?;
            pool.total_collateral = add_amount(pool.total_collateral, amount, "deposit: pool total")?;
            record.available -= amount;
            record.collateral = add_amount(record.collateral, amount, "deposit: provider collateral")?;

            self.set_collateral(ctx, &collateral)?;
            self.set_pool(ctx, &pool)?;
            self.set_provider(ctx, &record)?;
            tracing::debug!(pool_id = %pool_id, provider = %provider, amount, "collateral deposited");
            Ok(collateral)
        })
    }

    /// Request withdrawal of `amount` from a position. Returns the time the
    /// withdrawal completes.
    ///
    /// Collateral that is not being withdrawn must keep covering the pool's
    /// shield, so a request that would leave less is rejected.
    pub fn withdraw_collateral(
        &self,
        ctx: &mut Context<'_>,
        provider: &Address,
        pool_id: PoolId,
        amount: Amount,
    ) -> TxResult<Timestamp> {
        ctx.atomic(|ctx| {
            let completion_time = self.queue_withdrawal(ctx, provider, pool_id, amount)?;
            let pool = self.require_pool(ctx, pool_id)?;
            let backing = pool.total_collateral.saturating_sub(self.pool_withdrawing(ctx, pool_id)?);
            if backing < pool.shield {
                return Err(ShieldError::ShieldUnbacked {
                    pool_id,
                    requested: amount,
                    free: backing.saturating_add(amount).saturating_sub(pool.shield),
                }
                .into());
            }
            Ok(completion_time)
        })
    }

    /// Collateral of a pool queued for withdrawal.
    pub(crate) fn pool_withdrawing(&self, ctx: &Context<'_>, pool_id: PoolId) -> TxResult<Amount> {
        self.pool_collaterals(ctx, pool_id)?
            .iter()
            .try_fold(0, |acc, c| add_amount(acc, c.withdrawing, "pool withdrawing"))
    }

    pub(crate) fn queue_withdrawal(
        &self,
        ctx: &mut Context<'_>,
        provider: &Address,
        pool_id: PoolId,
        amount: Amount,
    ) -> TxResult<Timestamp> {
        let mut collateral = self
            .collateral(ctx, pool_id, provider)?
            .ok_or_else(|| ShieldError::NoCollateralFound {
                pool_id,
                provider: provider.clone(),
            })?;
        if amount == 0 {
            return Err(ShieldError::InvalidAmount("withdrawal must be positive".to_string()).into());
        }
        if amount > collateral.withdrawable() {
            return Err(ShieldError::OverWithdrawal {
                requested: amount,
                withdrawable: collateral.withdrawable(),
            }
            .into());
        }
        let mut record = self.locked_provider(ctx, provider)?;
        let now = ctx.block_time();
        let period = self.pool_params(ctx)?.withdraw_period_secs;
        let completion_time = now
            .checked_add_secs(period)
            .ok_or_else(|| abort(InvariantViolation::TimeOverflow { base: now, secs: period }))?;

        collateral.withdrawing += amount;
        record.withdrawing = add_amount(record.withdrawing, amount, "withdraw: provider withdrawing")?;
        self.set_collateral(ctx, &collateral)?;
        self.set_provider(ctx, &record)?;
        self.insert_withdrawal(
            ctx,
            &Withdrawal {
                pool_id,
                provider: provider.clone(),
                amount,
                completion_time,
            },
        )?;
        tracing::debug!(
            pool_id = %pool_id,
            provider = %provider,
            amount,
            completion_time = %completion_time,
            "withdrawal queued"
        );
        Ok(completion_time)
    }

    /// Release every position in a closing pool back to its provider.
    pub(crate) fn free_collaterals(&self, ctx: &mut Context<'_>, pool_id: PoolId) -> TxResult<()> {
        for collateral in self.pool_collaterals(ctx, pool_id)? {
            let mut record = self.locked_provider(ctx, &collateral.provider)?;
            record.collateral = sub_amount(record.collateral, collateral.amount, "free: provider collateral")?;
            record.withdrawing = record.withdrawing.saturating_sub(collateral.withdrawing);
            record.recompute_available();
            self.set_provider(ctx, &record)?;
            self.delete_collateral(ctx, pool_id, &collateral.provider);
            tracing::debug!(
                pool_id = %pool_id,
                provider = %collateral.provider,
                amount = collateral.amount,
                "collateral freed"
            );
        }
        Ok(())
    }
}

//! # Withdrawal Queue
//!
//! Withdrawals are stored in time slices keyed by completion time, so the
//! matured prefix of the queue is one range scan. Completing a withdrawal
//! removes the amount from the position and returns it to the provider's
//! available stake.

use shield_core::PoolId;

use crate::bank::BankKeeper;
use crate::context::Context;
use crate::error::TxResult;
use crate::keeper::{load, save, scan, sub_amount, Keeper};
use crate::keys;
use crate::staking::StakingKeeper;
use crate::store::prefix_end;
use crate::types::Withdrawal;

impl<S: StakingKeeper, B: BankKeeper> Keeper<S, B> {
    /// Append to the time slice at the withdrawal's completion time.
    pub fn insert_withdrawal(&self, ctx: &mut Context<'_>, withdrawal: &Withdrawal) -> TxResult<()> {
        let key = keys::withdraw_queue_key(withdrawal.completion_time);
        let mut slice: Vec<Withdrawal> = load(ctx, &key)?.unwrap_or_default();
        slice.push(withdrawal.clone());
        save(ctx, key, &slice)
    }

    /// The whole queue, soonest first.
    pub fn withdrawal_queue(&self, ctx: &Context<'_>) -> TxResult<Vec<Withdrawal>> {
        let slices: Vec<Vec<Withdrawal>> = scan(ctx, &[keys::WITHDRAW_QUEUE_PREFIX])?;
        Ok(slices.into_iter().flatten().collect())
    }

    /// Complete every withdrawal due at or before the block time. Returns
    /// how many were completed.
    pub fn dequeue_completed_withdrawals(&self, ctx: &mut Context<'_>) -> TxResult<usize> {
        ctx.atomic(|ctx| {
            let end = prefix_end(&keys::withdraw_queue_key(ctx.block_time()));
            let matured = ctx.store().range(&[keys::WITHDRAW_QUEUE_PREFIX], end.as_deref());
            let mut completed = 0;
            for (key, _) in matured {
                let slice: Vec<Withdrawal> = load(ctx, &key)?.unwrap_or_default();
                ctx.store_mut().delete(&key);
                for withdrawal in slice {
                    if self.complete_withdrawal(ctx, &withdrawal)? {
                        completed += 1;
                    }
                }
            }
            Ok(completed)
        })
    }

    fn complete_withdrawal(&self, ctx: &mut Context<'_>, withdrawal: &Withdrawal) -> TxResult<bool> {
        let pool_id: PoolId = withdrawal.pool_id;
        let (Some(mut pool), Some(mut collateral)) = (
            self.pool(ctx, pool_id)?,
            self.collateral(ctx, pool_id, &withdrawal.provider)?,
        ) else {
            tracing::warn!(
                pool_id = %pool_id,
                provider = %withdrawal.provider,
                amount = withdrawal.amount,
                "skipping withdrawal for closed pool"
            );
            return Ok(false);
        };
        let mut provider = self.locked_provider(ctx, &withdrawal.provider)?;

        // A lock may have shrunk the position since the request.
        let amount = withdrawal.amount.min(collateral.withdrawing);
        collateral.withdrawing -= amount;
        collateral.amount = sub_amount(collateral.amount, amount, "withdrawal: collateral")?;
        pool.total_collateral = sub_amount(pool.total_collateral, amount, "withdrawal: pool total")?;
        provider.collateral = sub_amount(provider.collateral, amount, "withdrawal: provider collateral")?;
        provider.withdrawing = provider.withdrawing.saturating_sub(amount);
        provider.recompute_available();

        if collateral.amount == 0 && collateral.locked_collaterals.is_empty() {
            self.delete_collateral(ctx, pool_id, &withdrawal.provider);
        } else {
            self.set_collateral(ctx, &collateral)?;
        }
        self.set_pool(ctx, &pool)?;
        self.set_provider(ctx, &provider)?;
        tracing::debug!(
            pool_id = %pool_id,
            provider = %withdrawal.provider,
            requested = withdrawal.amount,
            amount,
            "withdrawal completed"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::TestEnv;
    use shield_core::Address;

    const DAY: i64 = 86_400;

    #[test]
    fn queue_is_time_ordered() {
        let mut env = TestEnv::new();
        let p = env.addr("cosmos1prov");
        env.run(|k, ctx| {
            let now = ctx.block_time();
            for (secs, amount) in [(30, 3), (10, 1), (20, 2), (10, 4)] {
                k.insert_withdrawal(
                    ctx,
                    &Withdrawal {
                        pool_id: PoolId(1),
                        provider: p.clone(),
                        amount,
                        completion_time: now.checked_add_secs(secs).unwrap(),
                    },
                )?;
            }
            let amounts: Vec<_> = k.withdrawal_queue(ctx)?.iter().map(|w| w.amount).collect();
            assert_eq!(amounts, vec![1, 4, 2, 3]);
            Ok(())
        })
        .unwrap();
    }

    fn setup() -> (TestEnv, Address, PoolId) {
        let mut env = TestEnv::new();
        let p = env.addr("cosmos1prov");
        env.delegate(&p, "cosmosvaloper1a", 1000);
        let pool = env.create_pool_with(100, 90 * DAY, 0);
        env.run(|k, ctx| k.deposit_collateral(ctx, &p, pool, 400).map(|_| ()))
            .unwrap();
        (env, p, pool)
    }

    #[test]
    fn matured_withdrawals_release_collateral() {
        let (mut env, p, pool) = setup();
        let period = env.run(|k, ctx| k.pool_params(ctx)).unwrap().withdraw_period_secs;
        env.run(|k, ctx| k.withdraw_collateral(ctx, &p, pool, 150).map(|_| ()))
            .unwrap();

        env.advance(period - 1, 1);
        assert_eq!(env.run(|k, ctx| k.dequeue_completed_withdrawals(ctx)).unwrap(), 0);

        env.advance(1, 1);
        assert_eq!(env.run(|k, ctx| k.dequeue_completed_withdrawals(ctx)).unwrap(), 1);
        env.run(|k, ctx| {
            let c = k.collateral(ctx, pool, &p)?.unwrap();
            assert_eq!((c.amount, c.withdrawing), (250, 0));
            assert_eq!(k.require_pool(ctx, pool)?.total_collateral, 350);
            let provider = k.provider(ctx, &p)?.unwrap();
            assert_eq!(provider.collateral, 250);
            assert_eq!(provider.withdrawing, 0);
            assert_eq!(provider.available, 750);
            assert!(k.withdrawal_queue(ctx)?.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn full_withdrawal_removes_position() {
        let (mut env, p, pool) = setup();
        let period = env.run(|k, ctx| k.pool_params(ctx)).unwrap().withdraw_period_secs;
        env.run(|k, ctx| k.withdraw_collateral(ctx, &p, pool, 400).map(|_| ()))
            .unwrap();
        env.advance(period, 1);
        env.run(|k, ctx| {
            k.dequeue_completed_withdrawals(ctx)?;
            assert!(k.collateral(ctx, pool, &p)?.is_none());
            assert_eq!(k.provider(ctx, &p)?.unwrap().available, 1000);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn withdrawal_for_closed_pool_is_skipped() {
        let mut env = TestEnv::new();
        let p = env.addr("cosmos1prov");
        env.delegate(&p, "cosmosvaloper1a", 1000);
        let pool = env.create_pool_with(100, 60 * DAY, 0);
        env.run(|k, ctx| {
            k.deposit_collateral(ctx, &p, pool, 400)?;
            k.withdraw_collateral(ctx, &p, pool, 100)?;
            Ok(())
        })
        .unwrap();
        env.advance(60 * DAY + 1, 1);
        env.run(|k, ctx| {
            assert_eq!(k.close_pools(ctx)?, vec![pool]);
            assert_eq!(k.dequeue_completed_withdrawals(ctx)?, 0);
            let provider = k.provider(ctx, &p)?.unwrap();
            assert_eq!(provider.collateral, 0);
            assert_eq!(provider.withdrawing, 0);
            assert_eq!(provider.available, 1000);
            Ok(())
        })
        .unwrap();
    }
}

//! # Block Lifecycle
//!
//! `begin_block` applies the one-time staking rate migration. `end_block`
//! runs the periodic work in a fixed order:
//!
//! 1. complete matured collateral withdrawals,
//! 2. accrue and distribute service fees and drop expired purchases,
//! 3. close ended pools that no longer back anything.
//!
//! Withdrawals complete before pool closure so that a position withdrawn in
//! the closing block is settled by the queue rather than freed twice.

use shield_core::{DecCoins, PoolId, TxHash};

use crate::bank::BankKeeper;
use crate::context::Context;
use crate::error::TxResult;
use crate::keeper::Keeper;
use crate::staking::StakingKeeper;

/// What one `end_block` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndBlockSummary {
    pub withdrawals_completed: usize,
    pub fees_accrued: DecCoins,
    pub fees_distributed: DecCoins,
    pub purchases_expired: Vec<TxHash>,
    pub pools_closed: Vec<PoolId>,
}

impl<S: StakingKeeper, B: BankKeeper> Keeper<S, B> {
    /// Apply the configured staking rate migration when its height is
    /// reached. Returns whether it ran.
    pub fn begin_block(&self, ctx: &mut Context<'_>) -> TxResult<bool> {
        let Some(migration) = self.staking_rate_migration().cloned() else {
            return Ok(false);
        };
        if ctx.block_height() != migration.height {
            return Ok(false);
        }
        ctx.atomic(|ctx| {
            let previous = self.shield_staking_rate(ctx)?;
            self.set_shield_staking_rate(ctx, migration.rate)?;
            tracing::info!(
                height = migration.height,
                %previous,
                rate = %migration.rate,
                "shield staking rate migrated"
            );
            Ok(true)
        })
    }

    pub fn end_block(&self, ctx: &mut Context<'_>) -> TxResult<EndBlockSummary> {
        ctx.atomic(|ctx| {
            let withdrawals_completed = self.dequeue_completed_withdrawals(ctx)?;
            let fees = self.remove_expired_purchases_and_distribute_fees(ctx)?;
            let pools_closed = self.close_pools(ctx)?;
            let summary = EndBlockSummary {
                withdrawals_completed,
                fees_accrued: fees.accrued,
                fees_distributed: fees.distributed,
                purchases_expired: fees.expired,
                pools_closed,
            };
            tracing::debug!(
                height = ctx.block_height(),
                withdrawals = summary.withdrawals_completed,
                expired = summary.purchases_expired.len(),
                closed = summary.pools_closed.len(),
                "end block"
            );
            Ok(summary)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::TestEnv;
    use crate::params::StakingRateMigration;
    use rust_decimal_macros::dec;

    const DAY: i64 = 86_400;

    #[test]
    fn migration_runs_once_at_its_height() {
        let mut env = TestEnv::new();
        env.set_staking_rate_migration(StakingRateMigration {
            height: env.header.height + 2,
            rate: dec!(1.5),
        });
        assert!(!env.run(|k, ctx| k.begin_block(ctx)).unwrap());
        env.advance(5, 1);
        assert!(!env.run(|k, ctx| k.begin_block(ctx)).unwrap());
        env.advance(5, 1);
        assert!(env.run(|k, ctx| k.begin_block(ctx)).unwrap());
        assert_eq!(env.run(|k, ctx| k.shield_staking_rate(ctx)).unwrap(), dec!(1.5));
        env.advance(5, 1);
        assert!(!env.run(|k, ctx| k.begin_block(ctx)).unwrap());
    }

    #[test]
    fn no_migration_configured() {
        let mut env = TestEnv::new();
        assert!(!env.run(|k, ctx| k.begin_block(ctx)).unwrap());
        assert_eq!(env.run(|k, ctx| k.shield_staking_rate(ctx)).unwrap(), dec!(2));
    }

    #[test]
    fn quiet_block_does_nothing() {
        let mut env = TestEnv::new();
        env.create_default_pool(1000);
        let before = env.store.clone();
        let summary = env.run(|k, ctx| k.end_block(ctx)).unwrap();
        assert_eq!(summary, EndBlockSummary::default());
        assert_eq!(env.store, before);
    }

    #[test]
    fn withdrawals_settle_before_the_pool_closes() {
        let mut env = TestEnv::new();
        let p = env.addr("cosmos1prov");
        env.delegate(&p, "cosmosvaloper1a", 400);
        let pool = env.create_default_pool(1000);
        env.run(|k, ctx| {
            k.deposit_collateral(ctx, &p, pool, 400)?;
            k.withdraw_collateral(ctx, &p, pool, 150)?;
            Ok(())
        })
        .unwrap();

        env.advance(30 * DAY, 1);
        let summary = env.run(|k, ctx| k.end_block(ctx)).unwrap();
        assert_eq!(summary.withdrawals_completed, 1);
        assert!(summary.pools_closed.is_empty());
        env.run(|k, ctx| {
            assert_eq!(k.collateral(ctx, pool, &p)?.unwrap().amount, 250);
            let prov = k.provider(ctx, &p)?.unwrap();
            assert_eq!((prov.collateral, prov.available, prov.withdrawing), (250, 150, 0));
            Ok(())
        })
        .unwrap();

        env.advance(31 * DAY, 1);
        let summary = env.run(|k, ctx| k.end_block(ctx)).unwrap();
        assert_eq!(summary.pools_closed, vec![pool]);
        env.run(|k, ctx| {
            assert!(k.pool(ctx, pool)?.is_none());
            assert!(k.pool_collaterals(ctx, pool)?.is_empty());
            let prov = k.provider(ctx, &p)?.unwrap();
            assert_eq!((prov.collateral, prov.available), (0, 400));
            Ok(())
        })
        .unwrap();
    }
}

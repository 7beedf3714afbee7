//! # Pool Ledger
//!
//! Pools are created and maintained by the shield admin, who backs each
//! pool's initial shield with their own stake. Coverage ends at a block time
//! or at a block height; the other bound stays zero.
//!
//! ## Lifecycle
//!
//! ```text
//!   create_pool ──▶ ACTIVE ◀──▶ PAUSED
//!                      │
//!                      ▼ pool_ended, no purchases, no locked claims
//!                   CLOSED (records deleted, collateral freed)
//! ```

use shield_core::{Address, Amount, MixedCoins, MixedDecCoins, PoolId};
use shield_state::ClaimState;

use crate::bank::{BankKeeper, SHIELD_MODULE_NAME};
use crate::context::Context;
use crate::error::{abort, InvariantViolation, ShieldError, TxResult};
use crate::keeper::{add_amount, Keeper};
use crate::params::{PoolParams, SECONDS_PER_BLOCK};
use crate::staking::StakingKeeper;
use crate::types::{Collateral, Pool};

/// Coverage must exceed `min_pool_life`, measured in seconds or in blocks
/// at [`SECONDS_PER_BLOCK`].
pub fn validate_pool_duration(params: &PoolParams, time_secs: i64, blocks: i64) -> Result<(), ShieldError> {
    let block_secs = blocks.saturating_mul(SECONDS_PER_BLOCK);
    if time_secs > params.min_pool_life_secs || block_secs > params.min_pool_life_secs {
        return Ok(());
    }
    Err(ShieldError::PoolLifeTooShort {
        coverage_secs: time_secs.max(block_secs),
        min_secs: params.min_pool_life_secs,
    })
}

/// Admin request to open a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePoolRequest {
    pub creator: Address,
    pub shield: Amount,
    pub deposit: MixedCoins,
    pub sponsor: String,
    pub sponsor_addr: Address,
    pub description: String,
    /// Seconds of coverage. Takes precedence over `blocks_of_coverage`.
    pub time_of_coverage_secs: i64,
    pub blocks_of_coverage: u64,
}

/// Admin request to add shield, premium or coverage to a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePoolRequest {
    pub updater: Address,
    pub pool_id: PoolId,
    pub shield: Amount,
    pub deposit: MixedCoins,
    pub additional_time_secs: i64,
    pub additional_blocks: u64,
    pub description: Option<String>,
}

impl<S: StakingKeeper, B: BankKeeper> Keeper<S, B> {
    /// Open a pool backed by the admin's stake.
    pub fn create_pool(&self, ctx: &mut Context<'_>, req: CreatePoolRequest) -> TxResult<Pool> {
        ctx.atomic(|ctx| {
            let admin = self.require_admin(ctx, &req.creator)?;
            if req.shield == 0 {
                return Err(ShieldError::InvalidAmount("pool shield must be positive".to_string()).into());
            }
            if req.time_of_coverage_secs < 0 {
                return Err(ShieldError::InvalidAmount("coverage time must not be negative".to_string()).into());
            }
            let blocks = i64::try_from(req.blocks_of_coverage)
                .map_err(|_| ShieldError::InvalidAmount("coverage blocks out of range".to_string()))?;
            let (time_secs, blocks) = if req.time_of_coverage_secs > 0 {
                (req.time_of_coverage_secs, 0)
            } else {
                (0, blocks)
            };
            validate_pool_duration(&self.pool_params(ctx)?, time_secs, blocks)?;

            let mut provider = self.add_provider(ctx, &admin)?;
            if req.shield > provider.available {
                return Err(ShieldError::InsufficientStaking {
                    provider: admin,
                    available: provider.available,
                    requested: req.shield,
                }
                .into());
            }
            provider.available -= req.shield;
            provider.collateral = add_amount(provider.collateral, req.shield, "create_pool: provider collateral")?;

            let now = ctx.block_time();
            let start_block_height = ctx.block_height();
            let end_time = if time_secs > 0 {
                now.epoch_secs().checked_add(time_secs).ok_or_else(|| {
                    abort(InvariantViolation::TimeOverflow { base: now, secs: time_secs })
                })?
            } else {
                0
            };
            let end_block_height = if time_secs == 0 {
                add_amount(start_block_height, req.blocks_of_coverage, "create_pool: end height")?
            } else {
                0
            };

            let id = self.next_pool_id(ctx)?;
            let next = id.next().ok_or_else(|| crate::error::overflow("create_pool: pool id"))?;
            let pool = Pool {
                id,
                active: true,
                description: req.description,
                sponsor: req.sponsor,
                sponsor_addr: req.sponsor_addr,
                premium: MixedDecCoins::from(&req.deposit),
                total_collateral: req.shield,
                shield: req.shield,
                start_block_height,
                end_time,
                end_block_height,
            };
            self.deposit_native_premium(ctx, &req.creator, &req.deposit)?;
            self.set_pool(ctx, &pool)?;
            self.set_next_pool_id(ctx, next)?;
            self.set_provider(ctx, &provider)?;
            self.set_collateral(ctx, &Collateral::new(id, admin, req.shield))?;
            tracing::info!(
                pool_id = %pool.id,
                sponsor = %pool.sponsor,
                shield = pool.shield,
                end_time = pool.end_time,
                end_block_height = pool.end_block_height,
                "pool created"
            );
            Ok(pool)
        })
    }

    /// Add shield, premium or coverage to an existing pool.
    pub fn update_pool(&self, ctx: &mut Context<'_>, req: UpdatePoolRequest) -> TxResult<Pool> {
        ctx.atomic(|ctx| {
            let admin = self.require_admin(ctx, &req.updater)?;
            let mut provider = self
                .provider(ctx, &admin)?
                .ok_or_else(|| ShieldError::ProviderNotFound(admin.clone()))?;
            if req.shield > provider.available {
                return Err(ShieldError::InsufficientStaking {
                    provider: admin,
                    available: provider.available,
                    requested: req.shield,
                }
                .into());
            }
            if req.additional_time_secs < 0 {
                return Err(ShieldError::InvalidAmount("additional time must not be negative".to_string()).into());
            }
            let additional_blocks = i64::try_from(req.additional_blocks)
                .map_err(|_| ShieldError::InvalidAmount("additional blocks out of range".to_string()))?;
            let mut pool = self.require_pool(ctx, req.pool_id)?;

            let now_secs = ctx.block_time().epoch_secs();
            let height = i64::try_from(ctx.block_height()).unwrap_or(i64::MAX);
            let end_height = i64::try_from(pool.end_block_height).unwrap_or(i64::MAX);
            let new_time = req
                .additional_time_secs
                .saturating_add(pool.end_time)
                .saturating_sub(now_secs);
            let new_blocks = additional_blocks.saturating_add(end_height).saturating_sub(height);
            validate_pool_duration(&self.pool_params(ctx)?, new_time, new_blocks)?;

            if req.additional_time_secs != 0 {
                if pool.end_time == 0 {
                    return Err(ShieldError::CannotExtend { pool_id: pool.id, dimension: "time" }.into());
                }
                pool.end_time = pool
                    .end_time
                    .checked_add(req.additional_time_secs)
                    .ok_or_else(|| crate::error::overflow("update_pool: end time"))?;
            } else if req.additional_blocks != 0 {
                if pool.end_block_height == 0 {
                    return Err(ShieldError::CannotExtend { pool_id: pool.id, dimension: "blocks" }.into());
                }
                pool.end_block_height = add_amount(pool.end_block_height, req.additional_blocks, "update_pool: end height")?;
            }

            pool.total_collateral = add_amount(pool.total_collateral, req.shield, "update_pool: total collateral")?;
            pool.shield = add_amount(pool.shield, req.shield, "update_pool: shield")?;
            pool.premium = pool.premium.checked_add(&MixedDecCoins::from(&req.deposit))?;
            if let Some(description) = req.description {
                pool.description = description;
            }
            let mut collateral = self
                .collateral(ctx, pool.id, &admin)?
                .unwrap_or_else(|| Collateral::new(pool.id, admin.clone(), 0));
            collateral.amount = add_amount(collateral.amount, req.shield, "update_pool: admin collateral")?;
            provider.available -= req.shield;
            provider.collateral = add_amount(provider.collateral, req.shield, "update_pool: provider collateral")?;

            self.deposit_native_premium(ctx, &req.updater, &req.deposit)?;
            self.set_collateral(ctx, &collateral)?;
            self.set_pool(ctx, &pool)?;
            self.set_provider(ctx, &provider)?;
            tracing::info!(
                pool_id = %pool.id,
                added_shield = req.shield,
                shield = pool.shield,
                end_time = pool.end_time,
                end_block_height = pool.end_block_height,
                "pool updated"
            );
            Ok(pool)
        })
    }

    pub fn pause_pool(&self, ctx: &mut Context<'_>, caller: &Address, pool_id: PoolId) -> TxResult<Pool> {
        ctx.atomic(|ctx| {
            self.require_admin(ctx, caller)?;
            let mut pool = self.require_pool(ctx, pool_id)?;
            if !pool.active {
                return Err(ShieldError::PoolAlreadyPaused(pool_id).into());
            }
            pool.active = false;
            self.set_pool(ctx, &pool)?;
            tracing::info!(pool_id = %pool_id, "pool paused");
            Ok(pool)
        })
    }

    pub fn resume_pool(&self, ctx: &mut Context<'_>, caller: &Address, pool_id: PoolId) -> TxResult<Pool> {
        ctx.atomic(|ctx| {
            self.require_admin(ctx, caller)?;
            let mut pool = self.require_pool(ctx, pool_id)?;
            if pool.active {
                return Err(ShieldError::PoolAlreadyActive(pool_id).into());
            }
            pool.active = true;
            self.set_pool(ctx, &pool)?;
            tracing::info!(pool_id = %pool_id, "pool resumed");
            Ok(pool)
        })
    }

    /// Both bounds have passed. The unset bound is zero and so always
    /// passed, which leaves the set bound deciding.
    pub fn pool_ended(&self, ctx: &Context<'_>, pool: &Pool) -> bool {
        ctx.block_time().epoch_secs() > pool.end_time && ctx.block_height() > pool.end_block_height
    }

    /// Free all collateral in the pool and delete it.
    pub fn close_pool(&self, ctx: &mut Context<'_>, pool_id: PoolId) -> TxResult<()> {
        ctx.atomic(|ctx| {
            self.require_pool(ctx, pool_id)?;
            self.free_collaterals(ctx, pool_id)?;
            self.delete_pool(ctx, pool_id);
            tracing::info!(pool_id = %pool_id, "pool closed");
            Ok(())
        })
    }

    /// Close every pool that has ended and no longer backs any purchase or
    /// locked claim. Returns the closed ids.
    pub fn close_pools(&self, ctx: &mut Context<'_>) -> TxResult<Vec<PoolId>> {
        ctx.atomic(|ctx| {
            let locked: Vec<PoolId> = self
                .claims(ctx)?
                .into_iter()
                .filter(|c| c.state == ClaimState::Locked)
                .map(|c| c.pool_id)
                .collect();
            let mut closed = Vec::new();
            for pool in self.pools(ctx)? {
                if !self.pool_ended(ctx, &pool) || locked.contains(&pool.id) {
                    continue;
                }
                if !self.pool_purchases(ctx, pool.id)?.is_empty() {
                    continue;
                }
                self.close_pool(ctx, pool.id)?;
                closed.push(pool.id);
            }
            Ok(closed)
        })
    }

    /// Move the native part of a deposit from `payer` into the module
    /// account and make it distributable as service fees.
    fn deposit_native_premium(&self, ctx: &mut Context<'_>, payer: &Address, deposit: &MixedCoins) -> TxResult<()> {
        if deposit.native.is_zero() {
            return Ok(());
        }
        self.bank()
            .send_coins_from_account_to_module(ctx, payer, SHIELD_MODULE_NAME, &deposit.native)
            .map_err(ShieldError::Transfer)?;
        let mut fees = self.service_fees(ctx)?;
        fees = fees.checked_add(&MixedDecCoins::native((&deposit.native).into()))?;
        self.set_service_fees(ctx, &fees)
    }

    /// Shield not yet sold to purchasers.
    pub fn unsold_shield(&self, ctx: &Context<'_>, pool: &Pool) -> TxResult<Amount> {
        let sold = self
            .pool_purchases(ctx, pool.id)?
            .iter()
            .try_fold(0u64, |acc, p| add_amount(acc, p.shield, "unsold_shield"))?;
        Ok(pool.shield.saturating_sub(sold))
    }
}

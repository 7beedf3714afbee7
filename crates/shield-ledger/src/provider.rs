//! # Provider Ledger
//!
//! A provider's capacity is its bonded stake. Pledging collateral moves
//! stake from `available` to `collateral`; locking a claim moves collateral
//! to `total_locked`. Between operations:
//!
//! ```text
//! available = delegation_bonded - collateral - total_locked   (floored at 0)
//! ```
//!
//! When bonded stake drops below what is pledged, the uncovered part is
//! queued for withdrawal from the provider's pools.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use shield_core::{Address, Amount, Coins, MixedDecCoins};

use crate::bank::{BankKeeper, SHIELD_MODULE_NAME};
use crate::context::Context;
use crate::error::{abort, staking_failure, InvariantViolation, ShieldError, TxResult};
use crate::keeper::Keeper;
use crate::staking::StakingKeeper;
use crate::types::Provider;
use crate::undelegate::allocate;

impl Provider {
    /// Recompute `available` from the cached bonded amount.
    pub fn recompute_available(&mut self) {
        let pledged = self.collateral.saturating_add(self.total_locked);
        self.available = self.delegation_bonded.saturating_sub(pledged);
    }
}

impl<S: StakingKeeper, B: BankKeeper> Keeper<S, B> {
    /// Tokens bonded by `delegator` across all validators, truncated.
    pub fn bonded_tokens(&self, ctx: &Context<'_>, delegator: &Address) -> TxResult<Amount> {
        let mut total = Decimal::ZERO;
        for delegation in self.staking().delegator_delegations(ctx, delegator).map_err(staking_failure)? {
            let validator = self
                .staking()
                .validator(ctx, &delegation.validator)
                .map_err(staking_failure)?
                .ok_or_else(|| abort(InvariantViolation::ValidatorNotFound(delegation.validator.clone())))?;
            let tokens = validator.tokens_from_shares(delegation.shares).map_err(staking_failure)?;
            total = total
                .checked_add(tokens)
                .ok_or_else(|| crate::error::overflow("bonded_tokens"))?;
        }
        total
            .trunc()
            .to_u64()
            .ok_or_else(|| crate::error::overflow("bonded_tokens"))
    }

    /// Existing provider, or a new one seeded from its bonded delegations.
    pub(crate) fn add_provider(&self, ctx: &mut Context<'_>, address: &Address) -> TxResult<Provider> {
        if let Some(provider) = self.provider(ctx, address)? {
            return Ok(provider);
        }
        let bonded = self.bonded_tokens(ctx, address)?;
        let provider = Provider::new(address.clone(), bonded);
        self.set_provider(ctx, &provider)?;
        tracing::debug!(provider = %address, bonded, "provider added");
        Ok(provider)
    }

    /// Staking hook: a delegation of `delegator` changed.
    ///
    /// Refreshes the provider's bonded amount and queues withdrawals for any
    /// collateral the new bonded amount no longer covers. Accounts that are
    /// not providers are ignored.
    pub fn on_delegation_modified(&self, ctx: &mut Context<'_>, delegator: &Address) -> TxResult<()> {
        ctx.atomic(|ctx| self.refresh_provider(ctx, delegator))
    }

    pub(crate) fn refresh_provider(&self, ctx: &mut Context<'_>, address: &Address) -> TxResult<()> {
        let Some(mut provider) = self.provider(ctx, address)? else {
            return Ok(());
        };
        provider.delegation_bonded = self.bonded_tokens(ctx, address)?;
        let pledged = provider.collateral.saturating_add(provider.total_locked);
        let unbacked = pledged.saturating_sub(provider.delegation_bonded);
        let to_withdraw = unbacked
            .saturating_sub(provider.withdrawing)
            .min(provider.collateral.saturating_sub(provider.withdrawing));
        provider.recompute_available();
        self.set_provider(ctx, &provider)?;
        if to_withdraw > 0 {
            tracing::debug!(provider = %address, amount = to_withdraw, "collateral no longer backed, withdrawing");
            self.withdraw_from_pools(ctx, address, to_withdraw)?;
        }
        Ok(())
    }

    /// Queue withdrawals totalling `amount` across the provider's pools,
    /// proportionally to what each position can still withdraw. Rounding
    /// remainders go to the first positions with room left.
    pub fn withdraw_from_pools(&self, ctx: &mut Context<'_>, address: &Address, amount: Amount) -> TxResult<()> {
        let positions: Vec<_> = self
            .provider_collaterals(ctx, address)?
            .into_iter()
            .filter(|c| c.withdrawable() > 0)
            .collect();
        let holdings: Vec<Amount> = positions.iter().map(|c| c.withdrawable()).collect();
        let withdrawable: u128 = holdings.iter().map(|&h| u128::from(h)).sum();
        if u128::from(amount) > withdrawable {
            return Err(ShieldError::OverWithdrawal {
                requested: amount,
                withdrawable: u64::try_from(withdrawable).unwrap_or(u64::MAX),
            }
            .into());
        }
        for (position, share) in positions.iter().zip(allocate(amount, &holdings)) {
            if share > 0 {
                self.queue_withdrawal(ctx, address, position.pool_id, share)?;
            }
        }
        Ok(())
    }

    pub(crate) fn add_rewards(&self, ctx: &mut Context<'_>, address: &Address, rewards: &MixedDecCoins) -> TxResult<()> {
        let mut provider = self.add_provider(ctx, address)?;
        provider.rewards = provider.rewards.checked_add(rewards)?;
        self.set_provider(ctx, &provider)
    }

    /// Pay out the whole-token part of a provider's native rewards.
    pub fn withdraw_rewards(&self, ctx: &mut Context<'_>, address: &Address) -> TxResult<Coins> {
        ctx.atomic(|ctx| {
            let mut provider = self
                .provider(ctx, address)?
                .ok_or_else(|| ShieldError::ProviderNotFound(address.clone()))?;
            let (payout, change) = provider.rewards.native.truncate();
            if payout.is_zero() {
                return Err(ShieldError::NoRewards(address.clone()).into());
            }
            self.bank()
                .send_coins_from_module_to_account(ctx, SHIELD_MODULE_NAME, address, &payout)
                .map_err(ShieldError::Transfer)?;
            provider.rewards.native = change;
            self.set_provider(ctx, &provider)?;
            tracing::info!(provider = %address, amount = %payout, "rewards withdrawn");
            Ok(payout)
        })
    }
}

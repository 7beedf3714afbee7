//! # Undelegation to the Module Account
//!
//! When a claim is approved, each provider's locked share becomes real
//! tokens in the shield module account. Bonded delegations are drawn first,
//! across validators in proportion to stake. If bonded stake falls short,
//! whole unbonding entries are redirected to the module's own unbonding
//! delegation at the same validator, soonest first; the part of the last
//! entry beyond what was needed is credited back to the provider as rewards.

use rust_decimal::Decimal;

use shield_core::{Address, Amount, Coins, DecCoins, MixedDecCoins, ValidatorAddress};

use crate::bank::{BankKeeper, SHIELD_MODULE_NAME};
use crate::context::Context;
use crate::error::{abort, staking_failure, InvariantViolation, TxResult};
use crate::keeper::{add_amount, Keeper};
use crate::staking::{Delegation, StakingError, StakingKeeper, UnbondingDelegation, Validator};

/// Split `need` across holdings proportionally, then hand any rounding
/// remainder to holdings with spare capacity, in order. The result never
/// exceeds a holding and sums to `min(need, Σ holdings)`.
pub fn allocate(need: Amount, holdings: &[Amount]) -> Vec<Amount> {
    let total: u128 = holdings.iter().map(|&h| u128::from(h)).sum();
    if total == 0 {
        return vec![0; holdings.len()];
    }
    let need = u128::from(need).min(total);
    let mut out: Vec<Amount> = holdings
        .iter()
        .map(|&h| u64::try_from(need * u128::from(h) / total).unwrap_or(h).min(h))
        .collect();
    let assigned: u128 = out.iter().map(|&a| u128::from(a)).sum();
    let mut remainder = need - assigned;
    for (slot, &holding) in out.iter_mut().zip(holdings) {
        if remainder == 0 {
            break;
        }
        let spare = u128::from(holding - *slot);
        let extra = spare.min(remainder);
        *slot += u64::try_from(extra).unwrap_or(0);
        remainder -= extra;
    }
    out
}

impl<S: StakingKeeper, B: BankKeeper> Keeper<S, B> {
    /// Convert `amount` of the delegator's stake into tokens owned by the
    /// shield module. Fails fatally if bonded and unbonding stake together
    /// cannot cover it.
    pub fn undelegate_coins_to_shield_module(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        amount: Amount,
    ) -> TxResult<()> {
        ctx.atomic(|ctx| {
            if amount == 0 {
                return Ok(());
            }
            let mut delegations = self
                .staking()
                .delegator_delegations(ctx, delegator)
                .map_err(staking_failure)?;
            delegations.sort_by(|a, b| a.validator.cmp(&b.validator));

            let mut holdings: Vec<(Delegation, Validator, Amount)> = Vec::new();
            for delegation in delegations {
                let validator = self
                    .staking()
                    .validator(ctx, &delegation.validator)
                    .map_err(staking_failure)?
                    .ok_or_else(|| abort(InvariantViolation::ValidatorNotFound(delegation.validator.clone())))?;
                let tokens = validator
                    .token_amount_from_shares(delegation.shares)
                    .map_err(staking_failure)?;
                if tokens > 0 {
                    holdings.push((delegation, validator, tokens));
                }
            }

            let tokens: Vec<Amount> = holdings.iter().map(|(_, _, t)| *t).collect();
            let mut moved: Amount = 0;
            for ((delegation, validator, held), take) in holdings.iter().zip(allocate(amount, &tokens)) {
                if take == 0 {
                    continue;
                }
                let shares = if take >= *held {
                    delegation.shares
                } else {
                    validator
                        .shares_from_tokens(take)
                        .map_err(staking_failure)?
                        .min(delegation.shares)
                };
                let got = self.undelegate_shares(ctx, delegation, shares)?;
                moved = add_amount(moved, got, "undelegate: moved")?;
            }

            let short = amount.saturating_sub(moved);
            if short > 0 {
                self.redirect_unbonding_entries(ctx, delegator, short)?;
            }
            tracing::debug!(delegator = %delegator, amount, bonded = moved, unbonding = short, "stake moved to shield module");
            Ok(())
        })
    }

    /// Burn `shares` of a delegation and move the tokens from the bonded
    /// pool to the shield module. Returns the tokens moved.
    pub fn undelegate_shares(&self, ctx: &mut Context<'_>, delegation: &Delegation, shares: Decimal) -> TxResult<Amount> {
        let staking = self.staking();
        staking
            .before_delegation_shares_modified(ctx, &delegation.delegator, &delegation.validator)
            .map_err(staking_failure)?;
        let tokens = staking
            .remove_validator_tokens_and_shares(ctx, &delegation.validator, shares)
            .map_err(staking_failure)?;
        let coins = Coins::from_coin(staking.bond_denom(), tokens)?;
        if !coins.is_zero() {
            self.bank()
                .send_coins_from_module_to_module(ctx, staking.bonded_pool_name(), SHIELD_MODULE_NAME, &coins)
                .map_err(|error| {
                    abort(InvariantViolation::Transfer {
                        operation: "undelegate to shield module",
                        error,
                    })
                })?;
        }
        let remaining = delegation.shares - shares;
        let updated = Delegation {
            shares: remaining,
            ..delegation.clone()
        };
        if remaining <= Decimal::ZERO {
            staking.remove_delegation(ctx, &updated).map_err(staking_failure)?;
        } else {
            staking.set_delegation(ctx, &updated).map_err(staking_failure)?;
        }
        staking
            .after_delegation_modified(ctx, &delegation.delegator, &delegation.validator)
            .map_err(staking_failure)?;
        Ok(tokens)
    }

    /// Move whole unbonding entries of `delegator`, soonest first, to the
    /// shield module until `short` is covered.
    pub fn redirect_unbonding_entries(&self, ctx: &mut Context<'_>, delegator: &Address, short: Amount) -> TxResult<()> {
        let mut remaining = short;
        let mut chosen: Vec<(ValidatorAddress, usize)> = Vec::new();
        for entry_ref in self.sorted_unbonding_entries(ctx, delegator)? {
            if remaining == 0 {
                break;
            }
            let balance = entry_ref.entry.balance;
            if balance > remaining {
                let excess = balance - remaining;
                let rewards = DecCoins::from_dec_coin(self.bond_denom(), Decimal::from(excess))?;
                self.add_rewards(ctx, delegator, &MixedDecCoins::native(rewards))?;
                tracing::debug!(delegator = %delegator, excess, "unbonding overflow credited as rewards");
                remaining = 0;
            } else {
                remaining -= balance;
            }
            chosen.push((entry_ref.validator, entry_ref.index));
        }
        if remaining > 0 {
            return Err(abort(InvariantViolation::InsufficientBackingStake {
                provider: delegator.clone(),
                short: remaining,
            }));
        }

        chosen.sort();
        let module = self.shield_module_address()?;
        let mut i = 0;
        while i < chosen.len() {
            let validator = chosen[i].0.clone();
            let mut indices = Vec::new();
            while i < chosen.len() && chosen[i].0 == validator {
                indices.push(chosen[i].1);
                i += 1;
            }
            self.move_entries(ctx, delegator, &module, &validator, &indices)?;
        }
        Ok(())
    }

    fn move_entries(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        module: &Address,
        validator: &ValidatorAddress,
        indices: &[usize],
    ) -> TxResult<()> {
        let staking = self.staking();
        let mut from = staking
            .unbonding_delegation(ctx, delegator, validator)
            .map_err(staking_failure)?
            .ok_or_else(|| {
                abort(InvariantViolation::Staking(StakingError::Corrupt(format!(
                    "unbonding delegation of {delegator} at {validator} vanished"
                ))))
            })?;
        let mut to = staking
            .unbonding_delegation(ctx, module, validator)
            .map_err(staking_failure)?
            .unwrap_or_else(|| UnbondingDelegation::new(module.clone(), validator.clone()));

        let from_pair = from.pair();
        for &index in indices {
            let Some(entry) = from.entries.get(index).cloned() else {
                continue;
            };
            self.remove_from_ubd_queue(ctx, &from_pair, entry.completion_time)?;
            to.entries.push(entry.clone());
            staking
                .insert_ubd_queue(ctx, &to, entry.completion_time)
                .map_err(staking_failure)?;
            tracing::debug!(
                delegator = %delegator,
                validator = %validator,
                balance = entry.balance,
                completion_time = %entry.completion_time,
                "unbonding entry redirected to shield module"
            );
        }
        let mut sorted = indices.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        for index in sorted {
            if index < from.entries.len() {
                from.entries.remove(index);
            }
        }
        if from.entries.is_empty() {
            staking.remove_unbonding_delegation(ctx, &from).map_err(staking_failure)?;
        } else {
            staking.set_unbonding_delegation(ctx, &from).map_err(staking_failure)?;
        }
        staking.set_unbonding_delegation(ctx, &to).map_err(staking_failure)
    }
}

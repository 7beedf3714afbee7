//! # Claim/Lock Engine
//!
//! A loss claim against a purchase locks collateral across every provider of
//! the pool, in proportion to each position:
//!
//! ```text
//! lock_amt(p) = floor(loss × collateral(p) / pool.total_collateral)
//! ```
//!
//! The truncation remainder stays unlocked. A provider whose locked total
//! exceeds its bonded stake has its unbonding entries held back until the
//! lock period ends, so the stake cannot leave before the claim resolves.
//!
//! Resolution is one of:
//!
//! - **approve**: locked shares are undelegated into the module account and a
//!   reimbursement is scheduled for the beneficiary.
//! - **reject**: locked shares return to their positions and the consumed
//!   shield is restored.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use shield_core::{Address, Amount, Coins, PoolId, ProposalId, Timestamp, TxHash, ValidatorAddress};
use shield_state::Claim;

use crate::bank::BankKeeper;
use crate::context::Context;
use crate::error::{abort, staking_failure, InvariantViolation, ShieldError, TxResult};
use crate::keeper::{add_amount, sub_amount, Keeper};
use crate::staking::{DvPair, StakingError, StakingKeeper, UnbondingDelegation, UnbondingEntry};
use crate::types::{LockedCollateral, Reimbursement};

/// One unbonding entry with its position in the staking records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnbondingEntryRef {
    pub validator: ValidatorAddress,
    pub index: usize,
    pub entry: UnbondingEntry,
}

/// Proportional share of `loss` for a position of `collateral` out of
/// `total`, truncated.
pub fn lock_amount(loss: Amount, total: Amount, collateral: Amount) -> Amount {
    if total == 0 {
        return 0;
    }
    let share = u128::from(loss) * u128::from(collateral) / u128::from(total);
    u64::try_from(share).unwrap_or(u64::MAX)
}

impl<S: StakingKeeper, B: BankKeeper> Keeper<S, B> {
    /// Lock collateral for a submitted loss claim. Returns the amount
    /// actually locked.
    #[allow(clippy::too_many_arguments)]
    pub fn claim_lock(
        &self,
        ctx: &mut Context<'_>,
        proposal_id: ProposalId,
        pool_id: PoolId,
        loss: &Coins,
        purchase_tx_hash: &TxHash,
        lock_period_secs: i64,
        proposer: &Address,
    ) -> TxResult<Amount> {
        ctx.atomic(|ctx| {
            if self.claim(ctx, proposal_id)?.is_some() {
                return Err(ShieldError::ClaimAlreadyExists(proposal_id).into());
            }
            let mut pool = self.require_pool(ctx, pool_id)?;
            let mut purchase = self
                .purchase(ctx, purchase_tx_hash)?
                .filter(|p| p.pool_id == pool_id)
                .ok_or(ShieldError::PurchaseNotFound(*purchase_tx_hash))?;
            let loss_amt = loss.amount_of(self.bond_denom());
            if loss_amt == 0 {
                return Err(ShieldError::InvalidAmount(format!("loss has no {}", self.bond_denom())).into());
            }
            if purchase.shield < loss_amt {
                return Err(ShieldError::NotEnoughShield {
                    requested: loss_amt,
                    available: purchase.shield,
                }
                .into());
            }
            if pool.shield < loss_amt {
                return Err(ShieldError::NotEnoughShield {
                    requested: loss_amt,
                    available: pool.shield,
                }
                .into());
            }

            if pool.total_collateral < loss_amt {
                return Err(ShieldError::NotEnoughCollateral {
                    pool_id,
                    requested: loss_amt,
                    available: pool.total_collateral,
                }
                .into());
            }

            let now = ctx.block_time();
            let lock_end = now
                .checked_add_secs(lock_period_secs)
                .ok_or_else(|| abort(InvariantViolation::TimeOverflow { base: now, secs: lock_period_secs }))?;

            let mut total_locked: Amount = 0;
            for mut collateral in self.pool_collaterals(ctx, pool_id)? {
                let lock_amt = lock_amount(loss_amt, pool.total_collateral, collateral.amount);
                if lock_amt == 0 {
                    continue;
                }
                collateral.amount = sub_amount(collateral.amount, lock_amt, "claim_lock: collateral")?;
                collateral.locked_collaterals.push(LockedCollateral { proposal_id, amount: lock_amt });
                let released = collateral.withdrawing.saturating_sub(collateral.amount);
                collateral.withdrawing -= released;
                self.set_collateral(ctx, &collateral)?;
                if released > 0 {
                    let mut provider = self.locked_provider(ctx, &collateral.provider)?;
                    provider.withdrawing = provider.withdrawing.saturating_sub(released);
                    self.set_provider(ctx, &provider)?;
                }
                self.lock_provider(ctx, &collateral.provider, lock_amt, lock_end)?;
                total_locked = add_amount(total_locked, lock_amt, "claim_lock: total")?;
            }

            // Truncation leaves at most one token per position unlocked.
            debug_assert!(total_locked <= loss_amt);
            purchase.shield -= loss_amt;
            pool.shield -= loss_amt;
            pool.total_collateral = sub_amount(pool.total_collateral, total_locked, "claim_lock: pool total")?;
            self.set_purchase(ctx, &purchase)?;
            self.set_pool(ctx, &pool)?;

            let mut claim = Claim::submit(
                proposal_id,
                pool_id,
                *purchase_tx_hash,
                loss.clone(),
                proposer.clone(),
                now,
            );
            claim.mark_locked(total_locked, lock_end, now)?;
            self.set_claim(ctx, &claim)?;
            tracing::info!(
                proposal_id = %proposal_id,
                pool_id = %pool_id,
                loss = loss_amt,
                locked = total_locked,
                lock_end = %lock_end,
                "claim locked"
            );
            Ok(total_locked)
        })
    }

    /// Move `amount` of a provider's collateral to locked, holding back
    /// unbonding stake if bonded stake alone cannot cover the locked total.
    pub fn lock_provider(
        &self,
        ctx: &mut Context<'_>,
        address: &Address,
        amount: Amount,
        lock_end: Timestamp,
    ) -> TxResult<()> {
        let mut provider = self.locked_provider(ctx, address)?;
        if provider.collateral < amount {
            return Err(abort(InvariantViolation::InsufficientCollateral {
                provider: address.clone(),
                collateral: provider.collateral,
                requested: amount,
            }));
        }
        provider.collateral -= amount;
        provider.total_locked = add_amount(provider.total_locked, amount, "lock_provider: total locked")?;
        self.set_provider(ctx, &provider)?;

        if provider.delegation_bonded >= provider.total_locked {
            return Ok(());
        }
        let mut short = provider.total_locked - provider.delegation_bonded;
        let mut touched: BTreeMap<ValidatorAddress, UnbondingDelegation> = BTreeMap::new();
        for entry_ref in self.sorted_unbonding_entries(ctx, address)? {
            if short == 0 {
                break;
            }
            let entry = &entry_ref.entry;
            if entry.completion_time < lock_end {
                let ubd = match touched.entry(entry_ref.validator.clone()) {
                    Entry::Occupied(o) => o.into_mut(),
                    Entry::Vacant(v) => {
                        let loaded = self
                            .staking()
                            .unbonding_delegation(ctx, address, &entry_ref.validator)
                            .map_err(staking_failure)?
                            .ok_or_else(|| {
                                abort(InvariantViolation::Staking(StakingError::Corrupt(format!(
                                    "unbonding delegation of {address} at {} vanished",
                                    entry_ref.validator
                                ))))
                            })?;
                        v.insert(loaded)
                    }
                };
                let pair = ubd.pair();
                self.remove_from_ubd_queue(ctx, &pair, entry.completion_time)?;
                if let Some(stored) = ubd.entries.get_mut(entry_ref.index) {
                    stored.completion_time = lock_end;
                }
                self.staking()
                    .insert_ubd_queue(ctx, ubd, lock_end)
                    .map_err(staking_failure)?;
                tracing::debug!(
                    provider = %address,
                    validator = %entry_ref.validator,
                    balance = entry.balance,
                    from = %entry.completion_time,
                    to = %lock_end,
                    "unbonding entry held for claim lock"
                );
            }
            short = short.saturating_sub(entry.balance);
        }
        for ubd in touched.values() {
            self.staking()
                .set_unbonding_delegation(ctx, ubd)
                .map_err(staking_failure)?;
        }
        if short > 0 {
            return Err(abort(InvariantViolation::InsufficientBackingStake {
                provider: address.clone(),
                short,
            }));
        }
        Ok(())
    }

    /// Every unbonding entry of `delegator`, soonest completion first, then
    /// by validator, then by entry position.
    pub fn sorted_unbonding_entries(&self, ctx: &Context<'_>, delegator: &Address) -> TxResult<Vec<UnbondingEntryRef>> {
        let mut out = Vec::new();
        for ubd in self.staking().unbonding_delegations(ctx, delegator).map_err(staking_failure)? {
            for (index, entry) in ubd.entries.iter().enumerate() {
                out.push(UnbondingEntryRef {
                    validator: ubd.validator.clone(),
                    index,
                    entry: entry.clone(),
                });
            }
        }
        out.sort_by(|a, b| {
            a.entry
                .completion_time
                .cmp(&b.entry.completion_time)
                .then_with(|| a.validator.cmp(&b.validator))
                .then_with(|| a.index.cmp(&b.index))
        });
        Ok(out)
    }

    /// Drop one occurrence of `pair` from the unbonding queue slice at
    /// `time`.
    pub(crate) fn remove_from_ubd_queue(&self, ctx: &mut Context<'_>, pair: &DvPair, time: Timestamp) -> TxResult<()> {
        let mut slice = self
            .staking()
            .ubd_queue_time_slice(ctx, time)
            .map_err(staking_failure)?;
        if let Some(pos) = slice.iter().position(|p| p == pair) {
            slice.remove(pos);
            self.staking()
                .set_ubd_queue_time_slice(ctx, time, &slice)
                .map_err(staking_failure)?;
        }
        Ok(())
    }

    /// Return every share locked for `proposal_id` to its position. Fails
    /// fatally if more than `loss` was locked. Returns the amount unlocked.
    pub fn claim_unlock(
        &self,
        ctx: &mut Context<'_>,
        proposal_id: ProposalId,
        pool_id: PoolId,
        loss: &Coins,
    ) -> TxResult<Amount> {
        ctx.atomic(|ctx| {
            let mut pool = self.require_pool(ctx, pool_id)?;
            let loss_amt = loss.amount_of(self.bond_denom());

            let mut releases = Vec::new();
            for collateral in self.pool_collaterals(ctx, pool_id)? {
                if let Some(pos) = collateral
                    .locked_collaterals
                    .iter()
                    .position(|l| l.proposal_id == proposal_id)
                {
                    releases.push((collateral, pos));
                }
            }
            let unlocked = releases
                .iter()
                .try_fold(0u64, |acc, (c, pos)| add_amount(acc, c.locked_collaterals[*pos].amount, "claim_unlock: total"))?;
            if unlocked > loss_amt {
                return Err(abort(InvariantViolation::UnlockExceedsLoss {
                    proposal_id,
                    unlocked,
                    loss: loss_amt,
                }));
            }

            for (mut collateral, pos) in releases {
                let locked = collateral.locked_collaterals.remove(pos);
                collateral.amount = add_amount(collateral.amount, locked.amount, "claim_unlock: collateral")?;
                self.set_collateral(ctx, &collateral)?;
                let mut provider = self.locked_provider(ctx, &collateral.provider)?;
                provider.total_locked = sub_amount(provider.total_locked, locked.amount, "claim_unlock: total locked")?;
                provider.collateral = add_amount(provider.collateral, locked.amount, "claim_unlock: provider collateral")?;
                self.set_provider(ctx, &provider)?;
            }
            pool.total_collateral = add_amount(pool.total_collateral, unlocked, "claim_unlock: pool total")?;
            self.set_pool(ctx, &pool)?;
            tracing::info!(proposal_id = %proposal_id, pool_id = %pool_id, unlocked, "claim unlocked");
            Ok(unlocked)
        })
    }

    /// Give a rejected claim's loss back to the pool and the purchase.
    pub fn restore_shield(
        &self,
        ctx: &mut Context<'_>,
        pool_id: PoolId,
        purchase_tx_hash: &TxHash,
        loss: &Coins,
    ) -> TxResult<()> {
        ctx.atomic(|ctx| {
            let loss_amt = loss.amount_of(self.bond_denom());
            let mut pool = self.require_pool(ctx, pool_id)?;
            let mut purchase = self
                .purchase(ctx, purchase_tx_hash)?
                .ok_or(ShieldError::PurchaseNotFound(*purchase_tx_hash))?;
            pool.shield = add_amount(pool.shield, loss_amt, "restore_shield: pool")?;
            purchase.shield = add_amount(purchase.shield, loss_amt, "restore_shield: purchase")?;
            self.set_pool(ctx, &pool)?;
            self.set_purchase(ctx, &purchase)
        })
    }

    /// Approve a locked claim and schedule its reimbursement.
    pub fn approve_claim(
        &self,
        ctx: &mut Context<'_>,
        proposal_id: ProposalId,
        beneficiary: &Address,
    ) -> TxResult<Reimbursement> {
        ctx.atomic(|ctx| {
            let now = ctx.block_time();
            let mut claim = self.require_claim(ctx, proposal_id)?;
            claim.approve(now)?;
            let reimbursement =
                self.create_reimbursement(ctx, proposal_id, claim.pool_id, claim.loss.clone(), beneficiary)?;
            claim.begin_reimbursing(now)?;
            self.set_claim(ctx, &claim)?;
            tracing::info!(proposal_id = %proposal_id, beneficiary = %beneficiary, "claim approved");
            Ok(reimbursement)
        })
    }

    /// Reject a locked claim: unlock its collateral and restore its shield.
    /// Returns the amount unlocked.
    pub fn reject_claim(&self, ctx: &mut Context<'_>, proposal_id: ProposalId) -> TxResult<Amount> {
        ctx.atomic(|ctx| {
            let now = ctx.block_time();
            let mut claim = self.require_claim(ctx, proposal_id)?;
            claim.reject(now)?;
            let unlocked = self.claim_unlock(ctx, proposal_id, claim.pool_id, &claim.loss)?;
            self.restore_shield(ctx, claim.pool_id, &claim.purchase_tx_hash, &claim.loss)?;
            claim.mark_unlocked(now)?;
            self.set_claim(ctx, &claim)?;
            tracing::info!(proposal_id = %proposal_id, unlocked, "claim rejected");
            Ok(unlocked)
        })
    }
}

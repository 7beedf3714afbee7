//! # Reimbursements
//!
//! An approved claim turns each provider's locked share into tokens held by
//! the shield module, then schedules a payout for the beneficiary after the
//! payout period. The beneficiary collects it with
//! [`Keeper::withdraw_reimbursement`].

use shield_core::{Address, Coins, PoolId, ProposalId};
use shield_state::ClaimState;

use crate::bank::{BankKeeper, SHIELD_MODULE_NAME};
use crate::context::Context;
use crate::error::{abort, InvariantViolation, ShieldError, TxResult};
use crate::keeper::{add_amount, sub_amount, Keeper};
use crate::staking::StakingKeeper;
use crate::types::Reimbursement;

impl<S: StakingKeeper, B: BankKeeper> Keeper<S, B> {
    /// Undelegate every share locked for `proposal_id` into the module
    /// account and schedule `amount` for `beneficiary`.
    pub fn create_reimbursement(
        &self,
        ctx: &mut Context<'_>,
        proposal_id: ProposalId,
        pool_id: PoolId,
        amount: Coins,
        beneficiary: &Address,
    ) -> TxResult<Reimbursement> {
        ctx.atomic(|ctx| {
            if self.reimbursement(ctx, proposal_id)?.is_some() {
                return Err(ShieldError::ReimbursementExists(proposal_id).into());
            }
            self.require_pool(ctx, pool_id)?;

            let mut undelegated = 0u64;
            for mut collateral in self.pool_collaterals(ctx, pool_id)? {
                let Some(pos) = collateral
                    .locked_collaterals
                    .iter()
                    .position(|l| l.proposal_id == proposal_id)
                else {
                    continue;
                };
                let locked = collateral.locked_collaterals.remove(pos);
                self.set_collateral(ctx, &collateral)?;

                let mut provider = self.locked_provider(ctx, &collateral.provider)?;
                provider.total_locked =
                    sub_amount(provider.total_locked, locked.amount, "create_reimbursement: total locked")?;
                self.set_provider(ctx, &provider)?;

                self.undelegate_coins_to_shield_module(ctx, &collateral.provider, locked.amount)?;
                self.refresh_provider(ctx, &collateral.provider)?;
                undelegated = add_amount(undelegated, locked.amount, "create_reimbursement: total")?;
            }

            let now = ctx.block_time();
            let payout_period = self.claim_params(ctx)?.payout_period_secs;
            let payout_time = now
                .checked_add_secs(payout_period)
                .ok_or_else(|| abort(InvariantViolation::TimeOverflow { base: now, secs: payout_period }))?;
            let reimbursement = Reimbursement {
                amount,
                beneficiary: beneficiary.clone(),
                payout_time,
            };
            self.set_reimbursement(ctx, proposal_id, &reimbursement)?;
            tracing::info!(
                proposal_id = %proposal_id,
                pool_id = %pool_id,
                beneficiary = %beneficiary,
                undelegated,
                payout_time = %payout_time,
                "reimbursement created"
            );
            Ok(reimbursement)
        })
    }

    /// Pay a matured reimbursement to its beneficiary. A failed transfer
    /// leaves the record in place.
    pub fn withdraw_reimbursement(
        &self,
        ctx: &mut Context<'_>,
        proposal_id: ProposalId,
        caller: &Address,
    ) -> TxResult<Coins> {
        ctx.atomic(|ctx| {
            let reimbursement = self
                .reimbursement(ctx, proposal_id)?
                .ok_or(ShieldError::CompensationNotFound(proposal_id))?;
            if &reimbursement.beneficiary != caller {
                return Err(ShieldError::InvalidBeneficiary { caller: caller.clone() }.into());
            }
            let now = ctx.block_time();
            if now < reimbursement.payout_time {
                return Err(ShieldError::NotPayoutTime {
                    proposal_id,
                    reason: format!("payout opens at {}", reimbursement.payout_time),
                }
                .into());
            }
            self.bank()
                .send_coins_from_module_to_account(ctx, SHIELD_MODULE_NAME, caller, &reimbursement.amount)
                .map_err(|e| ShieldError::NotPayoutTime {
                    proposal_id,
                    reason: e.to_string(),
                })?;
            self.delete_reimbursement(ctx, proposal_id);

            if let Some(mut claim) = self.claim(ctx, proposal_id)? {
                if claim.state == ClaimState::Reimbursing {
                    claim.mark_paid(now)?;
                    self.set_claim(ctx, &claim)?;
                }
            }
            tracing::info!(proposal_id = %proposal_id, beneficiary = %caller, amount = %reimbursement.amount, "reimbursement paid");
            Ok(reimbursement.amount)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::TestEnv;
    use crate::purchase::PurchaseRequest;
    use shield_core::{Amount, TxHash};

    const DAY: i64 = 86_400;

    struct Approved {
        env: TestEnv,
        provider: Address,
        victim: Address,
        pool: PoolId,
        module_before: Amount,
    }

    /// Admin 1000 and provider 500 in one pool; a 300 loss is locked and
    /// approved for `victim`.
    fn approved() -> Approved {
        let mut env = TestEnv::new();
        let provider = env.addr("cosmos1prov");
        let buyer = env.addr("cosmos1buyer");
        let victim = env.addr("cosmos1victim");
        env.delegate(&provider, "cosmosvaloper1a", 500);
        env.fund(&buyer, 100);
        let pool = env.create_pool_with(1000, 90 * DAY, 0);
        let tx = TxHash::from_bytes([3; 32]);
        let loss = env.coins(300);
        let admin = env.admin.clone();
        env.run(|k, ctx| {
            k.deposit_collateral(ctx, &provider, pool, 500)?;
            k.purchase_shield(
                ctx,
                PurchaseRequest {
                    tx_hash: tx,
                    pool_id: pool,
                    shield: 800,
                    description: String::new(),
                    purchaser: buyer.clone(),
                },
            )?;
            let period = k.claim_params(ctx)?.lock_period_secs;
            k.claim_lock(ctx, ProposalId(1), pool, &loss, &tx, period, &admin)?;
            Ok(())
        })
        .unwrap();
        let module_before = env.module_balance();
        env.run(|k, ctx| k.approve_claim(ctx, ProposalId(1), &victim).map(|_| ()))
            .unwrap();
        Approved {
            env,
            provider,
            victim,
            pool,
            module_before,
        }
    }

    fn payout_wait(env: &mut TestEnv) -> i64 {
        env.run(|k, ctx| Ok(k.claim_params(ctx)?.payout_period_secs)).unwrap()
    }

    #[test]
    fn approval_moves_locked_stake_into_the_module() {
        let mut a = approved();
        let (pool, provider, admin) = (a.pool, a.provider.clone(), a.env.admin.clone());
        assert_eq!(a.env.module_balance() - a.module_before, 300);
        a.env
            .run(|k, ctx| {
                let p = k.provider(ctx, &provider)?.unwrap();
                assert_eq!((p.total_locked, p.collateral, p.delegation_bonded), (0, 400, 400));
                let adm = k.provider(ctx, &admin)?.unwrap();
                assert_eq!((adm.total_locked, adm.collateral), (0, 800));
                assert_eq!(adm.delegation_bonded, TestEnv::ADMIN_STAKE - 200);
                assert!(k.collateral(ctx, pool, &provider)?.unwrap().locked_collaterals.is_empty());
                assert_eq!(k.require_pool(ctx, pool)?.total_collateral, 1200);
                assert_eq!(
                    k.claim(ctx, ProposalId(1))?.unwrap().state,
                    ClaimState::Reimbursing
                );
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn payout_waits_for_the_payout_period() {
        let mut a = approved();
        let victim = a.victim.clone();
        let err = a
            .env
            .run(|k, ctx| k.withdraw_reimbursement(ctx, ProposalId(1), &victim))
            .unwrap_err();
        assert!(matches!(err.rejection(), Some(ShieldError::NotPayoutTime { .. })));

        let wait = payout_wait(&mut a.env);
        a.env.advance(wait, 1);
        let paid = a
            .env
            .run(|k, ctx| k.withdraw_reimbursement(ctx, ProposalId(1), &victim))
            .unwrap();
        assert_eq!(paid, a.env.coins(300));
        assert_eq!(a.env.balance(&victim), 300);
        a.env
            .run(|k, ctx| {
                assert!(k.reimbursement(ctx, ProposalId(1))?.is_none());
                assert_eq!(k.claim(ctx, ProposalId(1))?.unwrap().state, ClaimState::Paid);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn second_withdrawal_finds_nothing() {
        let mut a = approved();
        let victim = a.victim.clone();
        let wait = payout_wait(&mut a.env);
        a.env.advance(wait, 1);
        a.env
            .run(|k, ctx| k.withdraw_reimbursement(ctx, ProposalId(1), &victim))
            .unwrap();
        let err = a
            .env
            .run(|k, ctx| k.withdraw_reimbursement(ctx, ProposalId(1), &victim))
            .unwrap_err();
        assert_eq!(err.rejection(), Some(&ShieldError::CompensationNotFound(ProposalId(1))));
    }

    #[test]
    fn only_the_beneficiary_may_withdraw() {
        let mut a = approved();
        let wait = payout_wait(&mut a.env);
        a.env.advance(wait, 1);
        let thief = a.env.addr("cosmos1thief");
        let before = a.env.store.clone();
        let err = a
            .env
            .run(|k, ctx| k.withdraw_reimbursement(ctx, ProposalId(1), &thief))
            .unwrap_err();
        assert_eq!(err.rejection(), Some(&ShieldError::InvalidBeneficiary { caller: thief }));
        assert_eq!(a.env.store, before);
    }

    #[test]
    fn failed_transfer_keeps_the_record() {
        let mut env = TestEnv::new();
        let victim = env.addr("cosmos1victim");
        let pool = env.create_default_pool(1000);
        let amount = env.coins(50);
        env.run(|k, ctx| k.create_reimbursement(ctx, ProposalId(9), pool, amount.clone(), &victim).map(|_| ()))
            .unwrap();
        let wait = payout_wait(&mut env);
        env.advance(wait, 1);
        // Nothing locked, nothing undelegated: the module holds no funds.
        let err = env
            .run(|k, ctx| k.withdraw_reimbursement(ctx, ProposalId(9), &victim))
            .unwrap_err();
        assert!(matches!(err.rejection(), Some(ShieldError::NotPayoutTime { .. })));
        assert!(env.run(|k, ctx| k.reimbursement(ctx, ProposalId(9))).unwrap().is_some());

        env.fund_module(50);
        env.run(|k, ctx| k.withdraw_reimbursement(ctx, ProposalId(9), &victim))
            .unwrap();
        assert_eq!(env.balance(&victim), 50);
    }

    #[test]
    fn duplicate_reimbursement_is_rejected() {
        let mut a = approved();
        let (pool, victim) = (a.pool, a.victim.clone());
        let amount = a.env.coins(1);
        let err = a
            .env
            .run(|k, ctx| k.create_reimbursement(ctx, ProposalId(1), pool, amount.clone(), &victim))
            .unwrap_err();
        assert_eq!(err.rejection(), Some(&ShieldError::ReimbursementExists(ProposalId(1))));
    }
}

//! # Keeper
//!
//! [`Keeper`] owns the two collaborators and exposes every ledger operation.
//! It holds no ledger state of its own: records live in the store reached
//! through the [`Context`] passed to each call.
//!
//! This file has the record accessors. Operations are grouped by concern in
//! sibling modules, each adding an `impl Keeper` block:
//!
//! | Module | Operations |
//! |--------|------------|
//! | `pool` | create, update, pause, resume, end, close |
//! | `provider` | provider creation, delegation refresh, rewards |
//! | `collateral` | deposit, withdraw request, free on close |
//! | `withdraw` | queue and completion |
//! | `purchase` | purchases, fee accrual, expiry |
//! | `claim` | lock, unlock, restore, approve, reject |
//! | `undelegate` | converting locked stake into module funds |
//! | `reimbursement` | payout scheduling and withdrawal |

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;

use shield_core::{Address, MixedDecCoins, PoolId, ProposalId, TxHash};
use shield_state::Claim;

use crate::bank::{BankKeeper, SHIELD_MODULE_NAME};
use crate::codec::{read_record, scan_records, write_record};
use crate::context::Context;
use crate::error::{abort, InvariantViolation, ShieldError, TxResult};
use crate::keys;
use crate::params::{default_shield_staking_rate, ClaimProposalParams, PoolParams, StakingRateMigration};
use crate::staking::StakingKeeper;
use crate::types::{Collateral, Pool, ProposalReimbursement, Provider, Purchase, Reimbursement};

/// Shield ledger keeper.
pub struct Keeper<S, B> {
    staking: S,
    bank: B,
    staking_rate_migration: Option<StakingRateMigration>,
}

impl<S: StakingKeeper, B: BankKeeper> Keeper<S, B> {
    pub fn new(staking: S, bank: B) -> Self {
        Self {
            staking,
            bank,
            staking_rate_migration: None,
        }
    }

    /// Schedule the begin-block staking rate migration.
    pub fn with_staking_rate_migration(mut self, migration: Option<StakingRateMigration>) -> Self {
        self.staking_rate_migration = migration;
        self
    }

    pub fn staking(&self) -> &S {
        &self.staking
    }

    pub fn bank(&self) -> &B {
        &self.bank
    }

    pub fn staking_rate_migration(&self) -> Option<&StakingRateMigration> {
        self.staking_rate_migration.as_ref()
    }

    pub fn bond_denom(&self) -> &str {
        self.staking.bond_denom()
    }

    pub(crate) fn shield_module_address(&self) -> TxResult<Address> {
        self.bank.module_address(SHIELD_MODULE_NAME).map_err(|error| {
            abort(InvariantViolation::Transfer {
                operation: "shield module lookup",
                error,
            })
        })
    }

    // ── Singletons ───────────────────────────────────────────────────

    pub fn admin(&self, ctx: &Context<'_>) -> TxResult<Option<Address>> {
        load(ctx, keys::ADMIN_KEY)
    }

    pub fn set_admin(&self, ctx: &mut Context<'_>, admin: &Address) -> TxResult<()> {
        save(ctx, keys::ADMIN_KEY.to_vec(), admin)
    }

    /// Fail with `NotShieldAdmin` unless `caller` is the admin.
    pub(crate) fn require_admin(&self, ctx: &Context<'_>, caller: &Address) -> TxResult<Address> {
        match self.admin(ctx)? {
            Some(admin) if &admin == caller => Ok(admin),
            _ => Err(ShieldError::NotShieldAdmin { caller: caller.clone() }.into()),
        }
    }

    /// Id the next created pool receives. Pool ids start at 1.
    pub fn next_pool_id(&self, ctx: &Context<'_>) -> TxResult<PoolId> {
        Ok(load(ctx, keys::NEXT_POOL_ID_KEY)?.unwrap_or(PoolId(1)))
    }

    pub fn set_next_pool_id(&self, ctx: &mut Context<'_>, id: PoolId) -> TxResult<()> {
        save(ctx, keys::NEXT_POOL_ID_KEY.to_vec(), &id)
    }

    pub fn pool_params(&self, ctx: &Context<'_>) -> TxResult<PoolParams> {
        Ok(load(ctx, keys::POOL_PARAMS_KEY)?.unwrap_or_default())
    }

    pub fn set_pool_params(&self, ctx: &mut Context<'_>, params: &PoolParams) -> TxResult<()> {
        save(ctx, keys::POOL_PARAMS_KEY.to_vec(), params)
    }

    pub fn claim_params(&self, ctx: &Context<'_>) -> TxResult<ClaimProposalParams> {
        Ok(load(ctx, keys::CLAIM_PARAMS_KEY)?.unwrap_or_default())
    }

    pub fn set_claim_params(&self, ctx: &mut Context<'_>, params: &ClaimProposalParams) -> TxResult<()> {
        save(ctx, keys::CLAIM_PARAMS_KEY.to_vec(), params)
    }

    /// Fees accrued from purchases and not yet distributed.
    pub fn service_fees(&self, ctx: &Context<'_>) -> TxResult<MixedDecCoins> {
        Ok(load(ctx, keys::SERVICE_FEES_KEY)?.unwrap_or_default())
    }

    pub fn set_service_fees(&self, ctx: &mut Context<'_>, fees: &MixedDecCoins) -> TxResult<()> {
        save(ctx, keys::SERVICE_FEES_KEY.to_vec(), fees)
    }

    /// Fees paid by live purchases and not yet accrued.
    pub fn remaining_service_fees(&self, ctx: &Context<'_>) -> TxResult<MixedDecCoins> {
        Ok(load(ctx, keys::REMAINING_SERVICE_FEES_KEY)?.unwrap_or_default())
    }

    pub fn set_remaining_service_fees(&self, ctx: &mut Context<'_>, fees: &MixedDecCoins) -> TxResult<()> {
        save(ctx, keys::REMAINING_SERVICE_FEES_KEY.to_vec(), fees)
    }

    pub fn shield_staking_rate(&self, ctx: &Context<'_>) -> TxResult<Decimal> {
        Ok(load(ctx, keys::STAKING_RATE_KEY)?.unwrap_or_else(default_shield_staking_rate))
    }

    pub fn set_shield_staking_rate(&self, ctx: &mut Context<'_>, rate: Decimal) -> TxResult<()> {
        save(ctx, keys::STAKING_RATE_KEY.to_vec(), &rate)
    }

    // ── Pools ────────────────────────────────────────────────────────

    pub fn pool(&self, ctx: &Context<'_>, id: PoolId) -> TxResult<Option<Pool>> {
        load(ctx, &keys::pool_key(id))
    }

    /// The pool, or `NoPoolFound`.
    pub fn require_pool(&self, ctx: &Context<'_>, id: PoolId) -> TxResult<Pool> {
        self.pool(ctx, id)?.ok_or_else(|| ShieldError::NoPoolFound(id).into())
    }

    pub fn set_pool(&self, ctx: &mut Context<'_>, pool: &Pool) -> TxResult<()> {
        save(ctx, keys::pool_key(pool.id), pool)
    }

    pub(crate) fn delete_pool(&self, ctx: &mut Context<'_>, id: PoolId) {
        ctx.store_mut().delete(&keys::pool_key(id));
    }

    /// All pools in id order.
    pub fn pools(&self, ctx: &Context<'_>) -> TxResult<Vec<Pool>> {
        scan(ctx, &[keys::POOL_PREFIX])
    }

    // ── Providers ────────────────────────────────────────────────────

    pub fn provider(&self, ctx: &Context<'_>, address: &Address) -> TxResult<Option<Provider>> {
        load(ctx, &keys::provider_key(address))
    }

    pub fn set_provider(&self, ctx: &mut Context<'_>, provider: &Provider) -> TxResult<()> {
        save(ctx, keys::provider_key(&provider.address), provider)
    }

    /// Provider record that must exist while locked collateral references
    /// it.
    pub(crate) fn locked_provider(&self, ctx: &Context<'_>, address: &Address) -> TxResult<Provider> {
        self.provider(ctx, address)?
            .ok_or_else(|| abort(InvariantViolation::ProviderNotFound(address.clone())))
    }

    /// All providers in address order.
    pub fn providers(&self, ctx: &Context<'_>) -> TxResult<Vec<Provider>> {
        scan(ctx, &[keys::PROVIDER_PREFIX])
    }

    // ── Collateral ───────────────────────────────────────────────────

    pub fn collateral(&self, ctx: &Context<'_>, pool_id: PoolId, provider: &Address) -> TxResult<Option<Collateral>> {
        load(ctx, &keys::collateral_key(pool_id, provider))
    }

    pub fn set_collateral(&self, ctx: &mut Context<'_>, collateral: &Collateral) -> TxResult<()> {
        save(
            ctx,
            keys::collateral_key(collateral.pool_id, &collateral.provider),
            collateral,
        )
    }

    pub(crate) fn delete_collateral(&self, ctx: &mut Context<'_>, pool_id: PoolId, provider: &Address) {
        ctx.store_mut().delete(&keys::collateral_key(pool_id, provider));
    }

    /// Collateral positions of a pool, ascending by provider address.
    pub fn pool_collaterals(&self, ctx: &Context<'_>, pool_id: PoolId) -> TxResult<Vec<Collateral>> {
        let mut collaterals: Vec<Collateral> = scan(ctx, &keys::pool_collateral_prefix(pool_id))?;
        collaterals.sort_by(|a, b| a.provider.cmp(&b.provider));
        Ok(collaterals)
    }

    /// Positions of one provider across all pools, in pool id order.
    pub fn provider_collaterals(&self, ctx: &Context<'_>, provider: &Address) -> TxResult<Vec<Collateral>> {
        let mut out = Vec::new();
        for pool in self.pools(ctx)? {
            if let Some(c) = self.collateral(ctx, pool.id, provider)? {
                out.push(c);
            }
        }
        Ok(out)
    }

    /// Every collateral position, by pool then provider.
    pub fn collaterals(&self, ctx: &Context<'_>) -> TxResult<Vec<Collateral>> {
        scan(ctx, &[keys::COLLATERAL_PREFIX])
    }

    // ── Purchases ────────────────────────────────────────────────────

    pub fn purchase(&self, ctx: &Context<'_>, tx_hash: &TxHash) -> TxResult<Option<Purchase>> {
        load(ctx, &keys::purchase_key(tx_hash))
    }

    /// Store a purchase and its pool index entry.
    pub fn set_purchase(&self, ctx: &mut Context<'_>, purchase: &Purchase) -> TxResult<()> {
        save(ctx, keys::purchase_key(&purchase.tx_hash), purchase)?;
        ctx.store_mut()
            .set(keys::pool_purchase_key(purchase.pool_id, &purchase.tx_hash), Vec::new());
        Ok(())
    }

    pub(crate) fn delete_purchase(&self, ctx: &mut Context<'_>, purchase: &Purchase) {
        ctx.store_mut().delete(&keys::purchase_key(&purchase.tx_hash));
        ctx.store_mut()
            .delete(&keys::pool_purchase_key(purchase.pool_id, &purchase.tx_hash));
    }

    /// All purchases in tx hash order.
    pub fn purchases(&self, ctx: &Context<'_>) -> TxResult<Vec<Purchase>> {
        scan(ctx, &[keys::PURCHASE_PREFIX])
    }

    /// Purchases against one pool, in tx hash order.
    pub fn pool_purchases(&self, ctx: &Context<'_>, pool_id: PoolId) -> TxResult<Vec<Purchase>> {
        let mut out = Vec::new();
        for (key, _) in ctx.store().prefix_scan(&keys::pool_purchase_prefix(pool_id)) {
            let hash = keys::tx_hash_from_pool_purchase_key(&key).ok_or_else(|| {
                abort(InvariantViolation::Corrupt {
                    key: keys::hex_key(&key),
                    reason: "malformed purchase index key".to_string(),
                })
            })?;
            let purchase = self.purchase(ctx, &hash)?.ok_or_else(|| {
                abort(InvariantViolation::Corrupt {
                    key: keys::hex_key(&key),
                    reason: format!("index points at missing purchase {hash}"),
                })
            })?;
            out.push(purchase);
        }
        Ok(out)
    }

    // ── Claims ───────────────────────────────────────────────────────

    pub fn claim(&self, ctx: &Context<'_>, proposal_id: ProposalId) -> TxResult<Option<Claim>> {
        load(ctx, &keys::claim_key(proposal_id))
    }

    pub(crate) fn require_claim(&self, ctx: &Context<'_>, proposal_id: ProposalId) -> TxResult<Claim> {
        self.claim(ctx, proposal_id)?
            .ok_or_else(|| ShieldError::ClaimNotFound(proposal_id).into())
    }

    pub fn set_claim(&self, ctx: &mut Context<'_>, claim: &Claim) -> TxResult<()> {
        save(ctx, keys::claim_key(claim.proposal_id), claim)
    }

    pub fn claims(&self, ctx: &Context<'_>) -> TxResult<Vec<Claim>> {
        scan(ctx, &[keys::CLAIM_PREFIX])
    }

    // ── Reimbursements ───────────────────────────────────────────────

    pub fn reimbursement(&self, ctx: &Context<'_>, proposal_id: ProposalId) -> TxResult<Option<Reimbursement>> {
        load(ctx, &keys::reimbursement_key(proposal_id))
    }

    pub fn set_reimbursement(
        &self,
        ctx: &mut Context<'_>,
        proposal_id: ProposalId,
        reimbursement: &Reimbursement,
    ) -> TxResult<()> {
        save(ctx, keys::reimbursement_key(proposal_id), reimbursement)
    }

    pub(crate) fn delete_reimbursement(&self, ctx: &mut Context<'_>, proposal_id: ProposalId) {
        ctx.store_mut().delete(&keys::reimbursement_key(proposal_id));
    }

    /// All scheduled reimbursements in proposal id order.
    pub fn reimbursements(&self, ctx: &Context<'_>) -> TxResult<Vec<ProposalReimbursement>> {
        let mut out = Vec::new();
        for (key, _) in ctx.store().prefix_scan(&[keys::REIMBURSEMENT_PREFIX]) {
            let id_bytes: [u8; 8] = key
                .get(1..)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| {
                    abort(InvariantViolation::Corrupt {
                        key: keys::hex_key(&key),
                        reason: "malformed reimbursement key".to_string(),
                    })
                })?;
            let proposal_id = ProposalId(u64::from_be_bytes(id_bytes));
            if let Some(reimbursement) = self.reimbursement(ctx, proposal_id)? {
                out.push(ProposalReimbursement {
                    proposal_id,
                    reimbursement,
                });
            }
        }
        Ok(out)
    }
}

// ── Store helpers ────────────────────────────────────────────────────

pub(crate) fn load<T: DeserializeOwned>(ctx: &Context<'_>, key: &[u8]) -> TxResult<Option<T>> {
    read_record(ctx.store(), key).map_err(abort)
}

pub(crate) fn save<T: Serialize>(ctx: &mut Context<'_>, key: Vec<u8>, value: &T) -> TxResult<()> {
    write_record(ctx.store_mut(), key, value).map_err(abort)
}

pub(crate) fn scan<T: DeserializeOwned>(ctx: &Context<'_>, prefix: &[u8]) -> TxResult<Vec<T>> {
    scan_records(ctx.store(), prefix).map_err(abort)
}

/// `a - b`, or a fatal overflow naming `operation`.
pub(crate) fn sub_amount(a: u64, b: u64, operation: &'static str) -> TxResult<u64> {
    a.checked_sub(b).ok_or_else(|| crate::error::overflow(operation))
}

/// `a + b`, or a fatal overflow naming `operation`.
pub(crate) fn add_amount(a: u64, b: u64, operation: &'static str) -> TxResult<u64> {
    a.checked_add(b).ok_or_else(|| crate::error::overflow(operation))
}

//! # Genesis
//!
//! [`GenesisState`] is the complete ledger state as one document. Export
//! followed by import into an empty store reproduces the same document.
//!
//! Import validates before writing anything:
//!
//! - parameters are well formed and the staking rate is positive,
//! - pool ids are unique and below `next_pool_id`,
//! - collaterals and purchases reference existing pools,
//! - each pool's `total_collateral` equals the sum of its positions,
//! - each provider's `collateral` and `total_locked` equal the sums over its
//!   positions.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shield_core::{sha256_hex, Address, Amount, CanonicalBytes, CanonicalizationError, MixedDecCoins, PoolId};
use shield_state::Claim;

use crate::bank::BankKeeper;
use crate::context::Context;
use crate::error::{ShieldError, TxResult};
use crate::keeper::Keeper;
use crate::params::{default_shield_staking_rate, ClaimProposalParams, PoolParams, ShieldConfig};
use crate::staking::StakingKeeper;
use crate::types::{Collateral, Pool, ProposalReimbursement, Provider, Purchase, Withdrawal};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisState {
    pub admin: Option<Address>,
    pub next_pool_id: PoolId,
    pub pool_params: PoolParams,
    pub claim_params: ClaimProposalParams,
    pub shield_staking_rate: Decimal,
    pub service_fees: MixedDecCoins,
    pub remaining_service_fees: MixedDecCoins,
    pub pools: Vec<Pool>,
    pub providers: Vec<Provider>,
    pub collaterals: Vec<Collateral>,
    pub purchases: Vec<Purchase>,
    pub withdraws: Vec<Withdrawal>,
    pub reimbursements: Vec<ProposalReimbursement>,
    pub claims: Vec<Claim>,
}

impl Default for GenesisState {
    fn default() -> Self {
        Self {
            admin: None,
            next_pool_id: PoolId(1),
            pool_params: PoolParams::default(),
            claim_params: ClaimProposalParams::default(),
            shield_staking_rate: default_shield_staking_rate(),
            service_fees: MixedDecCoins::default(),
            remaining_service_fees: MixedDecCoins::default(),
            pools: Vec::new(),
            providers: Vec::new(),
            collaterals: Vec::new(),
            purchases: Vec::new(),
            withdraws: Vec::new(),
            reimbursements: Vec::new(),
            claims: Vec::new(),
        }
    }
}

/// Failure to read a genesis document.
#[derive(Error, Debug)]
pub enum GenesisError {
    #[error("genesis is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("genesis is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ShieldConfig {
    /// Empty ledger state carrying this configuration's admin and params.
    pub fn genesis(&self) -> GenesisState {
        GenesisState {
            admin: self.admin.clone(),
            pool_params: self.pool_params.clone(),
            claim_params: self.claim_params.clone(),
            ..GenesisState::default()
        }
    }
}

fn invalid(reason: impl Into<String>) -> ShieldError {
    ShieldError::InvalidGenesis(reason.into())
}

impl GenesisState {
    /// Parse JSON (a document starting with `{`) or YAML.
    pub fn parse(text: &str) -> Result<Self, GenesisError> {
        if text.trim_start().starts_with('{') {
            Ok(serde_json::from_str(text)?)
        } else {
            Ok(serde_yaml::from_str(text)?)
        }
    }

    /// SHA-256 of the canonical JSON encoding.
    pub fn digest(&self) -> Result<String, CanonicalizationError> {
        Ok(sha256_hex(&CanonicalBytes::new(self)?))
    }

    pub fn validate(&self) -> Result<(), ShieldError> {
        self.pool_params.validate().map_err(|e| invalid(e.to_string()))?;
        self.claim_params.validate().map_err(|e| invalid(e.to_string()))?;
        if self.shield_staking_rate <= Decimal::ZERO {
            return Err(invalid(format!(
                "shield staking rate {} must be positive",
                self.shield_staking_rate
            )));
        }

        let mut pool_totals: BTreeMap<PoolId, Amount> = BTreeMap::new();
        for pool in &self.pools {
            if pool.id >= self.next_pool_id {
                return Err(invalid(format!("{} is not below next pool id {}", pool.id, self.next_pool_id)));
            }
            if pool_totals.insert(pool.id, 0).is_some() {
                return Err(invalid(format!("duplicate {}", pool.id)));
            }
        }

        let mut provider_sums: BTreeMap<&Address, (Amount, Amount)> = BTreeMap::new();
        let mut positions = BTreeSet::new();
        for c in &self.collaterals {
            let total = pool_totals
                .get_mut(&c.pool_id)
                .ok_or_else(|| invalid(format!("collateral of {} references unknown {}", c.provider, c.pool_id)))?;
            if !positions.insert((c.pool_id, &c.provider)) {
                return Err(invalid(format!("duplicate collateral of {} in {}", c.provider, c.pool_id)));
            }
            if c.withdrawing > c.amount {
                return Err(invalid(format!(
                    "collateral of {} in {} withdraws {} of {}",
                    c.provider, c.pool_id, c.withdrawing, c.amount
                )));
            }
            *total = total
                .checked_add(c.amount)
                .ok_or_else(|| invalid("pool collateral overflows"))?;
            let sums = provider_sums.entry(&c.provider).or_default();
            sums.0 = sums
                .0
                .checked_add(c.amount)
                .ok_or_else(|| invalid("provider collateral overflows"))?;
            sums.1 = c
                .locked()
                .and_then(|locked| sums.1.checked_add(locked))
                .ok_or_else(|| invalid("provider locked collateral overflows"))?;
        }

        for pool in &self.pools {
            let summed = pool_totals.get(&pool.id).copied().unwrap_or(0);
            if pool.total_collateral != summed {
                return Err(invalid(format!(
                    "{} total collateral {} does not match its positions ({summed})",
                    pool.id, pool.total_collateral
                )));
            }
        }

        let mut seen = BTreeSet::new();
        for provider in &self.providers {
            if !seen.insert(&provider.address) {
                return Err(invalid(format!("duplicate provider {}", provider.address)));
            }
            let (collateral, locked) = provider_sums.remove(&provider.address).unwrap_or((0, 0));
            if provider.collateral != collateral || provider.total_locked != locked {
                return Err(invalid(format!(
                    "provider {} records collateral {} locked {}, positions hold {collateral} locked {locked}",
                    provider.address, provider.collateral, provider.total_locked
                )));
            }
        }
        if let Some((address, _)) = provider_sums.into_iter().next() {
            return Err(invalid(format!("collateral held by unknown provider {address}")));
        }

        let mut hashes = BTreeSet::new();
        for purchase in &self.purchases {
            if !pool_totals.contains_key(&purchase.pool_id) {
                return Err(invalid(format!("purchase {} references unknown {}", purchase.tx_hash, purchase.pool_id)));
            }
            if !hashes.insert(purchase.tx_hash) {
                return Err(invalid(format!("duplicate purchase {}", purchase.tx_hash)));
            }
        }

        let mut claim_ids = BTreeSet::new();
        for claim in &self.claims {
            if !claim_ids.insert(claim.proposal_id) {
                return Err(invalid(format!("duplicate claim {}", claim.proposal_id)));
            }
        }
        let mut reimbursement_ids = BTreeSet::new();
        for r in &self.reimbursements {
            if !reimbursement_ids.insert(r.proposal_id) {
                return Err(invalid(format!("duplicate reimbursement {}", r.proposal_id)));
            }
        }
        Ok(())
    }
}

impl<S: StakingKeeper, B: BankKeeper> Keeper<S, B> {
    /// Validate `genesis` and write it into the store.
    pub fn init_genesis(&self, ctx: &mut Context<'_>, genesis: &GenesisState) -> TxResult<()> {
        genesis.validate()?;
        ctx.atomic(|ctx| {
            if let Some(admin) = &genesis.admin {
                self.set_admin(ctx, admin)?;
            }
            self.set_next_pool_id(ctx, genesis.next_pool_id)?;
            self.set_pool_params(ctx, &genesis.pool_params)?;
            self.set_claim_params(ctx, &genesis.claim_params)?;
            self.set_shield_staking_rate(ctx, genesis.shield_staking_rate)?;
            self.set_service_fees(ctx, &genesis.service_fees)?;
            self.set_remaining_service_fees(ctx, &genesis.remaining_service_fees)?;
            for pool in &genesis.pools {
                self.set_pool(ctx, pool)?;
            }
            for provider in &genesis.providers {
                self.set_provider(ctx, provider)?;
            }
            for collateral in &genesis.collaterals {
                self.set_collateral(ctx, collateral)?;
            }
            for purchase in &genesis.purchases {
                self.set_purchase(ctx, purchase)?;
            }
            for withdrawal in &genesis.withdraws {
                self.insert_withdrawal(ctx, withdrawal)?;
            }
            for r in &genesis.reimbursements {
                self.set_reimbursement(ctx, r.proposal_id, &r.reimbursement)?;
            }
            for claim in &genesis.claims {
                self.set_claim(ctx, claim)?;
            }
            tracing::info!(
                pools = genesis.pools.len(),
                providers = genesis.providers.len(),
                purchases = genesis.purchases.len(),
                "genesis imported"
            );
            Ok(())
        })
    }

    pub fn export_genesis(&self, ctx: &Context<'_>) -> TxResult<GenesisState> {
        Ok(GenesisState {
            admin: self.admin(ctx)?,
            next_pool_id: self.next_pool_id(ctx)?,
            pool_params: self.pool_params(ctx)?,
            claim_params: self.claim_params(ctx)?,
            shield_staking_rate: self.shield_staking_rate(ctx)?,
            service_fees: self.service_fees(ctx)?,
            remaining_service_fees: self.remaining_service_fees(ctx)?,
            pools: self.pools(ctx)?,
            providers: self.providers(ctx)?,
            collaterals: self.collaterals(ctx)?,
            purchases: self.purchases(ctx)?,
            withdraws: self.withdrawal_queue(ctx)?,
            reimbursements: self.reimbursements(ctx)?,
            claims: self.claims(ctx)?,
        })
    }
}

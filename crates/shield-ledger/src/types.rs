//! # Ledger Records
//!
//! Everything the keeper persists. Amounts of collateral and shield are whole
//! tokens of the staking denomination; premiums, fees and rewards are
//! decimal coins so that per-block accrual does not lose precision.

use serde::{Deserialize, Serialize};

use shield_core::{Address, Amount, Coins, DecCoins, MixedDecCoins, PoolId, ProposalId, Timestamp, TxHash};

/// A protection pool.
///
/// Coverage ends either at `end_time` (epoch seconds) or at
/// `end_block_height`; the unused bound is zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: PoolId,
    pub active: bool,
    pub description: String,
    /// Name of the project the pool protects.
    pub sponsor: String,
    pub sponsor_addr: Address,
    pub premium: MixedDecCoins,
    /// Unlocked collateral deposited in the pool.
    pub total_collateral: Amount,
    /// Coverage capacity not consumed by locked claims.
    pub shield: Amount,
    pub start_block_height: u64,
    #[serde(default)]
    pub end_time: i64,
    #[serde(default)]
    pub end_block_height: u64,
}

/// Aggregate staking-backed capacity of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub address: Address,
    /// Tokens bonded through delegations, as last seen.
    pub delegation_bonded: Amount,
    /// Unlocked collateral across all pools.
    pub collateral: Amount,
    /// Collateral locked against pending claims.
    pub total_locked: Amount,
    /// Bonded stake not yet pledged as collateral.
    pub available: Amount,
    /// Collateral with a pending withdrawal.
    pub withdrawing: Amount,
    #[serde(default)]
    pub rewards: MixedDecCoins,
}

impl Provider {
    pub fn new(address: Address, delegation_bonded: Amount) -> Self {
        Self {
            address,
            delegation_bonded,
            collateral: 0,
            total_locked: 0,
            available: delegation_bonded,
            withdrawing: 0,
            rewards: MixedDecCoins::default(),
        }
    }
}

/// A provider's share of one claim's locked loss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedCollateral {
    pub proposal_id: ProposalId,
    pub amount: Amount,
}

/// One provider's position in one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collateral {
    pub pool_id: PoolId,
    pub provider: Address,
    pub amount: Amount,
    #[serde(default)]
    pub withdrawing: Amount,
    #[serde(default)]
    pub locked_collaterals: Vec<LockedCollateral>,
}

impl Collateral {
    pub fn new(pool_id: PoolId, provider: Address, amount: Amount) -> Self {
        Self {
            pool_id,
            provider,
            amount,
            withdrawing: 0,
            locked_collaterals: Vec::new(),
        }
    }

    /// Amount that may still be requested for withdrawal.
    pub fn withdrawable(&self) -> Amount {
        self.amount.saturating_sub(self.withdrawing)
    }

    /// Total locked against all pending claims, or `None` on overflow.
    pub fn locked(&self) -> Option<Amount> {
        self.locked_collaterals
            .iter()
            .try_fold(0u64, |acc, l| acc.checked_add(l.amount))
    }
}

/// Coverage bought against a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub tx_hash: TxHash,
    pub pool_id: PoolId,
    /// Remaining coverage; reduced by locked claims.
    pub shield: Amount,
    pub start_block_height: u64,
    pub protection_end_time: Timestamp,
    pub claim_period_end_time: Timestamp,
    pub purchaser: Address,
    pub description: String,
    /// Fees paid but not yet accrued.
    pub service_fees: DecCoins,
    /// Fees have been accrued up to this time.
    pub fees_accrued_until: Timestamp,
}

/// A queued collateral withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub pool_id: PoolId,
    pub provider: Address,
    pub amount: Amount,
    pub completion_time: Timestamp,
}

/// A payout owed to a beneficiary once `payout_time` is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reimbursement {
    pub amount: Coins,
    pub beneficiary: Address,
    pub payout_time: Timestamp,
}

/// Reimbursement together with its key, for listings and genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalReimbursement {
    pub proposal_id: ProposalId,
    pub reimbursement: Reimbursement,
}

/// Ledger-wide totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub total_collateral: Amount,
    pub total_shield: Amount,
    pub total_locked: Amount,
    pub total_withdrawing: Amount,
    pub current_service_fees: MixedDecCoins,
    pub remaining_service_fees: MixedDecCoins,
}

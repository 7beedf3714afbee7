//! # Staking Collaborator
//!
//! Provider capacity is backed by stake that the staking subsystem owns. The
//! ledger reads delegations and unbonding delegations, converts between
//! validator shares and tokens, and, when a claim is approved, undelegates
//! stake or redirects unbonding entries into the shield module account.
//!
//! [`StakingKeeper`] is the whole surface the ledger uses. The types here
//! mirror the staking subsystem's records closely enough for the ledger to
//! rewrite them (push an unbonding entry's completion time out, move an entry
//! to another delegator) and hand them back.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shield_core::{Address, Amount, Timestamp, ValidatorAddress};

use crate::context::Context;

/// Module account holding bonded stake.
pub const BONDED_POOL_NAME: &str = "bonded_tokens_pool";
/// Module account holding unbonding stake.
pub const NOT_BONDED_POOL_NAME: &str = "not_bonded_tokens_pool";

/// Failures reported by the staking collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StakingError {
    #[error("validator {0} not found")]
    ValidatorNotFound(ValidatorAddress),

    #[error("validator {0} has no tokens; shares cannot be priced")]
    NoTokens(ValidatorAddress),

    #[error("validator {validator} has {available} shares, cannot remove {requested}")]
    InsufficientShares {
        validator: ValidatorAddress,
        available: Decimal,
        requested: Decimal,
    },

    #[error("share arithmetic overflow for {0}")]
    Overflow(ValidatorAddress),

    #[error("corrupt staking record: {0}")]
    Corrupt(String),

    #[error("token transfer failed: {0}")]
    Transfer(String),
}

/// A validator's token and share totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub operator: ValidatorAddress,
    pub tokens: Amount,
    pub delegator_shares: Decimal,
}

impl Validator {
    pub fn new(operator: ValidatorAddress) -> Self {
        Self {
            operator,
            tokens: 0,
            delegator_shares: Decimal::ZERO,
        }
    }

    /// Tokens represented by `shares`.
    pub fn tokens_from_shares(&self, shares: Decimal) -> Result<Decimal, StakingError> {
        if self.delegator_shares.is_zero() {
            return Ok(Decimal::ZERO);
        }
        shares
            .checked_mul(Decimal::from(self.tokens))
            .and_then(|v| v.checked_div(self.delegator_shares))
            .ok_or_else(|| StakingError::Overflow(self.operator.clone()))
    }

    /// Whole tokens represented by `shares`, truncated.
    pub fn token_amount_from_shares(&self, shares: Decimal) -> Result<Amount, StakingError> {
        self.tokens_from_shares(shares)?
            .trunc()
            .to_u64()
            .ok_or_else(|| StakingError::Overflow(self.operator.clone()))
    }

    /// Shares that `amount` tokens are worth.
    pub fn shares_from_tokens(&self, amount: Amount) -> Result<Decimal, StakingError> {
        if self.tokens == 0 {
            return Err(StakingError::NoTokens(self.operator.clone()));
        }
        self.delegator_shares
            .checked_mul(Decimal::from(amount))
            .and_then(|v| v.checked_div(Decimal::from(self.tokens)))
            .ok_or_else(|| StakingError::Overflow(self.operator.clone()))
    }
}

/// A delegator's shares at one validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegator: Address,
    pub validator: ValidatorAddress,
    pub shares: Decimal,
}

/// One pending unbond.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingEntry {
    pub creation_height: u64,
    pub completion_time: Timestamp,
    pub initial_balance: Amount,
    pub balance: Amount,
}

/// All pending unbonds of a delegator at one validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingDelegation {
    pub delegator: Address,
    pub validator: ValidatorAddress,
    pub entries: Vec<UnbondingEntry>,
}

impl UnbondingDelegation {
    pub fn new(delegator: Address, validator: ValidatorAddress) -> Self {
        Self {
            delegator,
            validator,
            entries: Vec::new(),
        }
    }

    pub fn pair(&self) -> DvPair {
        DvPair {
            delegator: self.delegator.clone(),
            validator: self.validator.clone(),
        }
    }
}

/// Delegator/validator pair stored in the unbonding queue.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DvPair {
    pub delegator: Address,
    pub validator: ValidatorAddress,
}

/// What the ledger needs from the staking subsystem.
///
/// Reads take `&Context`, writes `&mut Context`; the staking subsystem keeps
/// its records in the same store, so ledger writes and staking writes commit
/// or roll back together.
pub trait StakingKeeper {
    /// Denomination of staked tokens; collateral and shield are in it.
    fn bond_denom(&self) -> &str;

    /// Module account name of the bonded pool.
    fn bonded_pool_name(&self) -> &str {
        BONDED_POOL_NAME
    }

    fn validator(
        &self,
        ctx: &Context<'_>,
        operator: &ValidatorAddress,
    ) -> Result<Option<Validator>, StakingError>;

    fn delegator_delegations(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
    ) -> Result<Vec<Delegation>, StakingError>;

    fn set_delegation(&self, ctx: &mut Context<'_>, delegation: &Delegation) -> Result<(), StakingError>;

    fn remove_delegation(&self, ctx: &mut Context<'_>, delegation: &Delegation) -> Result<(), StakingError>;

    /// Burn `shares` from the validator and return the tokens they were
    /// worth.
    fn remove_validator_tokens_and_shares(
        &self,
        ctx: &mut Context<'_>,
        operator: &ValidatorAddress,
        shares: Decimal,
    ) -> Result<Amount, StakingError>;

    fn unbonding_delegations(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
    ) -> Result<Vec<UnbondingDelegation>, StakingError>;

    fn unbonding_delegation(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
        validator: &ValidatorAddress,
    ) -> Result<Option<UnbondingDelegation>, StakingError>;

    fn set_unbonding_delegation(
        &self,
        ctx: &mut Context<'_>,
        ubd: &UnbondingDelegation,
    ) -> Result<(), StakingError>;

    fn remove_unbonding_delegation(
        &self,
        ctx: &mut Context<'_>,
        ubd: &UnbondingDelegation,
    ) -> Result<(), StakingError>;

    /// Pairs whose unbonds mature at exactly `time`.
    fn ubd_queue_time_slice(&self, ctx: &Context<'_>, time: Timestamp) -> Result<Vec<DvPair>, StakingError>;

    /// Replace the slice at `time`; an empty slice removes it.
    fn set_ubd_queue_time_slice(
        &self,
        ctx: &mut Context<'_>,
        time: Timestamp,
        pairs: &[DvPair],
    ) -> Result<(), StakingError>;

    /// Append the ubd's pair to the slice at `completion_time`.
    fn insert_ubd_queue(
        &self,
        ctx: &mut Context<'_>,
        ubd: &UnbondingDelegation,
        completion_time: Timestamp,
    ) -> Result<(), StakingError>;

    fn before_delegation_shares_modified(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &ValidatorAddress,
    ) -> Result<(), StakingError>;

    fn after_delegation_modified(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &ValidatorAddress,
    ) -> Result<(), StakingError>;
}

//! # Ledger Errors
//!
//! Two tiers that never mix:
//!
//! - [`ShieldError`]: the caller asked for something the ledger will not do
//!   (wrong admin, not enough capacity, too early to pay out). The operation
//!   is rejected and the store is left as it was.
//! - [`InvariantViolation`]: the ledger found its own state inconsistent
//!   (a provider vanished mid-lock, stake cannot back a lock, a record does
//!   not decode). The whole state transition must be aborted.
//!
//! Every keeper operation returns [`TxResult`], whose error is a
//! [`TxError`] carrying one tier or the other.

use thiserror::Error;

use shield_core::{Address, Amount, CoreError, PoolId, ProposalId, Timestamp, TxHash, ValidatorAddress};
use shield_state::ClaimError;

use crate::bank::BankError;
use crate::staking::StakingError;

/// Recoverable validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShieldError {
    #[error("{caller} is not the shield admin")]
    NotShieldAdmin { caller: Address },

    #[error("pool life too short: coverage of {coverage_secs}s does not exceed the minimum of {min_secs}s")]
    PoolLifeTooShort { coverage_secs: i64, min_secs: i64 },

    #[error("insufficient staking for {provider}: available {available}, requested {requested}")]
    InsufficientStaking {
        provider: Address,
        available: Amount,
        requested: Amount,
    },

    #[error("no pool found for {0}")]
    NoPoolFound(PoolId),

    #[error("no collateral found for {provider} in {pool_id}")]
    NoCollateralFound { pool_id: PoolId, provider: Address },

    #[error("over-withdrawal: requested {requested}, withdrawable {withdrawable}")]
    OverWithdrawal { requested: Amount, withdrawable: Amount },

    #[error("withdrawing {requested} from {pool_id} would leave its shield unbacked: {free} free")]
    ShieldUnbacked {
        pool_id: PoolId,
        requested: Amount,
        free: Amount,
    },

    #[error("not enough collateral in {pool_id}: requested {requested}, available {available}")]
    NotEnoughCollateral {
        pool_id: PoolId,
        requested: Amount,
        available: Amount,
    },

    #[error("not enough shield: requested {requested}, available {available}")]
    NotEnoughShield { requested: Amount, available: Amount },

    #[error("provider {0} not found")]
    ProviderNotFound(Address),

    #[error("{caller} is not the beneficiary of this reimbursement")]
    InvalidBeneficiary { caller: Address },

    #[error("reimbursement for {proposal_id} cannot be paid yet: {reason}")]
    NotPayoutTime { proposal_id: ProposalId, reason: String },

    #[error("no reimbursement found for {0}")]
    CompensationNotFound(ProposalId),

    #[error("cannot extend {pool_id} by {dimension}: that coverage dimension was never set")]
    CannotExtend {
        pool_id: PoolId,
        dimension: &'static str,
    },

    #[error("{0} is already paused")]
    PoolAlreadyPaused(PoolId),

    #[error("{0} is already active")]
    PoolAlreadyActive(PoolId),

    #[error("{0} is not accepting purchases")]
    PoolInactive(PoolId),

    #[error("purchase {0} not found")]
    PurchaseNotFound(TxHash),

    #[error("purchase {0} already exists")]
    PurchaseAlreadyExists(TxHash),

    #[error("claim {0} already exists")]
    ClaimAlreadyExists(ProposalId),

    #[error("claim {0} not found")]
    ClaimNotFound(ProposalId),

    #[error("reimbursement for {0} already scheduled")]
    ReimbursementExists(ProposalId),

    #[error(transparent)]
    Claim(#[from] ClaimError),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("{0} has no rewards to withdraw")]
    NoRewards(Address),

    #[error("transfer failed: {0}")]
    Transfer(#[from] BankError),

    #[error("invalid genesis: {0}")]
    InvalidGenesis(String),
}

/// Broken ledger invariants. Always fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("provider {0} missing while locking or releasing collateral")]
    ProviderNotFound(Address),

    #[error("provider {provider} has collateral {collateral}, cannot lock {requested}")]
    InsufficientCollateral {
        provider: Address,
        collateral: Amount,
        requested: Amount,
    },

    #[error("provider {provider} is short {short} of bonded and unbonding stake")]
    InsufficientBackingStake { provider: Address, short: Amount },

    #[error("validator {0} not found")]
    ValidatorNotFound(ValidatorAddress),

    #[error("{pool_id} referenced by a record does not exist")]
    DanglingPool { pool_id: PoolId },

    #[error("unlocking {unlocked} for {proposal_id} exceeds the claimed loss {loss}")]
    UnlockExceedsLoss {
        proposal_id: ProposalId,
        unlocked: Amount,
        loss: Amount,
    },

    #[error("internal transfer failed during {operation}: {error}")]
    Transfer {
        operation: &'static str,
        error: BankError,
    },

    #[error("staking collaborator failed: {0}")]
    Staking(StakingError),

    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("time overflow adding {secs}s to {base}")]
    TimeOverflow { base: Timestamp, secs: i64 },

    #[error("corrupt record at key {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("cannot encode record: {0}")]
    Encode(String),
}

/// Error of a ledger operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    /// The operation was refused; no state changed.
    #[error(transparent)]
    Rejected(#[from] ShieldError),

    /// The ledger is inconsistent; the state transition must be aborted.
    #[error("state transition aborted: {0}")]
    Aborted(#[from] InvariantViolation),
}

impl TxError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }

    /// The recoverable error, if this was a rejection.
    pub fn rejection(&self) -> Option<&ShieldError> {
        match self {
            Self::Rejected(e) => Some(e),
            Self::Aborted(_) => None,
        }
    }
}

impl From<ClaimError> for TxError {
    fn from(e: ClaimError) -> Self {
        TxError::Rejected(ShieldError::Claim(e))
    }
}

/// Overflow in coin arithmetic is fatal; any other core error means the
/// caller supplied a malformed amount.
impl From<CoreError> for TxError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Overflow { operation } => abort(InvariantViolation::Overflow(operation)),
            other => TxError::Rejected(ShieldError::InvalidAmount(other.to_string())),
        }
    }
}

pub type TxResult<T> = Result<T, TxError>;

/// Log an invariant violation and wrap it as a fatal error.
pub(crate) fn abort(violation: InvariantViolation) -> TxError {
    tracing::error!(%violation, "aborting state transition");
    TxError::Aborted(violation)
}

pub(crate) fn staking_failure(e: StakingError) -> TxError {
    match e {
        StakingError::ValidatorNotFound(v) => abort(InvariantViolation::ValidatorNotFound(v)),
        other => abort(InvariantViolation::Staking(other)),
    }
}

pub(crate) fn overflow(operation: &'static str) -> TxError {
    abort(InvariantViolation::Overflow(operation))
}

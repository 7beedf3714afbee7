//! # Claim Lifecycle State Machine
//!
//! Tracks one loss claim from submission to its terminal state.
//!
//! ## States
//!
//! ```text
//! Submitted ──lock──▶ Locked ──approve──▶ Approved ──reimburse──▶ Reimbursing ──pay──▶ Paid
//!                        │
//!                        └──reject──▶ Rejected ──unlock──▶ Unlocked
//! ```
//!
//! `Paid` and `Unlocked` are terminal. `Locked` is the only state in which
//! the claim holds provider collateral; a purchase referenced by a locked
//! claim cannot expire.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use shield_core::{Address, Amount, Coins, PoolId, ProposalId, Timestamp, TxHash};

// ─── Claim State ─────────────────────────────────────────────────────

/// The lifecycle state of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimState {
    /// Claim recorded, collateral not yet locked.
    Submitted,
    /// Provider collateral locked against the loss.
    Locked,
    /// Loss validated; reimbursement not yet scheduled.
    Approved,
    /// Reimbursement scheduled, waiting for payout time.
    Reimbursing,
    /// Beneficiary paid (terminal).
    Paid,
    /// Loss rejected; collateral not yet released.
    Rejected,
    /// Locked collateral returned to providers (terminal).
    Unlocked,
}

impl ClaimState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Unlocked)
    }

    /// Whether the claim currently holds locked collateral.
    pub fn holds_collateral(&self) -> bool {
        matches!(self, Self::Locked)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Locked => "LOCKED",
            Self::Approved => "APPROVED",
            Self::Reimbursing => "REIMBURSING",
            Self::Paid => "PAID",
            Self::Rejected => "REJECTED",
            Self::Unlocked => "UNLOCKED",
        }
    }
}

impl std::fmt::Display for ClaimState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors raised by claim transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    /// Attempted transition is not valid from the current state.
    #[error("invalid claim transition for {proposal_id}: {from} -> {to}")]
    InvalidTransition {
        proposal_id: ProposalId,
        from: ClaimState,
        to: ClaimState,
    },

    /// Claim already reached a terminal state.
    #[error("claim {proposal_id} is in terminal state {state}")]
    TerminalState {
        proposal_id: ProposalId,
        state: ClaimState,
    },
}

// ─── Transition Log ──────────────────────────────────────────────────

/// Record of one claim state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimTransitionRecord {
    pub from_state: ClaimState,
    pub to_state: ClaimState,
    /// Block time of the transition.
    pub at: Timestamp,
    pub reason: String,
}

// ─── Claim ───────────────────────────────────────────────────────────

/// A loss claim against a pool, keyed by its proposal id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub proposal_id: ProposalId,
    pub pool_id: PoolId,
    /// Purchase whose coverage the loss consumes.
    pub purchase_tx_hash: TxHash,
    pub loss: Coins,
    pub proposer: Address,
    pub state: ClaimState,
    /// Total collateral actually locked across providers.
    #[serde(default)]
    pub locked_amount: Amount,
    /// End of the lock window pushed into the unbonding queue.
    #[serde(default)]
    pub lock_end_time: Option<Timestamp>,
    pub submitted_at: Timestamp,
    #[serde(default)]
    pub transitions: Vec<ClaimTransitionRecord>,
}

impl Claim {
    pub fn submit(
        proposal_id: ProposalId,
        pool_id: PoolId,
        purchase_tx_hash: TxHash,
        loss: Coins,
        proposer: Address,
        at: Timestamp,
    ) -> Self {
        Self {
            proposal_id,
            pool_id,
            purchase_tx_hash,
            loss,
            proposer,
            state: ClaimState::Submitted,
            locked_amount: 0,
            lock_end_time: None,
            submitted_at: at,
            transitions: Vec::new(),
        }
    }

    /// SUBMITTED → LOCKED.
    pub fn mark_locked(
        &mut self,
        locked_amount: Amount,
        lock_end_time: Timestamp,
        at: Timestamp,
    ) -> Result<(), ClaimError> {
        self.require_state(ClaimState::Submitted, ClaimState::Locked)?;
        self.locked_amount = locked_amount;
        self.lock_end_time = Some(lock_end_time);
        self.do_transition(ClaimState::Locked, at, "collateral locked");
        Ok(())
    }

    /// LOCKED → APPROVED.
    pub fn approve(&mut self, at: Timestamp) -> Result<(), ClaimError> {
        self.require_state(ClaimState::Locked, ClaimState::Approved)?;
        self.do_transition(ClaimState::Approved, at, "loss approved");
        Ok(())
    }

    /// APPROVED → REIMBURSING.
    pub fn begin_reimbursing(&mut self, at: Timestamp) -> Result<(), ClaimError> {
        self.require_state(ClaimState::Approved, ClaimState::Reimbursing)?;
        self.do_transition(ClaimState::Reimbursing, at, "reimbursement scheduled");
        Ok(())
    }

    /// REIMBURSING → PAID.
    pub fn mark_paid(&mut self, at: Timestamp) -> Result<(), ClaimError> {
        self.require_state(ClaimState::Reimbursing, ClaimState::Paid)?;
        self.do_transition(ClaimState::Paid, at, "beneficiary paid");
        Ok(())
    }

    /// LOCKED → REJECTED.
    pub fn reject(&mut self, at: Timestamp) -> Result<(), ClaimError> {
        self.require_state(ClaimState::Locked, ClaimState::Rejected)?;
        self.do_transition(ClaimState::Rejected, at, "loss rejected");
        Ok(())
    }

    /// REJECTED → UNLOCKED.
    pub fn mark_unlocked(&mut self, at: Timestamp) -> Result<(), ClaimError> {
        self.require_state(ClaimState::Rejected, ClaimState::Unlocked)?;
        self.do_transition(ClaimState::Unlocked, at, "collateral unlocked");
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn require_state(&self, expected: ClaimState, target: ClaimState) -> Result<(), ClaimError> {
        if self.state.is_terminal() {
            return Err(ClaimError::TerminalState {
                proposal_id: self.proposal_id,
                state: self.state,
            });
        }
        if self.state != expected {
            return Err(ClaimError::InvalidTransition {
                proposal_id: self.proposal_id,
                from: self.state,
                to: target,
            });
        }
        Ok(())
    }

    fn do_transition(&mut self, to: ClaimState, at: Timestamp, reason: &str) {
        self.transitions.push(ClaimTransitionRecord {
            from_state: self.state,
            to_state: to,
            at,
            reason: reason.to_string(),
        });
        self.state = to;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

//! # shield-state — Claim Lifecycle
//!
//! A loss claim moves through collateral locking and then one of two
//! resolutions:
//!
//! ```text
//! Submitted ──▶ Locked ──▶ Approved ──▶ Reimbursing ──▶ Paid
//!                  │
//!                  └──────▶ Rejected ──▶ Unlocked
//! ```
//!
//! The ledger drives these transitions from its claim operations and stores
//! the [`Claim`] record, transition log included, under the proposal id.
//! Timestamps are block times supplied by the caller.

pub mod claim;

pub use claim::{Claim, ClaimError, ClaimState, ClaimTransitionRecord};

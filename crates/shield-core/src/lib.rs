//! # shield-core — Foundational Types for the Shield Ledger
//!
//! Leaf crate of the workspace. Everything the ledger stores or hashes is
//! built from the types defined here.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype identifiers.** `Address`, `ValidatorAddress`, `PoolId`,
//!    `ProposalId`, `TxHash` are distinct types with validated constructors.
//!
//! 2. **Checked coin arithmetic.** `Coins` and `DecCoins` never hold zero or
//!    negative entries, and every operation that can overflow returns an
//!    error instead of wrapping.
//!
//! 3. **Canonical encoding.** Store values and hashed documents go through
//!    `CanonicalBytes`, so equal state encodes to equal bytes on every node.
//!
//! 4. **Block time only.** `Timestamp` has no `now()`. Time enters the ledger
//!    through the block header.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `shield-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod coins;
pub mod digest;
pub mod error;
pub mod identity;
pub mod temporal;

pub use canonical::{decode, CanonicalBytes};
pub use coins::{validate_denom, Amount, Coins, DecCoins, MixedCoins, MixedDecCoins};
pub use digest::{sha256_digest, sha256_hex, ContentDigest};
pub use error::{CanonicalizationError, CoreError};
pub use identity::{Address, PoolId, ProposalId, TxHash, ValidatorAddress};
pub use temporal::Timestamp;

/// Re-exported so downstream crates name one decimal type.
pub use rust_decimal::Decimal;

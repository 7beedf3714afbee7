//! # shield-ledger — Protection-Pool Accounting Engine
//!
//! Staking-backed coverage pools. The shield admin opens pools backed by
//! their own stake, providers pledge bonded stake as collateral, purchasers
//! buy coverage, and approved loss claims are paid out of the locked
//! collateral of every provider in the pool.
//!
//! ## Modules
//!
//! - **Infrastructure**: `store` (ordered KV store and cache overlay),
//!   `context` (store handle, block header, atomic execution), `codec`,
//!   `keys`, `error`, `params`, `types`.
//! - **Collaborators**: `staking` and `bank` define what the ledger needs
//!   from the staking and supply subsystems; `mock` implements both in
//!   memory.
//! - **Operations**: `keeper` plus one `impl Keeper` block per concern in
//!   `pool`, `provider`, `collateral`, `withdraw`, `purchase`, `claim`,
//!   `undelegate`, `reimbursement`.
//! - **Lifecycle**: `abci` (begin/end block), `genesis` (import, export,
//!   validation), `query` (paginated read surface).
//!
//! ## Execution Model
//!
//! There is no global state. Every operation takes a [`Context`] and runs
//! all-or-nothing through [`Context::atomic`]. Errors come in two tiers:
//! [`ShieldError`] rejects a request, [`InvariantViolation`] aborts the
//! state transition.
//!
//! ## Crate Policy
//!
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests and the `test-utils`
//!   fixture.
//! - No wall-clock reads; time comes from the block header.

pub mod abci;
pub mod bank;
pub mod claim;
pub mod codec;
pub mod collateral;
pub mod context;
pub mod error;
pub mod genesis;
pub mod keeper;
pub mod keys;
pub mod mock;
pub mod params;
pub mod pool;
pub mod provider;
pub mod purchase;
pub mod query;
pub mod reimbursement;
pub mod staking;
pub mod store;
pub mod types;
pub mod undelegate;
pub mod withdraw;

pub use abci::EndBlockSummary;
pub use bank::{BankError, BankKeeper, SHIELD_MODULE_NAME};
pub use claim::lock_amount;
pub use context::{BlockHeader, Context};
pub use error::{InvariantViolation, ShieldError, TxError, TxResult};
pub use genesis::{GenesisError, GenesisState};
pub use keeper::Keeper;
pub use mock::{MemBank, MemStaking};
pub use params::{ClaimProposalParams, ConfigError, PoolParams, ShieldConfig, StakingRateMigration};
pub use pool::{CreatePoolRequest, UpdatePoolRequest};
pub use purchase::{FeeSummary, PurchaseRequest};
pub use query::{Page, PageRequest};
pub use staking::{StakingError, StakingKeeper};
pub use store::{CacheStore, KvStore, MemStore};
pub use shield_state::{Claim, ClaimState};
pub use types::{Collateral, LockedCollateral, Pool, Provider, Purchase, Reimbursement, StatusReport, Withdrawal};

#[cfg(any(test, feature = "test-utils"))]
pub use mock::TestEnv;

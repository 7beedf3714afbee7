//! # Supply/Transfer Collaborator
//!
//! The ledger moves tokens only through [`BankKeeper`]: premiums from
//! purchasers into the shield module account, undelegated stake from the
//! bonded pool into the shield module account, and payouts from the shield
//! module account to beneficiaries and providers.

use thiserror::Error;

use shield_core::{Address, Coins};

use crate::context::Context;

/// Name of the module account that holds premiums and reimbursement funds.
pub const SHIELD_MODULE_NAME: &str = "shield";

/// Failures reported by the bank collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BankError {
    #[error("insufficient funds in {address}: need {needed}, have {available}")]
    InsufficientFunds {
        address: Address,
        needed: Coins,
        available: Coins,
    },

    #[error("unknown module account {0:?}")]
    UnknownModule(String),

    #[error("balance overflow crediting {0}")]
    Overflow(Address),

    #[error("corrupt bank record: {0}")]
    Corrupt(String),
}

/// Token movements the ledger needs.
pub trait BankKeeper {
    /// Account address of a named module.
    fn module_address(&self, module: &str) -> Result<Address, BankError>;

    fn balance(&self, ctx: &Context<'_>, address: &Address) -> Result<Coins, BankError>;

    fn send_coins_from_module_to_module(
        &self,
        ctx: &mut Context<'_>,
        sender_module: &str,
        recipient_module: &str,
        amount: &Coins,
    ) -> Result<(), BankError>;

    fn send_coins_from_module_to_account(
        &self,
        ctx: &mut Context<'_>,
        sender_module: &str,
        recipient: &Address,
        amount: &Coins,
    ) -> Result<(), BankError>;

    fn send_coins_from_account_to_module(
        &self,
        ctx: &mut Context<'_>,
        sender: &Address,
        recipient_module: &str,
        amount: &Coins,
    ) -> Result<(), BankError>;
}

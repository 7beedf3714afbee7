//! # In-Memory Collaborators
//!
//! [`MemStaking`] and [`MemBank`] implement the collaborator traits against
//! the same store the ledger writes, under prefixes the ledger never uses
//! (`0xF0` staking, `0xF1` bank). Rollback of a failed operation therefore
//! covers staking and bank writes too.
//!
//! They back the CLI's replay and demo commands. Behind the `test-utils`
//! feature, [`TestEnv`] bundles them with a store and block header for
//! tests.
//!
//! Module accounts are ordinary addresses of the form `module:<name>`.

use rust_decimal::Decimal;

use shield_core::{Address, Amount, Coins, Timestamp, ValidatorAddress};

use crate::bank::{BankError, BankKeeper, SHIELD_MODULE_NAME};
use crate::codec::{read_record, scan_records, write_record};
use crate::context::Context;
use crate::error::InvariantViolation;
use crate::keys::sortable_time;
use crate::staking::{
    Delegation, DvPair, StakingError, StakingKeeper, UnbondingDelegation, UnbondingEntry, Validator,
    BONDED_POOL_NAME, NOT_BONDED_POOL_NAME,
};
use crate::store::prefix_end;

/// Staking denomination used by the in-memory collaborators by default.
pub const DEFAULT_BOND_DENOM: &str = "ustake";

/// Unbonding period of [`MemStaking`] unless overridden.
pub const DEFAULT_UNBONDING_SECS: i64 = 21 * 86_400;

const STAKING_PREFIX: u8 = 0xF0;
const BANK_PREFIX: u8 = 0xF1;

fn key(prefix: u8, table: u8, parts: &[&[u8]]) -> Vec<u8> {
    let mut k = vec![prefix, table];
    for p in parts {
        k.extend_from_slice(p);
    }
    k
}

/// Length-prefixed so that one address is never a prefix of another's key.
fn lp(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 1);
    out.push(u8::try_from(bytes.len()).unwrap_or(u8::MAX));
    out.extend_from_slice(bytes);
    out
}

fn validator_key(v: &ValidatorAddress) -> Vec<u8> {
    key(STAKING_PREFIX, 0x01, &[v.as_bytes()])
}

fn delegations_prefix(delegator: &Address) -> Vec<u8> {
    key(STAKING_PREFIX, 0x02, &[&lp(delegator.as_bytes())])
}

fn delegation_key(delegator: &Address, v: &ValidatorAddress) -> Vec<u8> {
    key(STAKING_PREFIX, 0x02, &[&lp(delegator.as_bytes()), v.as_bytes()])
}

fn ubds_prefix(delegator: &Address) -> Vec<u8> {
    key(STAKING_PREFIX, 0x03, &[&lp(delegator.as_bytes())])
}

fn ubd_key(delegator: &Address, v: &ValidatorAddress) -> Vec<u8> {
    key(STAKING_PREFIX, 0x03, &[&lp(delegator.as_bytes()), v.as_bytes()])
}

fn ubd_queue_key(time: Timestamp) -> Vec<u8> {
    key(STAKING_PREFIX, 0x04, &[&sortable_time(time)])
}

fn balance_key(address: &Address) -> Vec<u8> {
    key(BANK_PREFIX, 0x01, &[address.as_bytes()])
}

const SUPPLY_KEY: &[u8] = &[BANK_PREFIX, 0x02];

fn corrupt(e: InvariantViolation) -> StakingError {
    StakingError::Corrupt(e.to_string())
}

fn bank_corrupt(e: InvariantViolation) -> BankError {
    BankError::Corrupt(e.to_string())
}

fn transfer_failed(e: BankError) -> StakingError {
    StakingError::Transfer(e.to_string())
}

// ── MemStaking ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MemStaking {
    bond_denom: String,
    unbonding_secs: i64,
}

impl Default for MemStaking {
    fn default() -> Self {
        Self::new(DEFAULT_BOND_DENOM)
    }
}

impl MemStaking {
    pub fn new(bond_denom: impl Into<String>) -> Self {
        Self {
            bond_denom: bond_denom.into(),
            unbonding_secs: DEFAULT_UNBONDING_SECS,
        }
    }

    pub fn with_unbonding_secs(mut self, secs: i64) -> Self {
        self.unbonding_secs = secs;
        self
    }

    pub fn unbonding_secs(&self) -> i64 {
        self.unbonding_secs
    }

    pub fn set_validator(&self, ctx: &mut Context<'_>, validator: &Validator) -> Result<(), StakingError> {
        write_record(ctx.store_mut(), validator_key(&validator.operator), validator).map_err(corrupt)
    }

    fn coins(&self, amount: Amount) -> Result<Coins, StakingError> {
        Coins::from_coin(&self.bond_denom, amount).map_err(|e| StakingError::Corrupt(e.to_string()))
    }

    /// Bond `amount` of the delegator's liquid tokens to `operator`,
    /// creating the validator on first use. Returns the shares issued.
    pub fn delegate(
        &self,
        ctx: &mut Context<'_>,
        bank: &MemBank,
        delegator: &Address,
        operator: &ValidatorAddress,
        amount: Amount,
    ) -> Result<Decimal, StakingError> {
        bank.send_coins_from_account_to_module(ctx, delegator, BONDED_POOL_NAME, &self.coins(amount)?)
            .map_err(transfer_failed)?;
        let mut validator = self
            .validator(ctx, operator)?
            .unwrap_or_else(|| Validator::new(operator.clone()));
        let shares = if validator.tokens == 0 {
            Decimal::from(amount)
        } else {
            validator.shares_from_tokens(amount)?
        };
        validator.tokens = validator
            .tokens
            .checked_add(amount)
            .ok_or_else(|| StakingError::Overflow(operator.clone()))?;
        validator.delegator_shares += shares;
        self.set_validator(ctx, &validator)?;

        let existing: Option<Delegation> =
            read_record(ctx.store(), &delegation_key(delegator, operator)).map_err(corrupt)?;
        let delegation = Delegation {
            delegator: delegator.clone(),
            validator: operator.clone(),
            shares: existing.map_or(Decimal::ZERO, |d| d.shares) + shares,
        };
        self.set_delegation(ctx, &delegation)?;
        Ok(shares)
    }

    /// Start unbonding `amount` tokens. Returns the completion time.
    pub fn undelegate(
        &self,
        ctx: &mut Context<'_>,
        bank: &MemBank,
        delegator: &Address,
        operator: &ValidatorAddress,
        amount: Amount,
    ) -> Result<Timestamp, StakingError> {
        let delegation: Delegation = read_record(ctx.store(), &delegation_key(delegator, operator))
            .map_err(corrupt)?
            .ok_or_else(|| StakingError::Corrupt(format!("no delegation of {delegator} to {operator}")))?;
        let validator = self
            .validator(ctx, operator)?
            .ok_or_else(|| StakingError::ValidatorNotFound(operator.clone()))?;
        let shares = validator.shares_from_tokens(amount)?.min(delegation.shares);
        let tokens = self.remove_validator_tokens_and_shares(ctx, operator, shares)?;
        let remaining = Delegation {
            shares: delegation.shares - shares,
            ..delegation
        };
        if remaining.shares.is_zero() {
            self.remove_delegation(ctx, &remaining)?;
        } else {
            self.set_delegation(ctx, &remaining)?;
        }
        bank.send_coins_from_module_to_module(ctx, BONDED_POOL_NAME, NOT_BONDED_POOL_NAME, &self.coins(tokens)?)
            .map_err(transfer_failed)?;

        let now = ctx.block_time();
        let completion_time = now
            .checked_add_secs(self.unbonding_secs)
            .ok_or_else(|| StakingError::Corrupt(format!("unbonding time overflows {now}")))?;
        let mut ubd = self
            .unbonding_delegation(ctx, delegator, operator)?
            .unwrap_or_else(|| UnbondingDelegation::new(delegator.clone(), operator.clone()));
        ubd.entries.push(UnbondingEntry {
            creation_height: ctx.block_height(),
            completion_time,
            initial_balance: tokens,
            balance: tokens,
        });
        self.set_unbonding_delegation(ctx, &ubd)?;
        self.insert_ubd_queue(ctx, &ubd, completion_time)?;
        Ok(completion_time)
    }

    /// Pay out every unbonding entry matured by the block time. Returns the
    /// total paid.
    pub fn complete_unbonding(&self, ctx: &mut Context<'_>, bank: &MemBank) -> Result<Amount, StakingError> {
        let now = ctx.block_time();
        let end = prefix_end(&ubd_queue_key(now));
        let matured = ctx.store().range(&[STAKING_PREFIX, 0x04], end.as_deref());
        let mut pairs: Vec<DvPair> = Vec::new();
        for (k, _) in matured {
            let slice: Vec<DvPair> = read_record(ctx.store(), &k).map_err(corrupt)?.unwrap_or_default();
            ctx.store_mut().delete(&k);
            pairs.extend(slice);
        }
        pairs.sort();
        pairs.dedup();

        let mut paid: Amount = 0;
        for pair in pairs {
            let Some(mut ubd) = self.unbonding_delegation(ctx, &pair.delegator, &pair.validator)? else {
                continue;
            };
            let (done, pending): (Vec<_>, Vec<_>) = ubd.entries.into_iter().partition(|e| e.completion_time <= now);
            ubd.entries = pending;
            let amount: Amount = done.iter().map(|e| e.balance).sum();
            if amount > 0 {
                bank.send_coins_from_module_to_account(ctx, NOT_BONDED_POOL_NAME, &pair.delegator, &self.coins(amount)?)
                    .map_err(transfer_failed)?;
                paid = paid.saturating_add(amount);
            }
            if ubd.entries.is_empty() {
                self.remove_unbonding_delegation(ctx, &ubd)?;
            } else {
                self.set_unbonding_delegation(ctx, &ubd)?;
            }
        }
        Ok(paid)
    }
}

impl StakingKeeper for MemStaking {
    fn bond_denom(&self) -> &str {
        &self.bond_denom
    }

    fn validator(&self, ctx: &Context<'_>, operator: &ValidatorAddress) -> Result<Option<Validator>, StakingError> {
        read_record(ctx.store(), &validator_key(operator)).map_err(corrupt)
    }

    fn delegator_delegations(&self, ctx: &Context<'_>, delegator: &Address) -> Result<Vec<Delegation>, StakingError> {
        scan_records(ctx.store(), &delegations_prefix(delegator)).map_err(corrupt)
    }

    fn set_delegation(&self, ctx: &mut Context<'_>, delegation: &Delegation) -> Result<(), StakingError> {
        write_record(
            ctx.store_mut(),
            delegation_key(&delegation.delegator, &delegation.validator),
            delegation,
        )
        .map_err(corrupt)
    }

    fn remove_delegation(&self, ctx: &mut Context<'_>, delegation: &Delegation) -> Result<(), StakingError> {
        ctx.store_mut()
            .delete(&delegation_key(&delegation.delegator, &delegation.validator));
        Ok(())
    }

    fn remove_validator_tokens_and_shares(
        &self,
        ctx: &mut Context<'_>,
        operator: &ValidatorAddress,
        shares: Decimal,
    ) -> Result<Amount, StakingError> {
        let mut validator = self
            .validator(ctx, operator)?
            .ok_or_else(|| StakingError::ValidatorNotFound(operator.clone()))?;
        if shares > validator.delegator_shares {
            return Err(StakingError::InsufficientShares {
                validator: operator.clone(),
                available: validator.delegator_shares,
                requested: shares,
            });
        }
        let tokens = if shares == validator.delegator_shares {
            validator.tokens
        } else {
            validator.token_amount_from_shares(shares)?
        };
        validator.tokens -= tokens;
        validator.delegator_shares -= shares;
        self.set_validator(ctx, &validator)?;
        Ok(tokens)
    }

    fn unbonding_delegations(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
    ) -> Result<Vec<UnbondingDelegation>, StakingError> {
        scan_records(ctx.store(), &ubds_prefix(delegator)).map_err(corrupt)
    }

    fn unbonding_delegation(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
        validator: &ValidatorAddress,
    ) -> Result<Option<UnbondingDelegation>, StakingError> {
        read_record(ctx.store(), &ubd_key(delegator, validator)).map_err(corrupt)
    }

    fn set_unbonding_delegation(&self, ctx: &mut Context<'_>, ubd: &UnbondingDelegation) -> Result<(), StakingError> {
        write_record(ctx.store_mut(), ubd_key(&ubd.delegator, &ubd.validator), ubd).map_err(corrupt)
    }

    fn remove_unbonding_delegation(
        &self,
        ctx: &mut Context<'_>,
        ubd: &UnbondingDelegation,
    ) -> Result<(), StakingError> {
        ctx.store_mut().delete(&ubd_key(&ubd.delegator, &ubd.validator));
        Ok(())
    }

    fn ubd_queue_time_slice(&self, ctx: &Context<'_>, time: Timestamp) -> Result<Vec<DvPair>, StakingError> {
        Ok(read_record(ctx.store(), &ubd_queue_key(time))
            .map_err(corrupt)?
            .unwrap_or_default())
    }

    fn set_ubd_queue_time_slice(
        &self,
        ctx: &mut Context<'_>,
        time: Timestamp,
        pairs: &[DvPair],
    ) -> Result<(), StakingError> {
        if pairs.is_empty() {
            ctx.store_mut().delete(&ubd_queue_key(time));
            return Ok(());
        }
        write_record(ctx.store_mut(), ubd_queue_key(time), &pairs).map_err(corrupt)
    }

    fn insert_ubd_queue(
        &self,
        ctx: &mut Context<'_>,
        ubd: &UnbondingDelegation,
        completion_time: Timestamp,
    ) -> Result<(), StakingError> {
        let mut slice = self.ubd_queue_time_slice(ctx, completion_time)?;
        slice.push(ubd.pair());
        self.set_ubd_queue_time_slice(ctx, completion_time, &slice)
    }

    fn before_delegation_shares_modified(
        &self,
        _ctx: &mut Context<'_>,
        _delegator: &Address,
        _validator: &ValidatorAddress,
    ) -> Result<(), StakingError> {
        Ok(())
    }

    fn after_delegation_modified(
        &self,
        _ctx: &mut Context<'_>,
        _delegator: &Address,
        _validator: &ValidatorAddress,
    ) -> Result<(), StakingError> {
        Ok(())
    }
}

// ── MemBank ──────────────────────────────────────────────────────────

/// Balances keyed by address, plus a total supply that only minting
/// changes.
#[derive(Debug, Clone, Default)]
pub struct MemBank;

impl MemBank {
    pub fn new() -> Self {
        Self
    }

    /// Create `amount` out of nothing and credit it to `to`.
    pub fn mint(&self, ctx: &mut Context<'_>, to: &Address, amount: &Coins) -> Result<(), BankError> {
        let supply = self.supply(ctx)?;
        let supply = supply
            .checked_add(amount)
            .map_err(|_| BankError::Overflow(to.clone()))?;
        write_record(ctx.store_mut(), SUPPLY_KEY.to_vec(), &supply).map_err(bank_corrupt)?;
        self.credit(ctx, to, amount)
    }

    pub fn supply(&self, ctx: &Context<'_>) -> Result<Coins, BankError> {
        Ok(read_record(ctx.store(), SUPPLY_KEY)
            .map_err(bank_corrupt)?
            .unwrap_or_default())
    }

    fn credit(&self, ctx: &mut Context<'_>, to: &Address, amount: &Coins) -> Result<(), BankError> {
        let balance = self
            .balance(ctx, to)?
            .checked_add(amount)
            .map_err(|_| BankError::Overflow(to.clone()))?;
        write_record(ctx.store_mut(), balance_key(to), &balance).map_err(bank_corrupt)
    }

    fn transfer(&self, ctx: &mut Context<'_>, from: &Address, to: &Address, amount: &Coins) -> Result<(), BankError> {
        let available = self.balance(ctx, from)?;
        let left = available
            .checked_sub(amount)
            .ok_or_else(|| BankError::InsufficientFunds {
                address: from.clone(),
                needed: amount.clone(),
                available: available.clone(),
            })?;
        write_record(ctx.store_mut(), balance_key(from), &left).map_err(bank_corrupt)?;
        self.credit(ctx, to, amount)
    }
}

impl BankKeeper for MemBank {
    fn module_address(&self, module: &str) -> Result<Address, BankError> {
        match module {
            SHIELD_MODULE_NAME | BONDED_POOL_NAME | NOT_BONDED_POOL_NAME => {
                Address::new(format!("module:{module}")).map_err(|_| BankError::UnknownModule(module.to_string()))
            }
            other => Err(BankError::UnknownModule(other.to_string())),
        }
    }

    fn balance(&self, ctx: &Context<'_>, address: &Address) -> Result<Coins, BankError> {
        Ok(read_record(ctx.store(), &balance_key(address))
            .map_err(bank_corrupt)?
            .unwrap_or_default())
    }

    fn send_coins_from_module_to_module(
        &self,
        ctx: &mut Context<'_>,
        sender_module: &str,
        recipient_module: &str,
        amount: &Coins,
    ) -> Result<(), BankError> {
        let from = self.module_address(sender_module)?;
        let to = self.module_address(recipient_module)?;
        self.transfer(ctx, &from, &to, amount)
    }

    fn send_coins_from_module_to_account(
        &self,
        ctx: &mut Context<'_>,
        sender_module: &str,
        recipient: &Address,
        amount: &Coins,
    ) -> Result<(), BankError> {
        let from = self.module_address(sender_module)?;
        self.transfer(ctx, &from, recipient, amount)
    }

    fn send_coins_from_account_to_module(
        &self,
        ctx: &mut Context<'_>,
        sender: &Address,
        recipient_module: &str,
        amount: &Coins,
    ) -> Result<(), BankError> {
        let to = self.module_address(recipient_module)?;
        self.transfer(ctx, sender, &to, amount)
    }
}

// ── TestEnv ──────────────────────────────────────────────────────────

#[cfg(any(test, feature = "test-utils"))]
pub use fixture::TestEnv;

#[cfg(any(test, feature = "test-utils"))]
mod fixture {
    use super::*;
    use crate::context::BlockHeader;
    use crate::error::TxResult;
    use crate::genesis::GenesisState;
    use crate::keeper::Keeper;
    use crate::params::StakingRateMigration;
    use crate::pool::CreatePoolRequest;
    use crate::store::MemStore;
    use shield_core::{MixedCoins, PoolId};

    const DAY: i64 = 86_400;

    /// Store, collaborators, keeper and block header for one test. The
    /// admin is registered at genesis and bonds [`TestEnv::ADMIN_STAKE`].
    ///
    /// Setup helpers panic on failure; operations under test go through
    /// [`TestEnv::run`] and return their result.
    pub struct TestEnv {
        pub store: MemStore,
        pub header: BlockHeader,
        pub keeper: Keeper<MemStaking, MemBank>,
        pub admin: Address,
        pools_requested: u64,
    }

    impl Default for TestEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestEnv {
        pub const ADMIN_STAKE: Amount = 1_000_000;
        pub const ADMIN_VALIDATOR: &'static str = "cosmosvaloper1admin";

        pub fn new() -> Self {
            let admin = Address::new("cosmos1admin").expect("admin address");
            let time = Timestamp::parse("2026-01-01T00:00:00Z").expect("genesis time");
            let mut env = Self {
                store: MemStore::new(),
                header: BlockHeader::new(1, time),
                keeper: Keeper::new(MemStaking::default(), MemBank::new()),
                admin: admin.clone(),
                pools_requested: 0,
            };
            let genesis = GenesisState {
                admin: Some(admin.clone()),
                ..GenesisState::default()
            };
            env.run(|k, ctx| k.init_genesis(ctx, &genesis)).expect("init genesis");
            env.delegate(&admin, Self::ADMIN_VALIDATOR, Self::ADMIN_STAKE);
            env
        }

        /// Run `f` against the store at the current header. Not atomic by
        /// itself; keeper operations are.
        pub fn run<T>(
            &mut self,
            f: impl FnOnce(&Keeper<MemStaking, MemBank>, &mut Context<'_>) -> TxResult<T>,
        ) -> TxResult<T> {
            let mut ctx = Context::new(&mut self.store, self.header);
            f(&self.keeper, &mut ctx)
        }

        pub fn set_staking_rate_migration(&mut self, migration: StakingRateMigration) {
            self.keeper = Keeper::new(self.keeper.staking().clone(), self.keeper.bank().clone())
                .with_staking_rate_migration(Some(migration));
        }

        pub fn addr(&self, s: &str) -> Address {
            Address::new(s).expect("test address")
        }

        pub fn denom(&self) -> String {
            self.keeper.bond_denom().to_string()
        }

        pub fn coins(&self, amount: Amount) -> Coins {
            Coins::from_coin(self.keeper.bond_denom(), amount).expect("bond denom")
        }

        pub fn advance(&mut self, secs: i64, blocks: u64) {
            self.header.time = self.header.time.checked_add_secs(secs).expect("time in range");
            self.header.height += blocks;
        }

        pub fn delegate(&mut self, delegator: &Address, validator: &str, amount: Amount) {
            let validator = ValidatorAddress::new(validator).expect("validator address");
            let coins = self.coins(amount);
            let mut ctx = Context::new(&mut self.store, self.header);
            let bank = self.keeper.bank();
            bank.mint(&mut ctx, delegator, &coins).expect("mint");
            self.keeper
                .staking()
                .delegate(&mut ctx, bank, delegator, &validator, amount)
                .expect("delegate");
        }

        pub fn undelegate(&mut self, delegator: &Address, validator: &str, amount: Amount) {
            let validator = ValidatorAddress::new(validator).expect("validator address");
            let mut ctx = Context::new(&mut self.store, self.header);
            self.keeper
                .staking()
                .undelegate(&mut ctx, self.keeper.bank(), delegator, &validator, amount)
                .expect("undelegate");
        }

        pub fn complete_unbonding(&mut self) -> Amount {
            let mut ctx = Context::new(&mut self.store, self.header);
            self.keeper
                .staking()
                .complete_unbonding(&mut ctx, self.keeper.bank())
                .expect("complete unbonding")
        }

        pub fn fund(&mut self, to: &Address, amount: Amount) {
            let coins = self.coins(amount);
            let mut ctx = Context::new(&mut self.store, self.header);
            self.keeper.bank().mint(&mut ctx, to, &coins).expect("mint");
        }

        pub fn fund_module(&mut self, amount: Amount) {
            let module = self.module_address();
            self.fund(&module, amount);
        }

        pub fn balance(&mut self, address: &Address) -> Amount {
            let denom = self.denom();
            let ctx = Context::new(&mut self.store, self.header);
            self.keeper
                .bank()
                .balance(&ctx, address)
                .expect("balance")
                .amount_of(&denom)
        }

        pub fn module_balance(&mut self) -> Amount {
            let module = self.module_address();
            self.balance(&module)
        }

        fn module_address(&self) -> Address {
            self.keeper
                .bank()
                .module_address(SHIELD_MODULE_NAME)
                .expect("shield module")
        }

        /// Admin pool request with no deposit and a fresh sponsor name.
        pub fn pool_request(&mut self, shield: Amount, time_secs: i64, blocks: u64) -> CreatePoolRequest {
            self.pools_requested += 1;
            CreatePoolRequest {
                creator: self.admin.clone(),
                shield,
                deposit: MixedCoins::default(),
                sponsor: format!("sponsor-{}", self.pools_requested),
                sponsor_addr: self.addr("cosmos1sponsor"),
                description: String::new(),
                time_of_coverage_secs: time_secs,
                blocks_of_coverage: blocks,
            }
        }

        pub fn create_pool_with(&mut self, shield: Amount, time_secs: i64, blocks: u64) -> PoolId {
            let req = self.pool_request(shield, time_secs, blocks);
            self.run(|k, ctx| k.create_pool(ctx, req))
                .expect("create pool")
                .id
        }

        /// Pool covering 60 days.
        pub fn create_default_pool(&mut self, shield: Amount) -> PoolId {
            self.create_pool_with(shield, 60 * DAY, 0)
        }
    }
}

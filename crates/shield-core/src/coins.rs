//! # Coin Arithmetic
//!
//! Multi-denomination coin sets used throughout the ledger.
//!
//! - [`Coins`]: integer amounts per denomination. Collateral, shield and
//!   transfers are all integer.
//! - [`DecCoins`]: decimal amounts per denomination, for premiums, service
//!   fees and provider rewards, which accrue fractionally.
//! - [`MixedCoins`] / [`MixedDecCoins`]: a native part (paid on-chain) and a
//!   foreign part (premiums paid in another chain's assets, tracked only).
//!
//! ## Invariants
//!
//! Every set is a sorted map with no zero and no negative entries. All
//! arithmetic is checked: integer overflow and decimal overflow surface as
//! [`CoreError::Overflow`], subtraction that would go negative returns
//! `None`.

use std::collections::BTreeMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Integer token amount in the smallest unit of a denomination.
pub type Amount = u64;

/// Validate a denomination: a lowercase letter followed by 2..=127 of
/// `[a-z0-9/:._-]`.
pub fn validate_denom(denom: &str) -> Result<(), CoreError> {
    let mut chars = denom.chars();
    let valid_first = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let valid_rest = chars.all(|c| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '/' | ':' | '.' | '_' | '-')
    });
    if valid_first && valid_rest && (3..=128).contains(&denom.len()) {
        Ok(())
    } else {
        Err(CoreError::InvalidDenom(denom.to_string()))
    }
}

// ── Coins ────────────────────────────────────────────────────────────

/// A set of integer coin amounts keyed by denomination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, Amount>", into = "BTreeMap<String, Amount>")]
pub struct Coins(BTreeMap<String, Amount>);

impl Coins {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single-denomination set. A zero amount yields the empty set.
    pub fn from_coin(denom: &str, amount: Amount) -> Result<Self, CoreError> {
        validate_denom(denom)?;
        let mut map = BTreeMap::new();
        if amount > 0 {
            map.insert(denom.to_string(), amount);
        }
        Ok(Self(map))
    }

    pub fn amount_of(&self, denom: &str) -> Amount {
        self.0.get(denom).copied().unwrap_or(0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Amount)> {
        self.0.iter().map(|(d, a)| (d.as_str(), *a))
    }

    pub fn checked_add(&self, other: &Coins) -> Result<Coins, CoreError> {
        let mut out = self.0.clone();
        for (denom, amount) in &other.0 {
            let slot = out.entry(denom.clone()).or_insert(0);
            *slot = slot
                .checked_add(*amount)
                .ok_or(CoreError::Overflow { operation: "Coins::checked_add" })?;
        }
        Ok(Coins(out))
    }

    /// `self - other`, or `None` if any denomination would go negative.
    pub fn checked_sub(&self, other: &Coins) -> Option<Coins> {
        let mut out = self.0.clone();
        for (denom, amount) in &other.0 {
            let have = out.get(denom).copied().unwrap_or(0);
            let left = have.checked_sub(*amount)?;
            if left == 0 {
                out.remove(denom);
            } else {
                out.insert(denom.clone(), left);
            }
        }
        Some(Coins(out))
    }

    /// True if every denomination in `other` is covered by `self`.
    pub fn is_all_gte(&self, other: &Coins) -> bool {
        other.0.iter().all(|(d, a)| self.amount_of(d) >= *a)
    }
}

impl TryFrom<BTreeMap<String, Amount>> for Coins {
    type Error = CoreError;
    fn try_from(map: BTreeMap<String, Amount>) -> Result<Self, Self::Error> {
        for denom in map.keys() {
            validate_denom(denom)?;
        }
        Ok(Coins(map.into_iter().filter(|(_, a)| *a > 0).collect()))
    }
}

impl From<Coins> for BTreeMap<String, Amount> {
    fn from(c: Coins) -> Self {
        c.0
    }
}

impl std::fmt::Display for Coins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return f.write_str("0");
        }
        let parts: Vec<String> = self.0.iter().map(|(d, a)| format!("{a}{d}")).collect();
        f.write_str(&parts.join(","))
    }
}

// ── DecCoins ─────────────────────────────────────────────────────────

/// A set of decimal coin amounts keyed by denomination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, Decimal>", into = "BTreeMap<String, Decimal>")]
pub struct DecCoins(BTreeMap<String, Decimal>);

impl DecCoins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dec_coin(denom: &str, amount: Decimal) -> Result<Self, CoreError> {
        Self::try_from(BTreeMap::from([(denom.to_string(), amount)]))
    }

    pub fn amount_of(&self, denom: &str) -> Decimal {
        self.0.get(denom).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.0.iter().map(|(d, a)| (d.as_str(), *a))
    }

    pub fn checked_add(&self, other: &DecCoins) -> Result<DecCoins, CoreError> {
        let mut out = self.0.clone();
        for (denom, amount) in &other.0 {
            let slot = out.entry(denom.clone()).or_insert(Decimal::ZERO);
            *slot = slot
                .checked_add(*amount)
                .ok_or(CoreError::Overflow { operation: "DecCoins::checked_add" })?
                .normalize();
        }
        Ok(DecCoins(out))
    }

    /// `self - other`, clamping each denomination at zero.
    pub fn saturating_sub(&self, other: &DecCoins) -> DecCoins {
        let mut out = BTreeMap::new();
        for (denom, amount) in &self.0 {
            let left = *amount - other.amount_of(denom);
            if left > Decimal::ZERO {
                out.insert(denom.clone(), left.normalize());
            }
        }
        DecCoins(out)
    }

    /// Multiply every amount by `factor`. Non-positive results are dropped.
    pub fn mul_dec(&self, factor: Decimal) -> Result<DecCoins, CoreError> {
        let mut out = BTreeMap::new();
        for (denom, amount) in &self.0 {
            let v = amount
                .checked_mul(factor)
                .ok_or(CoreError::Overflow { operation: "DecCoins::mul_dec" })?;
            if v > Decimal::ZERO {
                out.insert(denom.clone(), v.normalize());
            }
        }
        Ok(DecCoins(out))
    }

    /// Multiply every amount by `numerator / denominator`.
    pub fn mul_ratio(&self, numerator: Amount, denominator: Amount) -> Result<DecCoins, CoreError> {
        if denominator == 0 {
            return Err(CoreError::Overflow { operation: "DecCoins::mul_ratio" });
        }
        let num = Decimal::from(numerator);
        let den = Decimal::from(denominator);
        let mut out = BTreeMap::new();
        for (denom, amount) in &self.0 {
            let v = amount
                .checked_mul(num)
                .and_then(|v| v.checked_div(den))
                .or_else(|| amount.checked_div(den).and_then(|v| v.checked_mul(num)))
                .ok_or(CoreError::Overflow { operation: "DecCoins::mul_ratio" })?;
            if v > Decimal::ZERO {
                out.insert(denom.clone(), v.normalize());
            }
        }
        Ok(DecCoins(out))
    }

    /// Split into integer coins and the fractional change left behind.
    pub fn truncate(&self) -> (Coins, DecCoins) {
        let mut whole = BTreeMap::new();
        let mut change = BTreeMap::new();
        for (denom, amount) in &self.0 {
            let int = amount.trunc();
            match int.to_u64() {
                Some(n) if n > 0 => {
                    whole.insert(denom.clone(), n);
                    let frac = *amount - int;
                    if frac > Decimal::ZERO {
                        change.insert(denom.clone(), frac.normalize());
                    }
                }
                Some(_) => {
                    change.insert(denom.clone(), *amount);
                }
                // Beyond u64: pay u64::MAX now, keep the rest as change.
                None => {
                    whole.insert(denom.clone(), u64::MAX);
                    change.insert(denom.clone(), *amount - Decimal::from(u64::MAX));
                }
            }
        }
        (Coins(whole), DecCoins(change))
    }
}

impl From<&Coins> for DecCoins {
    fn from(coins: &Coins) -> Self {
        DecCoins(coins.0.iter().map(|(d, a)| (d.clone(), Decimal::from(*a))).collect())
    }
}

impl TryFrom<BTreeMap<String, Decimal>> for DecCoins {
    type Error = CoreError;
    fn try_from(map: BTreeMap<String, Decimal>) -> Result<Self, Self::Error> {
        let mut out = BTreeMap::new();
        for (denom, amount) in map {
            validate_denom(&denom)?;
            if amount.is_sign_negative() && !amount.is_zero() {
                return Err(CoreError::Overflow { operation: "DecCoins::try_from (negative amount)" });
            }
            if amount > Decimal::ZERO {
                out.insert(denom, amount.normalize());
            }
        }
        Ok(DecCoins(out))
    }
}

impl From<DecCoins> for BTreeMap<String, Decimal> {
    fn from(c: DecCoins) -> Self {
        c.0
    }
}

// ── Mixed native/foreign ─────────────────────────────────────────────

/// Coins split into an on-chain native part and an off-chain foreign part.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixedCoins {
    #[serde(default)]
    pub native: Coins,
    #[serde(default)]
    pub foreign: Coins,
}

impl MixedCoins {
    pub fn native(native: Coins) -> Self {
        Self {
            native,
            foreign: Coins::new(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.native.is_zero() && self.foreign.is_zero()
    }
}

/// Decimal counterpart of [`MixedCoins`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixedDecCoins {
    #[serde(default)]
    pub native: DecCoins,
    #[serde(default)]
    pub foreign: DecCoins,
}

impl MixedDecCoins {
    pub fn native(native: DecCoins) -> Self {
        Self {
            native,
            foreign: DecCoins::new(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.native.is_zero() && self.foreign.is_zero()
    }

    pub fn checked_add(&self, other: &MixedDecCoins) -> Result<MixedDecCoins, CoreError> {
        Ok(MixedDecCoins {
            native: self.native.checked_add(&other.native)?,
            foreign: self.foreign.checked_add(&other.foreign)?,
        })
    }
}

impl From<&MixedCoins> for MixedDecCoins {
    fn from(c: &MixedCoins) -> Self {
        MixedDecCoins {
            native: DecCoins::from(&c.native),
            foreign: DecCoins::from(&c.foreign),
        }
    }
}

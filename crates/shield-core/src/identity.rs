//! # Ledger Identifiers
//!
//! Newtypes for every identifier the shield ledger keys records by. An
//! account `Address` cannot be passed where a `ValidatorAddress` is
//! expected, and a `PoolId` cannot be confused with a `ProposalId`.
//!
//! ## Ordering
//!
//! `Address` and `ValidatorAddress` order lexicographically by their string
//! form. The ledger relies on this order wherever it walks providers or
//! validators, so every node processes them identically.

use serde::{Deserialize, Serialize};

use crate::canonical::CanonicalBytes;
use crate::digest::sha256_digest;
use crate::error::CoreError;

fn validate_address(value: &str) -> Result<(), CoreError> {
    let reason = if value.is_empty() {
        "must not be empty"
    } else if value.len() > 255 {
        "must be at most 255 bytes"
    } else if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        "must not contain whitespace or control characters"
    } else {
        return Ok(());
    };
    Err(CoreError::InvalidAddress {
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

/// An account address (delegator, provider, purchaser, beneficiary, module).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Result<Self, CoreError> {
        let value = value.into();
        validate_address(&value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl TryFrom<String> for Address {
    type Error = CoreError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validator operator address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ValidatorAddress(String);

impl ValidatorAddress {
    pub fn new(value: impl Into<String>) -> Result<Self, CoreError> {
        let value = value.into();
        validate_address(&value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl TryFrom<String> for ValidatorAddress {
    type Error = CoreError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ValidatorAddress> for String {
    fn from(v: ValidatorAddress) -> Self {
        v.0
    }
}

impl std::fmt::Display for ValidatorAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sequential pool identifier, assigned from the ledger's next-id counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(pub u64);

impl PoolId {
    pub fn next(self) -> Option<PoolId> {
        self.0.checked_add(1).map(PoolId)
    }

    /// Big-endian bytes; store keys sort in id order.
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl std::fmt::Display for PoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pool:{}", self.0)
    }
}

/// Identifier of the governance proposal that carries a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalId(pub u64);

impl ProposalId {
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "proposal:{}", self.0)
    }
}

/// SHA-256 hash of the transaction that made a purchase.
///
/// Serialized as 64 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxHash([u8; 32]);

impl TxHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash a canonical request document.
    pub fn of(data: &CanonicalBytes) -> Self {
        Self(sha256_digest(data).bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidTxHash(s.to_string()));
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| CoreError::InvalidTxHash(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for TxHash {
    type Error = CoreError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<TxHash> for String {
    fn from(h: TxHash) -> Self {
        h.to_hex()
    }
}

impl std::fmt::Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_rejects_empty_and_whitespace() {
        assert!(Address::new("").is_err());
        assert!(Address::new("cosmos1 abc").is_err());
        assert!(Address::new("cosmos1\nabc").is_err());
        assert!(Address::new("x".repeat(256)).is_err());
        assert!(Address::new("cosmos1abc").is_ok());
    }

    #[test]
    fn address_orders_lexicographically() {
        let a = Address::new("cosmos1aaa").unwrap();
        let b = Address::new("cosmos1aab").unwrap();
        let short = Address::new("cosmos1a").unwrap();
        assert!(a < b);
        assert!(short < a);
    }

    #[test]
    fn address_serde_validates() {
        let a: Address = serde_json::from_str(r#""cosmos1xyz""#).unwrap();
        assert_eq!(a.as_str(), "cosmos1xyz");
        assert!(serde_json::from_str::<Address>(r#""""#).is_err());
        assert_eq!(serde_json::to_string(&a).unwrap(), r#""cosmos1xyz""#);
    }

    #[test]
    fn validator_address_display() {
        let v = ValidatorAddress::new("cosmosvaloper1abc").unwrap();
        assert_eq!(v.to_string(), "cosmosvaloper1abc");
    }

    #[test]
    fn pool_id_next_and_display() {
        assert_eq!(PoolId(1).next(), Some(PoolId(2)));
        assert_eq!(PoolId(u64::MAX).next(), None);
        assert_eq!(PoolId(3).to_string(), "pool:3");
        assert_eq!(serde_json::to_string(&PoolId(3)).unwrap(), "3");
    }

    #[test]
    fn pool_id_bytes_sort_numerically() {
        assert!(PoolId(2).to_be_bytes() < PoolId(10).to_be_bytes());
    }

    #[test]
    fn tx_hash_hex_roundtrip() {
        let cb = CanonicalBytes::new(&serde_json::json!({"pool_id": 1})).unwrap();
        let h = TxHash::of(&cb);
        let hex = h.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(TxHash::from_hex(&hex).unwrap(), h);
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(serde_json::from_str::<TxHash>(&json).unwrap(), h);
    }

    #[test]
    fn tx_hash_rejects_bad_hex() {
        assert!(TxHash::from_hex("abc").is_err());
        assert!(TxHash::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn tx_hash_differs_per_document() {
        let a = TxHash::of(&CanonicalBytes::new(&serde_json::json!({"n": 1})).unwrap());
        let b = TxHash::of(&CanonicalBytes::new(&serde_json::json!({"n": 2})).unwrap());
        assert_ne!(a, b);
    }
}

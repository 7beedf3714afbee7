//! # Canonical Record Encoding
//!
//! Every record the ledger persists, and every document hashed into a
//! [`TxHash`](crate::TxHash), is encoded through [`CanonicalBytes`]. Two nodes
//! that hold the same logical state therefore hold byte-identical stores.
//!
//! ## Rules
//!
//! 1. Object keys are sorted and separators are compact (RFC 8785 via
//!    `serde_jcs`).
//! 2. Non-integer JSON numbers are rejected. Decimal quantities travel as
//!    strings (`rust_decimal` serializes that way), integer amounts as
//!    integers.
//! 3. Timestamps are already normalized by [`Timestamp`](crate::Timestamp)
//!    to whole seconds with a `Z` suffix.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced by canonical JSON serialization.
///
/// The inner buffer is private; the only constructor is
/// [`CanonicalBytes::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize any serializable value.
    ///
    /// # Errors
    ///
    /// `FloatRejected` if the value contains a non-integer number,
    /// `SerializationFailed` if serde fails.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        reject_floats(&value)?;
        let s = serde_jcs::to_string(&value)?;
        Ok(Self(s.into_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume into the owned buffer, for handing to a store.
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Decode a record previously written with [`CanonicalBytes::new`].
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CanonicalizationError> {
    Ok(serde_json::from_slice(bytes)?)
}

fn reject_floats(value: &Value) -> Result<(), CanonicalizationError> {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) => Err(CanonicalizationError::FloatRejected(f)),
            None => Ok(()),
        },
        Value::Array(items) => items.iter().try_for_each(reject_floats),
        Value::Object(map) => map.values().try_for_each(reject_floats),
        _ => Ok(()),
    }
}

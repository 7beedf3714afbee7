//! # Error Types
//!
//! Errors raised by the foundational types. Ledger-level failures live in
//! `shield-ledger`; everything here is about malformed input: a bad address,
//! an unparseable timestamp, an amount that does not fit, or a record that
//! cannot be canonicalized.

use thiserror::Error;

/// Top-level error type for `shield-core`.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Canonical encoding failed.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// An account or validator address failed validation.
    #[error("invalid address {value:?}: {reason}")]
    InvalidAddress {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A coin denomination failed validation.
    #[error("invalid denomination {0:?}")]
    InvalidDenom(String),

    /// A timestamp could not be parsed or is out of range.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// A transaction hash was not 64 hex characters.
    #[error("invalid tx hash {0:?}")]
    InvalidTxHash(String),

    /// Coin arithmetic overflowed or underflowed.
    #[error("coin arithmetic overflow in {operation}")]
    Overflow {
        /// The operation that overflowed.
        operation: &'static str,
    },
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Non-integer numbers are not permitted in canonical records.
    #[error("float values are not permitted in canonical records; encode decimals as strings: {0}")]
    FloatRejected(f64),

    /// JSON serialization or deserialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_address_includes_value_and_reason() {
        let err = CoreError::InvalidAddress {
            value: "bad addr".into(),
            reason: "contains whitespace".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("bad addr"));
        assert!(msg.contains("contains whitespace"));
    }

    #[test]
    fn overflow_names_operation() {
        let err = CoreError::Overflow { operation: "Coins::add" };
        assert!(format!("{err}").contains("Coins::add"));
    }

    #[test]
    fn canonicalization_error_converts() {
        let inner = CanonicalizationError::FloatRejected(1.5);
        let err: CoreError = inner.into();
        assert!(matches!(err, CoreError::Canonicalization(_)));
        assert!(format!("{err}").contains("1.5"));
    }
}

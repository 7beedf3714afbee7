//! # Store Key Layout
//!
//! Single-byte prefixes followed by big-endian ids, so prefix scans return
//! records in id order.
//!
//! | Prefix | Key suffix | Value |
//! |--------|------------|-------|
//! | `0x01` | pool id | `Pool` |
//! | `0x02` | none | next pool id |
//! | `0x03` | pool id, provider address | `Collateral` |
//! | `0x04` | provider address | `Provider` |
//! | `0x05` | tx hash | `Purchase` |
//! | `0x06` | pool id, tx hash | empty (purchase-by-pool index) |
//! | `0x07` | completion time | `Vec<Withdrawal>` (time slice) |
//! | `0x08` | proposal id | `Reimbursement` |
//! | `0x09` | proposal id | `Claim` |
//! | `0x0A`..`0x0F` | none | singletons |
//!
//! Provider addresses are the tail of their keys, so a pool's collateral
//! scans in ascending address byte order, which for UTF-8 is lexicographic
//! string order.

use shield_core::{Address, PoolId, ProposalId, Timestamp, TxHash};

pub const POOL_PREFIX: u8 = 0x01;
pub const NEXT_POOL_ID_KEY: &[u8] = &[0x02];
pub const COLLATERAL_PREFIX: u8 = 0x03;
pub const PROVIDER_PREFIX: u8 = 0x04;
pub const PURCHASE_PREFIX: u8 = 0x05;
pub const POOL_PURCHASE_PREFIX: u8 = 0x06;
pub const WITHDRAW_QUEUE_PREFIX: u8 = 0x07;
pub const REIMBURSEMENT_PREFIX: u8 = 0x08;
pub const CLAIM_PREFIX: u8 = 0x09;
pub const ADMIN_KEY: &[u8] = &[0x0A];
pub const POOL_PARAMS_KEY: &[u8] = &[0x0B];
pub const CLAIM_PARAMS_KEY: &[u8] = &[0x0C];
pub const SERVICE_FEES_KEY: &[u8] = &[0x0D];
pub const REMAINING_SERVICE_FEES_KEY: &[u8] = &[0x0E];
pub const STAKING_RATE_KEY: &[u8] = &[0x0F];

fn join(prefix: u8, parts: &[&[u8]]) -> Vec<u8> {
    let len = 1 + parts.iter().map(|p| p.len()).sum::<usize>();
    let mut key = Vec::with_capacity(len);
    key.push(prefix);
    for p in parts {
        key.extend_from_slice(p);
    }
    key
}

/// Epoch seconds as bytes that sort like the signed value.
pub fn sortable_time(time: Timestamp) -> [u8; 8] {
    ((time.epoch_secs() as u64) ^ (1u64 << 63)).to_be_bytes()
}

pub fn pool_key(id: PoolId) -> Vec<u8> {
    join(POOL_PREFIX, &[&id.to_be_bytes()])
}

pub fn collateral_key(pool_id: PoolId, provider: &Address) -> Vec<u8> {
    join(COLLATERAL_PREFIX, &[&pool_id.to_be_bytes(), provider.as_bytes()])
}

pub fn pool_collateral_prefix(pool_id: PoolId) -> Vec<u8> {
    join(COLLATERAL_PREFIX, &[&pool_id.to_be_bytes()])
}

pub fn provider_key(address: &Address) -> Vec<u8> {
    join(PROVIDER_PREFIX, &[address.as_bytes()])
}

pub fn purchase_key(tx_hash: &TxHash) -> Vec<u8> {
    join(PURCHASE_PREFIX, &[tx_hash.as_bytes()])
}

pub fn pool_purchase_key(pool_id: PoolId, tx_hash: &TxHash) -> Vec<u8> {
    join(POOL_PURCHASE_PREFIX, &[&pool_id.to_be_bytes(), tx_hash.as_bytes()])
}

pub fn pool_purchase_prefix(pool_id: PoolId) -> Vec<u8> {
    join(POOL_PURCHASE_PREFIX, &[&pool_id.to_be_bytes()])
}

pub fn withdraw_queue_key(completion_time: Timestamp) -> Vec<u8> {
    join(WITHDRAW_QUEUE_PREFIX, &[&sortable_time(completion_time)])
}

pub fn reimbursement_key(proposal_id: ProposalId) -> Vec<u8> {
    join(REIMBURSEMENT_PREFIX, &[&proposal_id.to_be_bytes()])
}

pub fn claim_key(proposal_id: ProposalId) -> Vec<u8> {
    join(CLAIM_PREFIX, &[&proposal_id.to_be_bytes()])
}

/// Tx hash encoded in a purchase-by-pool index key.
pub fn tx_hash_from_pool_purchase_key(key: &[u8]) -> Option<TxHash> {
    let tail = key.get(9..)?;
    let bytes: [u8; 32] = tail.try_into().ok()?;
    Some(TxHash::from_bytes(bytes))
}

/// Render a key for error messages.
pub fn hex_key(key: &[u8]) -> String {
    key.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    #[test]
    fn sortable_time_orders_across_epoch() {
        let before = ts("1969-12-31T23:59:59Z");
        let epoch = ts("1970-01-01T00:00:00Z");
        let after = ts("2026-01-01T00:00:00Z");
        assert!(sortable_time(before) < sortable_time(epoch));
        assert!(sortable_time(epoch) < sortable_time(after));
    }

    #[test]
    fn collateral_keys_group_by_pool_then_address() {
        let a = Address::new("cosmos1a").unwrap();
        let b = Address::new("cosmos1b").unwrap();
        let k1 = collateral_key(PoolId(1), &b);
        let k2 = collateral_key(PoolId(2), &a);
        assert!(k1 < k2);
        assert!(k1.starts_with(&pool_collateral_prefix(PoolId(1))));
        assert!(collateral_key(PoolId(1), &a) < k1);
    }

    #[test]
    fn pool_purchase_key_roundtrip() {
        let h = TxHash::from_bytes([9u8; 32]);
        let key = pool_purchase_key(PoolId(4), &h);
        assert_eq!(tx_hash_from_pool_purchase_key(&key), Some(h));
        assert!(key.starts_with(&pool_purchase_prefix(PoolId(4))));
        assert_eq!(tx_hash_from_pool_purchase_key(&[POOL_PURCHASE_PREFIX]), None);
    }

    #[test]
    fn singletons_are_distinct() {
        let keys = [
            NEXT_POOL_ID_KEY,
            ADMIN_KEY,
            POOL_PARAMS_KEY,
            CLAIM_PARAMS_KEY,
            SERVICE_FEES_KEY,
            REMAINING_SERVICE_FEES_KEY,
            STAKING_RATE_KEY,
        ];
        let set: std::collections::BTreeSet<_> = keys.iter().collect();
        assert_eq!(set.len(), keys.len());
    }

    #[test]
    fn hex_key_renders_bytes() {
        assert_eq!(hex_key(&[0x01, 0xab]), "01ab");
    }
}

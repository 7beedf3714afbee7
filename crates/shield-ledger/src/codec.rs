//! Record encoding between ledger types and store bytes.

use serde::de::DeserializeOwned;
use serde::Serialize;

use shield_core::{decode, CanonicalBytes};

use crate::error::InvariantViolation;
use crate::keys::hex_key;
use crate::store::KvStore;

pub fn read_record<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &[u8],
) -> Result<Option<T>, InvariantViolation> {
    match store.get(key) {
        None => Ok(None),
        Some(bytes) => decode(&bytes).map(Some).map_err(|e| InvariantViolation::Corrupt {
            key: hex_key(key),
            reason: e.to_string(),
        }),
    }
}

pub fn write_record<T: Serialize>(
    store: &mut dyn KvStore,
    key: Vec<u8>,
    value: &T,
) -> Result<(), InvariantViolation> {
    let bytes = CanonicalBytes::new(value).map_err(|e| InvariantViolation::Encode(e.to_string()))?;
    store.set(key, bytes.into_vec());
    Ok(())
}

/// Decode every record under `prefix`, in key order.
pub fn scan_records<T: DeserializeOwned>(
    store: &dyn KvStore,
    prefix: &[u8],
) -> Result<Vec<T>, InvariantViolation> {
    store
        .prefix_scan(prefix)
        .into_iter()
        .map(|(key, bytes)| {
            decode(&bytes).map_err(|e| InvariantViolation::Corrupt {
                key: hex_key(&key),
                reason: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;

    #[test]
    fn write_then_read() {
        let mut s = MemStore::new();
        write_record(&mut s, vec![1, 1], &vec![3u64, 4]).unwrap();
        let v: Option<Vec<u64>> = read_record(&s, &[1, 1]).unwrap();
        assert_eq!(v, Some(vec![3, 4]));
        assert_eq!(read_record::<Vec<u64>>(&s, &[9]).unwrap(), None);
    }

    #[test]
    fn corrupt_bytes_are_reported_with_key() {
        let mut s = MemStore::new();
        s.set(vec![0xAB], b"{oops".to_vec());
        let err = read_record::<u64>(&s, &[0xAB]).unwrap_err();
        match err {
            InvariantViolation::Corrupt { key, .. } => assert_eq!(key, "ab"),
            other => panic!("expected Corrupt, got {other:?}"),
        }
    }

    #[test]
    fn scan_decodes_in_order() {
        let mut s = MemStore::new();
        write_record(&mut s, vec![2, 2], &"b").unwrap();
        write_record(&mut s, vec![2, 1], &"a").unwrap();
        write_record(&mut s, vec![3, 0], &"z").unwrap();
        let v: Vec<String> = scan_records(&s, &[2]).unwrap();
        assert_eq!(v, vec!["a".to_string(), "b".to_string()]);
    }
}

//! # Key-Value Store
//!
//! The ledger persists every record in an ordered byte-keyed store. The
//! consensus engine owns the real store; this module defines the narrow
//! interface the ledger needs from it and two implementations:
//!
//! - [`MemStore`]: a `BTreeMap`, the root store for tests, the CLI and
//!   genesis replay.
//! - [`CacheStore`]: a write overlay on top of any other store. Reads fall
//!   through to the parent; writes stay in the overlay until
//!   [`CacheStore::write`] commits them. [`Context::atomic`] uses it to make
//!   each operation all-or-nothing.
//!
//! [`Context::atomic`]: crate::context::Context::atomic

use std::collections::BTreeMap;
use std::ops::Bound;

/// Ordered key-value store with point access and range iteration.
pub trait KvStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>);

    fn delete(&mut self, key: &[u8]);

    /// Entries with `start <= key < end` in ascending key order. `end =
    /// None` is unbounded.
    fn range(&self, start: &[u8], end: Option<&[u8]>) -> Vec<(Vec<u8>, Vec<u8>)>;

    /// Entries whose key starts with `prefix`, ascending.
    fn prefix_scan(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let end = prefix_end(prefix);
        self.range(prefix, end.as_deref())
    }

    fn has(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }
}

/// Smallest key greater than every key with `prefix`, or `None` when the
/// prefix is all `0xFF`.
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

fn bounds<'a>(start: &'a [u8], end: Option<&'a [u8]>) -> (Bound<&'a [u8]>, Bound<&'a [u8]>) {
    let upper = match end {
        Some(e) => Bound::Excluded(e),
        None => Bound::Unbounded,
    };
    (Bound::Included(start), upper)
}

// ── MemStore ─────────────────────────────────────────────────────────

/// In-memory root store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemStore {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.get(key).cloned()
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.map.insert(key, value);
    }

    fn delete(&mut self, key: &[u8]) {
        self.map.remove(key);
    }

    fn range(&self, start: &[u8], end: Option<&[u8]>) -> Vec<(Vec<u8>, Vec<u8>)> {
        if end.is_some_and(|e| e <= start) {
            return Vec::new();
        }
        self.map
            .range::<[u8], _>(bounds(start, end))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

// ── CacheStore ───────────────────────────────────────────────────────

/// Write overlay on a parent store. `None` in the overlay marks a delete.
pub struct CacheStore<'p, S: KvStore + ?Sized> {
    parent: &'p mut S,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'p, S: KvStore + ?Sized> CacheStore<'p, S> {
    pub fn new(parent: &'p mut S) -> Self {
        Self {
            parent,
            writes: BTreeMap::new(),
        }
    }

    /// Number of pending writes and deletes.
    pub fn pending(&self) -> usize {
        self.writes.len()
    }

    /// Flush the overlay into the parent.
    pub fn write(self) {
        for (key, value) in self.writes {
            match value {
                Some(v) => self.parent.set(key, v),
                None => self.parent.delete(&key),
            }
        }
    }
}

impl<S: KvStore + ?Sized> KvStore for CacheStore<'_, S> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.writes.get(key) {
            Some(v) => v.clone(),
            None => self.parent.get(key),
        }
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.writes.insert(key, Some(value));
    }

    fn delete(&mut self, key: &[u8]) {
        self.writes.insert(key.to_vec(), None);
    }

    fn range(&self, start: &[u8], end: Option<&[u8]>) -> Vec<(Vec<u8>, Vec<u8>)> {
        if end.is_some_and(|e| e <= start) {
            return Vec::new();
        }
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.parent.range(start, end).into_iter().collect();
        for (k, v) in self.writes.range::<[u8], _>(bounds(start, end)) {
            match v {
                Some(v) => {
                    merged.insert(k.clone(), v.clone());
                }
                None => {
                    merged.remove(k);
                }
            }
        }
        merged.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv(k: &[u8], v: &[u8]) -> (Vec<u8>, Vec<u8>) {
        (k.to_vec(), v.to_vec())
    }

    #[test]
    fn prefix_end_increments_last_byte() {
        assert_eq!(prefix_end(&[0x01]), Some(vec![0x02]));
        assert_eq!(prefix_end(&[0x01, 0xFF]), Some(vec![0x02]));
        assert_eq!(prefix_end(&[0xFF, 0xFF]), None);
        assert_eq!(prefix_end(&[]), None);
    }

    #[test]
    fn mem_store_point_ops() {
        let mut s = MemStore::new();
        s.set(b"a".to_vec(), b"1".to_vec());
        assert_eq!(s.get(b"a"), Some(b"1".to_vec()));
        assert!(s.has(b"a"));
        s.delete(b"a");
        assert!(s.get(b"a").is_none());
        assert!(s.is_empty());
    }

    #[test]
    fn mem_store_prefix_scan_is_ordered_and_bounded() {
        let mut s = MemStore::new();
        s.set(vec![1, 2], b"b".to_vec());
        s.set(vec![1, 1], b"a".to_vec());
        s.set(vec![2, 0], b"z".to_vec());
        s.set(vec![0, 9], b"y".to_vec());
        assert_eq!(
            s.prefix_scan(&[1]),
            vec![kv(&[1, 1], b"a"), kv(&[1, 2], b"b")]
        );
    }

    #[test]
    fn empty_or_inverted_range_is_empty() {
        let mut s = MemStore::new();
        s.set(vec![5], b"x".to_vec());
        assert!(s.range(&[6], Some(&[5])).is_empty());
        assert!(s.range(&[5], Some(&[5])).is_empty());
        assert_eq!(s.range(&[5], None).len(), 1);
    }

    #[test]
    fn cache_reads_through_and_shadows() {
        let mut root = MemStore::new();
        root.set(vec![1, 1], b"root".to_vec());
        root.set(vec![1, 2], b"gone".to_vec());
        let mut cache = CacheStore::new(&mut root);
        cache.set(vec![1, 3], b"new".to_vec());
        cache.set(vec![1, 1], b"over".to_vec());
        cache.delete(&[1, 2]);
        assert_eq!(cache.get(&[1, 1]), Some(b"over".to_vec()));
        assert!(cache.get(&[1, 2]).is_none());
        assert_eq!(
            cache.prefix_scan(&[1]),
            vec![kv(&[1, 1], b"over"), kv(&[1, 3], b"new")]
        );
        assert_eq!(cache.pending(), 3);
    }

    #[test]
    fn dropped_cache_leaves_parent_untouched() {
        let mut root = MemStore::new();
        root.set(vec![1], b"keep".to_vec());
        let before = root.clone();
        {
            let mut cache = CacheStore::new(&mut root);
            cache.delete(&[1]);
            cache.set(vec![2], b"x".to_vec());
        }
        assert_eq!(root, before);
    }

    #[test]
    fn written_cache_commits() {
        let mut root = MemStore::new();
        root.set(vec![1], b"old".to_vec());
        let mut cache = CacheStore::new(&mut root);
        cache.delete(&[1]);
        cache.set(vec![2], b"x".to_vec());
        cache.write();
        assert!(root.get(&[1]).is_none());
        assert_eq!(root.get(&[2]), Some(b"x".to_vec()));
    }

    #[test]
    fn nested_caches_compose() {
        let mut root = MemStore::new();
        let mut outer = CacheStore::new(&mut root);
        outer.set(vec![1], b"outer".to_vec());
        {
            let mut inner = CacheStore::new(&mut outer);
            assert_eq!(inner.get(&[1]), Some(b"outer".to_vec()));
            inner.set(vec![2], b"inner".to_vec());
            inner.write();
        }
        assert_eq!(outer.prefix_scan(&[]).len(), 2);
        outer.write();
        assert_eq!(root.len(), 2);
    }
}

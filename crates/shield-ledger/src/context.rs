//! # Execution Context
//!
//! Every ledger operation receives a [`Context`]: the store handle it may
//! read and write, plus the header of the block being executed. There is no
//! global state. Two operations see each other's writes only because they are
//! handed the same store.
//!
//! [`Context::atomic`] runs a closure against a cache overlay and commits the
//! overlay only when the closure returns `Ok`. Every public state-changing
//! operation of the keeper goes through it, so a rejected or aborted
//! operation leaves the store byte-identical.

use shield_core::Timestamp;

use crate::store::{CacheStore, KvStore};

/// Height and time of the block being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub height: u64,
    pub time: Timestamp,
}

impl BlockHeader {
    pub fn new(height: u64, time: Timestamp) -> Self {
        Self { height, time }
    }
}

/// Store handle and block header for one execution scope.
pub struct Context<'a> {
    store: &'a mut (dyn KvStore + 'a),
    header: BlockHeader,
}

impl<'a> Context<'a> {
    pub fn new(store: &'a mut (dyn KvStore + 'a), header: BlockHeader) -> Self {
        Self { store, header }
    }

    pub fn header(&self) -> BlockHeader {
        self.header
    }

    pub fn block_height(&self) -> u64 {
        self.header.height
    }

    pub fn block_time(&self) -> Timestamp {
        self.header.time
    }

    pub fn store(&self) -> &(dyn KvStore + 'a) {
        &*self.store
    }

    pub fn store_mut(&mut self) -> &mut (dyn KvStore + 'a) {
        &mut *self.store
    }

    /// Run `f` all-or-nothing.
    ///
    /// `f` sees a child context whose writes land in a cache overlay. The
    /// overlay is flushed into this context's store only if `f` returns
    /// `Ok`; on `Err` it is dropped.
    pub fn atomic<T, E>(
        &mut self,
        f: impl FnOnce(&mut Context<'_>) -> Result<T, E>,
    ) -> Result<T, E> {
        let header = self.header;
        let mut cache = CacheStore::new(&mut *self.store);
        let out = {
            let mut child = Context::new(&mut cache, header);
            f(&mut child)?
        };
        cache.write();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;

    fn header() -> BlockHeader {
        BlockHeader::new(10, Timestamp::parse("2026-01-01T00:00:00Z").unwrap())
    }

    #[test]
    fn atomic_commits_on_ok() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, header());
        let r: Result<u8, ()> = ctx.atomic(|c| {
            c.store_mut().set(b"k".to_vec(), b"v".to_vec());
            Ok(1)
        });
        assert_eq!(r, Ok(1));
        assert_eq!(store.get(b"k"), Some(b"v".to_vec()));
    }

    #[test]
    fn atomic_discards_on_err() {
        let mut store = MemStore::new();
        store.set(b"k".to_vec(), b"old".to_vec());
        let mut ctx = Context::new(&mut store, header());
        let r: Result<(), &str> = ctx.atomic(|c| {
            c.store_mut().set(b"k".to_vec(), b"new".to_vec());
            c.store_mut().set(b"other".to_vec(), b"x".to_vec());
            Err("rejected")
        });
        assert_eq!(r, Err("rejected"));
        assert_eq!(store.get(b"k"), Some(b"old".to_vec()));
        assert!(store.get(b"other").is_none());
    }

    #[test]
    fn inner_failure_keeps_outer_writes() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, header());
        let r: Result<(), ()> = ctx.atomic(|outer| {
            outer.store_mut().set(b"a".to_vec(), b"1".to_vec());
            let inner: Result<(), ()> = outer.atomic(|inner| {
                inner.store_mut().set(b"b".to_vec(), b"2".to_vec());
                Err(())
            });
            assert!(inner.is_err());
            assert!(outer.store().get(b"b").is_none());
            Ok(())
        });
        assert!(r.is_ok());
        assert_eq!(store.get(b"a"), Some(b"1".to_vec()));
        assert!(store.get(b"b").is_none());
    }

    #[test]
    fn child_sees_same_header() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, header());
        let h: Result<BlockHeader, ()> = ctx.atomic(|c| Ok(c.header()));
        assert_eq!(h.unwrap(), header());
        assert_eq!(ctx.block_height(), 10);
    }
}

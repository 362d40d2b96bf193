//! Typed indices over a shared ordered keyspace.
//!
//! Every index owns a one-byte prefix; its keys are stored as
//! `prefix || key.encode()`, so an ascending scan starting at the prefix visits
//! exactly that index in key order.
//!
//! ```text
//! 0x00 meta                      "seq"              -> last allocated sequence
//! 0x01 retrieval (composite)     address            -> stored_at | access_seq | data
//! 0x02 retrieval data (split)    address            -> stored_at | data
//! 0x03 retrieval access (split)  address            -> access_seq
//! 0x04 pull                      pull_seq | address -> ()
//! 0x05 gc                        access_seq | address -> pull_seq
//! ```

use std::marker::PhantomData;

use vertex_storage::{Batch, DatabaseError, IndexStore, Key, Value};

mod keys;
mod retrieval;

pub(crate) use keys::{GcValue, PullValue, SeqKey};
pub(crate) use retrieval::{RetrievalIndex, RetrievalItem, retrieval_index};

/// Index prefixes.
pub(crate) mod prefix {
    pub(crate) const META: u8 = 0x00;
    pub(crate) const RETRIEVAL_COMPOSITE: u8 = 0x01;
    pub(crate) const RETRIEVAL_DATA: u8 = 0x02;
    pub(crate) const RETRIEVAL_ACCESS: u8 = 0x03;
    pub(crate) const PULL: u8 = 0x04;
    pub(crate) const GC: u8 = 0x05;
}

/// Pull index: synced chunks ordered by insertion sequence.
pub(crate) type PullIndex = Index<SeqKey, PullValue>;

/// Gc index: synced chunks ordered by access sequence, oldest first.
pub(crate) type GcIndex = Index<SeqKey, GcValue>;

/// A typed view of one prefix of an [`IndexStore`].
///
/// Reads go straight to the store; writes are queued into a [`Batch`] so that
/// mutations spanning several indices commit together.
#[derive(Debug)]
pub(crate) struct Index<K, V> {
    prefix: u8,
    name: &'static str,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Index<K, V> {
    pub(crate) const fn new(prefix: u8, name: &'static str) -> Self {
        Self {
            prefix,
            name,
            _marker: PhantomData,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }
}

impl<K: Key, V: Value> Index<K, V> {
    fn key(&self, key: K) -> Vec<u8> {
        let encoded = key.encode();
        let encoded = encoded.as_ref();
        let mut buf = Vec::with_capacity(1 + encoded.len());
        buf.push(self.prefix);
        buf.extend_from_slice(encoded);
        buf
    }

    pub(crate) fn get<S: IndexStore>(&self, store: &S, key: K) -> Result<Option<V>, DatabaseError> {
        store
            .get(&self.key(key))?
            .map(V::decompress_owned)
            .transpose()
    }

    pub(crate) fn has<S: IndexStore>(&self, store: &S, key: K) -> Result<bool, DatabaseError> {
        store.has(&self.key(key))
    }

    pub(crate) fn put(&self, batch: &mut Batch, key: K, value: V) {
        batch.put(self.key(key), value.compress());
    }

    pub(crate) fn delete(&self, batch: &mut Batch, key: K) {
        batch.delete(self.key(key));
    }

    /// Iterate entries in ascending key order, from `start` (inclusive) or
    /// from the beginning of the index.
    ///
    /// Return `Ok(false)` from the callback to stop.
    pub(crate) fn iterate<S, F>(
        &self,
        store: &S,
        start: Option<K>,
        mut callback: F,
    ) -> Result<(), DatabaseError>
    where
        S: IndexStore,
        F: FnMut(K, V) -> Result<bool, DatabaseError>,
    {
        let start = match start {
            Some(key) => self.key(key),
            None => vec![self.prefix],
        };

        store.iterate_from(&start, |key, value| match key.split_first() {
            Some((&prefix, rest)) if prefix == self.prefix => {
                callback(K::decode(rest)?, V::decompress(value)?)
            }
            _ => Ok(false),
        })
    }

    /// Number of entries, by full scan.
    pub(crate) fn count<S: IndexStore>(&self, store: &S) -> Result<u64, DatabaseError> {
        let mut count = 0u64;
        self.iterate(store, None, |_, _| {
            count += 1;
            Ok(true)
        })?;
        Ok(count)
    }
}

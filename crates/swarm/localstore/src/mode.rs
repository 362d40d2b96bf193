//! Mode accessors.
//!
//! A [`Putter`], [`Setter`] or [`Getter`] is bound to one mode when it is
//! created and dispatches every call to that mode's operation. Accessors are
//! cheap to create and share the store they were created from.

use std::{
    sync::atomic::Ordering,
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::trace;
use vertex_storage::{Batch, IndexStore};

use crate::{
    Chunk, ChunkAddress, LocalStore, LocalStoreError, LocalStoreResult,
    index::{GcValue, PullValue, RetrievalItem, SeqKey},
    store::Shared,
};

/// How a chunk enters the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ModePut {
    /// Stored locally, not gc-eligible until synced.
    Upload,
}

/// State changes of a stored chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ModeSet {
    /// Confirmed pushed to the network; the chunk becomes gc-eligible.
    Sync,
    /// Dropped from every index.
    Remove,
}

/// How a chunk is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ModeGet {
    /// A retrieval request; refreshes the chunk's gc position.
    Request,
    /// A plain read with no side effects.
    Lookup,
}

/// Stores chunks in a fixed [`ModePut`].
#[derive(Debug)]
pub struct Putter<S: IndexStore> {
    db: LocalStore<S>,
    mode: ModePut,
}

impl<S: IndexStore> Putter<S> {
    pub(crate) fn new(db: LocalStore<S>, mode: ModePut) -> Self {
        Self { db, mode }
    }

    /// The mode every call dispatches to.
    pub fn mode(&self) -> ModePut {
        self.mode
    }

    /// Store a chunk. Storing an address that is already present is a no-op.
    pub fn put(&self, chunk: &Chunk) -> LocalStoreResult<()> {
        match self.mode {
            ModePut::Upload => self.db.shared().put_upload(chunk),
        }
    }
}

/// Changes chunk state in a fixed [`ModeSet`].
#[derive(Debug)]
pub struct Setter<S: IndexStore> {
    db: LocalStore<S>,
    mode: ModeSet,
}

impl<S: IndexStore> Setter<S> {
    pub(crate) fn new(db: LocalStore<S>, mode: ModeSet) -> Self {
        Self { db, mode }
    }

    /// The mode every call dispatches to.
    pub fn mode(&self) -> ModeSet {
        self.mode
    }

    /// Apply the state change to a stored chunk.
    ///
    /// `Sync` fails with [`LocalStoreError::NotUploaded`] for an unknown
    /// address; `Remove` of an unknown address is a no-op.
    pub fn set(&self, address: &ChunkAddress) -> LocalStoreResult<()> {
        match self.mode {
            ModeSet::Sync => self.db.shared().set_sync(address),
            ModeSet::Remove => self.db.shared().set_remove(address),
        }
    }
}

/// Reads chunks in a fixed [`ModeGet`].
#[derive(Debug)]
pub struct Getter<S: IndexStore> {
    db: LocalStore<S>,
    mode: ModeGet,
}

impl<S: IndexStore> Getter<S> {
    pub(crate) fn new(db: LocalStore<S>, mode: ModeGet) -> Self {
        Self { db, mode }
    }

    /// The mode every call dispatches to.
    pub fn mode(&self) -> ModeGet {
        self.mode
    }

    /// Read a chunk, failing with [`LocalStoreError::ChunkNotFound`] if it is
    /// not stored.
    pub fn get(&self, address: &ChunkAddress) -> LocalStoreResult<Chunk> {
        match self.mode {
            ModeGet::Request => self.db.shared().get_request(address),
            ModeGet::Lookup => self.db.shared().get_lookup(address),
        }
    }
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

impl<S: IndexStore> Shared<S> {
    fn put_upload(&self, chunk: &Chunk) -> LocalStoreResult<()> {
        let _guard = self.write_lock.lock();

        // keep stored_at and any gc state of an existing entry
        if self.retrieval.has(&self.store, chunk.address())? {
            trace!(address = %chunk.address(), "Chunk already stored");
            return Ok(());
        }

        let item = RetrievalItem {
            address: *chunk.address(),
            data: chunk.data().clone(),
            stored_at: now_nanos(),
            access_seq: None,
        };

        let mut batch = Batch::new();
        self.retrieval.put(&mut batch, &item);
        self.store.write_batch(batch)?;

        self.metrics.put_upload_total.increment(1);
        trace!(address = %item.address, size = item.data.len(), "Stored chunk");
        Ok(())
    }

    fn set_sync(&self, address: &ChunkAddress) -> LocalStoreResult<()> {
        let gc_size = {
            let mut seq = self.write_lock.lock();

            let Some(mut item) = self.retrieval.get(&self.store, address)? else {
                return Err(LocalStoreError::NotUploaded(*address));
            };
            if item.access_seq.is_some() {
                trace!(%address, "Chunk already synced");
                return Ok(());
            }

            let mut batch = Batch::new();
            let pull_seq = seq.next(&mut batch);
            let access_seq = seq.next(&mut batch);
            item.access_seq = Some(access_seq);

            self.pull.put(&mut batch, SeqKey::new(pull_seq, *address), PullValue);
            self.gc.put(&mut batch, SeqKey::new(access_seq, *address), GcValue { pull_seq });
            self.retrieval.set_access(&mut batch, &item);
            self.store.write_batch(batch)?;

            let gc_size = self.gc_size.fetch_add(1, Ordering::AcqRel) + 1;
            self.metrics.set_gc_size(gc_size);
            self.metrics.set_sync_total.increment(1);
            trace!(%address, pull_seq, access_seq, "Synced chunk");
            gc_size
        };

        self.maybe_trigger_gc(gc_size);
        Ok(())
    }

    fn set_remove(&self, address: &ChunkAddress) -> LocalStoreResult<()> {
        let _guard = self.write_lock.lock();

        let Some(item) = self.retrieval.get(&self.store, address)? else {
            return Ok(());
        };

        let mut batch = Batch::new();
        self.retrieval.delete(&mut batch, address);

        let synced = match item.access_seq {
            Some(access_seq) => {
                let key = SeqKey::new(access_seq, *address);
                match self.gc.get(&self.store, key)? {
                    Some(value) => {
                        self.gc.delete(&mut batch, key);
                        self.pull.delete(&mut batch, SeqKey::new(value.pull_seq, *address));
                        true
                    }
                    None => false,
                }
            }
            None => false,
        };

        self.store.write_batch(batch)?;

        if synced {
            let gc_size = self.gc_size.fetch_sub(1, Ordering::AcqRel) - 1;
            self.metrics.set_gc_size(gc_size);
        }
        self.metrics.set_remove_total.increment(1);
        trace!(%address, synced, "Removed chunk");
        Ok(())
    }

    fn get_request(&self, address: &ChunkAddress) -> LocalStoreResult<Chunk> {
        let (chunk, gc_size) = {
            let mut seq = self.write_lock.lock();

            let Some(mut item) = self.retrieval.get(&self.store, address)? else {
                self.metrics.get_not_found_total.increment(1);
                return Err(LocalStoreError::ChunkNotFound(*address));
            };

            if let Some(old_seq) = item.access_seq {
                let old_key = SeqKey::new(old_seq, *address);
                if let Some(value) = self.gc.get(&self.store, old_key)? {
                    let mut batch = Batch::new();
                    let access_seq = seq.next(&mut batch);
                    item.access_seq = Some(access_seq);

                    self.gc.delete(&mut batch, old_key);
                    self.gc.put(&mut batch, SeqKey::new(access_seq, *address), value);
                    self.retrieval.set_access(&mut batch, &item);
                    self.store.write_batch(batch)?;

                    self.metrics.get_touch_total.increment(1);
                    trace!(%address, old_seq, access_seq, "Refreshed gc position");
                }
            }

            (Chunk::new(item.address, item.data), self.gc_size())
        };

        self.maybe_trigger_gc(gc_size);
        Ok(chunk)
    }

    fn get_lookup(&self, address: &ChunkAddress) -> LocalStoreResult<Chunk> {
        match self.retrieval.get(&self.store, address)? {
            Some(item) => Ok(Chunk::new(item.address, item.data)),
            None => {
                self.metrics.get_not_found_total.increment(1);
                Err(LocalStoreError::ChunkNotFound(*address))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IndexCounts, LocalStoreArgs, RetrievalLayout};
    use vertex_storage::MemoryStore;

    fn test_chunk(n: u8) -> Chunk {
        let mut bytes = [0u8; 32];
        bytes[31] = n;
        Chunk::new(ChunkAddress::new(bytes), format!("chunk data {}", n).into_bytes())
    }

    fn open(layout: RetrievalLayout) -> LocalStore<MemoryStore> {
        let args = LocalStoreArgs::with_capacity(100).with_retrieval_layout(layout);
        LocalStore::new(MemoryStore::new(), &args).unwrap()
    }

    fn gc_order(db: &LocalStore<MemoryStore>) -> Vec<ChunkAddress> {
        let shared = db.shared();
        let mut order = Vec::new();
        shared
            .gc
            .iterate(&shared.store, None, |key, _| {
                order.push(key.address);
                Ok(true)
            })
            .unwrap();
        order
    }

    const LAYOUTS: [RetrievalLayout; 2] = [RetrievalLayout::Composite, RetrievalLayout::Split];

    #[test]
    fn test_mode_display() {
        assert_eq!(ModePut::Upload.to_string(), "upload");
        assert_eq!(ModeSet::Sync.to_string(), "sync");
        assert_eq!(ModeSet::Remove.to_string(), "remove");
        assert_eq!(ModeGet::Request.to_string(), "request");
        assert_eq!(ModeGet::Lookup.to_string(), "lookup");
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        for layout in LAYOUTS {
            let db = open(layout);
            let putter = db.putter(ModePut::Upload);
            let chunk = test_chunk(1);

            putter.put(&chunk).unwrap();
            let first = db.shared().retrieval.get(&db.shared().store, chunk.address()).unwrap().unwrap();

            // a second put with different data keeps the first entry
            putter.put(&Chunk::new(*chunk.address(), b"other".to_vec())).unwrap();
            let second = db.shared().retrieval.get(&db.shared().store, chunk.address()).unwrap().unwrap();

            assert_eq!(first, second);
            assert_eq!(second.data, *chunk.data());
            assert_eq!(db.gc_size(), 0);
            assert_eq!(db.index_counts().unwrap().retrieval, 1);

            db.close().await;
        }
    }

    #[tokio::test]
    async fn test_put_after_sync_keeps_gc_state() {
        for layout in LAYOUTS {
            let db = open(layout);
            let chunk = test_chunk(1);

            db.putter(ModePut::Upload).put(&chunk).unwrap();
            db.setter(ModeSet::Sync).set(chunk.address()).unwrap();
            db.putter(ModePut::Upload).put(&chunk).unwrap();

            let item = db.shared().retrieval.get(&db.shared().store, chunk.address()).unwrap().unwrap();
            assert!(item.access_seq.is_some());
            assert_eq!(db.gc_size(), 1);

            db.close().await;
        }
    }

    #[tokio::test]
    async fn test_sync_requires_upload() {
        let db = open(RetrievalLayout::Split);
        let chunk = test_chunk(1);

        let err = db.setter(ModeSet::Sync).set(chunk.address()).unwrap_err();
        assert!(matches!(err, LocalStoreError::NotUploaded(address) if address == *chunk.address()));
        assert_eq!(db.index_counts().unwrap(), IndexCounts::default());

        db.close().await;
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        for layout in LAYOUTS {
            let db = open(layout);
            let chunk = test_chunk(1);
            let setter = db.setter(ModeSet::Sync);

            db.putter(ModePut::Upload).put(&chunk).unwrap();
            setter.set(chunk.address()).unwrap();
            let pulled = db.pull_items(0, 10).unwrap();

            setter.set(chunk.address()).unwrap();

            assert_eq!(db.gc_size(), 1);
            assert_eq!(db.pull_items(0, 10).unwrap(), pulled);
            let counts = db.index_counts().unwrap();
            assert_eq!((counts.retrieval, counts.pull, counts.gc), (1, 1, 1));

            db.close().await;
        }
    }

    #[tokio::test]
    async fn test_request_moves_chunk_to_gc_tail() {
        for layout in LAYOUTS {
            let db = open(layout);
            let chunks: Vec<_> = (0..3).map(test_chunk).collect();
            for chunk in &chunks {
                db.putter(ModePut::Upload).put(chunk).unwrap();
                db.setter(ModeSet::Sync).set(chunk.address()).unwrap();
            }
            let pulled = db.pull_items(0, 10).unwrap();

            let got = db.getter(ModeGet::Request).get(chunks[0].address()).unwrap();
            assert_eq!(got, chunks[0]);

            assert_eq!(
                gc_order(&db),
                vec![*chunks[1].address(), *chunks[2].address(), *chunks[0].address()]
            );
            // insertion order is untouched
            assert_eq!(db.pull_items(0, 10).unwrap(), pulled);
            assert_eq!(db.gc_size(), 3);

            let item = db.shared().retrieval.get(&db.shared().store, chunks[0].address()).unwrap().unwrap();
            let mut keys = Vec::new();
            db.shared()
                .gc
                .iterate(&db.shared().store, None, |key, _| {
                    keys.push(key);
                    Ok(true)
                })
                .unwrap();
            assert_eq!(keys.last().map(|key| key.seq), item.access_seq);

            db.close().await;
        }
    }

    #[tokio::test]
    async fn test_request_unsynced_chunk_has_no_gc_effect() {
        let db = open(RetrievalLayout::Split);
        let chunk = test_chunk(1);
        db.putter(ModePut::Upload).put(&chunk).unwrap();

        assert_eq!(db.getter(ModeGet::Request).get(chunk.address()).unwrap(), chunk);
        assert_eq!(db.gc_size(), 0);
        assert_eq!(db.index_counts().unwrap().gc, 0);

        db.close().await;
    }

    #[tokio::test]
    async fn test_lookup_does_not_touch() {
        let db = open(RetrievalLayout::Composite);
        let chunks: Vec<_> = (0..2).map(test_chunk).collect();
        for chunk in &chunks {
            db.putter(ModePut::Upload).put(chunk).unwrap();
            db.setter(ModeSet::Sync).set(chunk.address()).unwrap();
        }
        let before = gc_order(&db);

        assert_eq!(db.getter(ModeGet::Lookup).get(chunks[0].address()).unwrap(), chunks[0]);
        assert_eq!(gc_order(&db), before);

        db.close().await;
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = open(RetrievalLayout::Split);
        let address = *test_chunk(1).address();

        for mode in [ModeGet::Request, ModeGet::Lookup] {
            let err = db.getter(mode).get(&address).unwrap_err();
            assert!(err.is_not_found());
        }

        db.close().await;
    }

    #[tokio::test]
    async fn test_remove() {
        for layout in LAYOUTS {
            let db = open(layout);
            let synced = test_chunk(1);
            let uploaded = test_chunk(2);
            db.putter(ModePut::Upload).put(&synced).unwrap();
            db.putter(ModePut::Upload).put(&uploaded).unwrap();
            db.setter(ModeSet::Sync).set(synced.address()).unwrap();

            let remover = db.setter(ModeSet::Remove);
            remover.set(synced.address()).unwrap();
            remover.set(uploaded.address()).unwrap();
            // unknown address
            remover.set(test_chunk(3).address()).unwrap();

            assert_eq!(db.gc_size(), 0);
            assert_eq!(db.index_counts().unwrap(), IndexCounts::default());
            assert!(!db.has(synced.address()).unwrap());
            // only the layout and the sequence high-water mark are left
            assert_eq!(db.shared().store.len(), 2);

            db.close().await;
        }
    }

    #[tokio::test]
    async fn test_accessor_modes() {
        let db = open(RetrievalLayout::Split);
        assert_eq!(db.putter(ModePut::Upload).mode(), ModePut::Upload);
        assert_eq!(db.setter(ModeSet::Remove).mode(), ModeSet::Remove);
        assert_eq!(db.getter(ModeGet::Lookup).mode(), ModeGet::Lookup);
        db.close().await;
    }
}

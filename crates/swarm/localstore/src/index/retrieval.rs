//! Retrieval index layouts.
//!
//! The retrieval index maps a chunk address to its payload, the time it was
//! stored and, once synced, its current access sequence. [`CompositeRetrieval`]
//! keeps all of it in one entry; [`SplitRetrieval`] keeps the access sequence
//! in a separate index so a touch does not rewrite the payload.

use bytes::{BufMut, Bytes};
use vertex_storage::{Batch, Compress, DatabaseError, Decompress, IndexStore};

use super::{Index, keys::read_u64, prefix};
use crate::{ChunkAddress, RetrievalLayout};

/// A retrieval index entry, independent of layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RetrievalItem {
    pub(crate) address: ChunkAddress,
    pub(crate) data: Bytes,
    /// Unix time in nanoseconds when the chunk was uploaded.
    pub(crate) stored_at: u64,
    /// Current gc access sequence; `None` until the chunk is synced.
    pub(crate) access_seq: Option<u64>,
}

/// Storage strategy for retrieval entries.
pub(crate) trait RetrievalIndex<S: IndexStore>: Send + Sync {
    /// The layout this strategy implements.
    fn layout(&self) -> RetrievalLayout;

    fn get(&self, store: &S, address: &ChunkAddress) -> Result<Option<RetrievalItem>, DatabaseError>;

    fn has(&self, store: &S, address: &ChunkAddress) -> Result<bool, DatabaseError>;

    /// Queue a full write of the item.
    fn put(&self, batch: &mut Batch, item: &RetrievalItem);

    /// Queue a write of the item's access sequence only.
    fn set_access(&self, batch: &mut Batch, item: &RetrievalItem);

    /// Queue deletion of every entry for the address.
    fn delete(&self, batch: &mut Batch, address: &ChunkAddress);

    /// Number of stored chunks.
    fn count(&self, store: &S) -> Result<u64, DatabaseError>;
}

/// Select the retrieval strategy for a layout.
pub(crate) fn retrieval_index<S: IndexStore>(layout: RetrievalLayout) -> Box<dyn RetrievalIndex<S>> {
    match layout {
        RetrievalLayout::Composite => Box::new(CompositeRetrieval::new()),
        RetrievalLayout::Split => Box::new(SplitRetrieval::new()),
    }
}

/// Composite entry value: `stored_at | access_seq | data`, access sequence 0
/// meaning not synced.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CompositeValue {
    stored_at: u64,
    access_seq: Option<u64>,
    data: Bytes,
}

impl Compress for CompositeValue {
    type Compressed = Vec<u8>;

    fn compress_to_buf<B: BufMut + AsMut<[u8]>>(&self, buf: &mut B) {
        buf.put_u64(self.stored_at);
        buf.put_u64(self.access_seq.unwrap_or_default());
        buf.put_slice(&self.data);
    }
}

impl Decompress for CompositeValue {
    fn decompress(mut value: &[u8]) -> Result<Self, DatabaseError> {
        let stored_at = read_u64(&mut value)?;
        let access_seq = read_u64(&mut value)?;
        Ok(Self {
            stored_at,
            access_seq: (access_seq != 0).then_some(access_seq),
            data: Bytes::copy_from_slice(value),
        })
    }
}

/// Single-entry layout.
#[derive(Debug)]
pub(crate) struct CompositeRetrieval {
    index: Index<ChunkAddress, CompositeValue>,
}

impl CompositeRetrieval {
    pub(crate) const fn new() -> Self {
        Self {
            index: Index::new(prefix::RETRIEVAL_COMPOSITE, "retrieval"),
        }
    }

    fn value(item: &RetrievalItem) -> CompositeValue {
        CompositeValue {
            stored_at: item.stored_at,
            access_seq: item.access_seq,
            data: item.data.clone(),
        }
    }
}

impl<S: IndexStore> RetrievalIndex<S> for CompositeRetrieval {
    fn layout(&self) -> RetrievalLayout {
        RetrievalLayout::Composite
    }

    fn get(&self, store: &S, address: &ChunkAddress) -> Result<Option<RetrievalItem>, DatabaseError> {
        Ok(self.index.get(store, *address)?.map(|value| RetrievalItem {
            address: *address,
            data: value.data,
            stored_at: value.stored_at,
            access_seq: value.access_seq,
        }))
    }

    fn has(&self, store: &S, address: &ChunkAddress) -> Result<bool, DatabaseError> {
        self.index.has(store, *address)
    }

    fn put(&self, batch: &mut Batch, item: &RetrievalItem) {
        self.index.put(batch, item.address, Self::value(item));
    }

    fn set_access(&self, batch: &mut Batch, item: &RetrievalItem) {
        // access metadata lives next to the payload
        self.index.put(batch, item.address, Self::value(item));
    }

    fn delete(&self, batch: &mut Batch, address: &ChunkAddress) {
        self.index.delete(batch, *address);
    }

    fn count(&self, store: &S) -> Result<u64, DatabaseError> {
        self.index.count(store)
    }
}

/// Split data entry value: `stored_at | data`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DataValue {
    stored_at: u64,
    data: Bytes,
}

impl Compress for DataValue {
    type Compressed = Vec<u8>;

    fn compress_to_buf<B: BufMut + AsMut<[u8]>>(&self, buf: &mut B) {
        buf.put_u64(self.stored_at);
        buf.put_slice(&self.data);
    }
}

impl Decompress for DataValue {
    fn decompress(mut value: &[u8]) -> Result<Self, DatabaseError> {
        let stored_at = read_u64(&mut value)?;
        Ok(Self {
            stored_at,
            data: Bytes::copy_from_slice(value),
        })
    }
}

/// Split access entry value: `access_seq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AccessValue {
    access_seq: u64,
}

impl Compress for AccessValue {
    type Compressed = Vec<u8>;

    fn compress_to_buf<B: BufMut + AsMut<[u8]>>(&self, buf: &mut B) {
        buf.put_u64(self.access_seq);
    }
}

impl Decompress for AccessValue {
    fn decompress(mut value: &[u8]) -> Result<Self, DatabaseError> {
        Ok(Self {
            access_seq: read_u64(&mut value)?,
        })
    }
}

/// Two-entry layout: payload and access metadata in separate indices.
#[derive(Debug)]
pub(crate) struct SplitRetrieval {
    data: Index<ChunkAddress, DataValue>,
    access: Index<ChunkAddress, AccessValue>,
}

impl SplitRetrieval {
    pub(crate) const fn new() -> Self {
        Self {
            data: Index::new(prefix::RETRIEVAL_DATA, "retrieval-data"),
            access: Index::new(prefix::RETRIEVAL_ACCESS, "retrieval-access"),
        }
    }

    fn write_access(&self, batch: &mut Batch, item: &RetrievalItem) {
        match item.access_seq {
            Some(access_seq) => self.access.put(batch, item.address, AccessValue { access_seq }),
            None => self.access.delete(batch, item.address),
        }
    }
}

impl<S: IndexStore> RetrievalIndex<S> for SplitRetrieval {
    fn layout(&self) -> RetrievalLayout {
        RetrievalLayout::Split
    }

    fn get(&self, store: &S, address: &ChunkAddress) -> Result<Option<RetrievalItem>, DatabaseError> {
        let Some(data) = self.data.get(store, *address)? else {
            return Ok(None);
        };
        let access = self.access.get(store, *address)?;

        Ok(Some(RetrievalItem {
            address: *address,
            data: data.data,
            stored_at: data.stored_at,
            access_seq: access.map(|access| access.access_seq),
        }))
    }

    fn has(&self, store: &S, address: &ChunkAddress) -> Result<bool, DatabaseError> {
        self.data.has(store, *address)
    }

    fn put(&self, batch: &mut Batch, item: &RetrievalItem) {
        self.data.put(
            batch,
            item.address,
            DataValue {
                stored_at: item.stored_at,
                data: item.data.clone(),
            },
        );
        self.write_access(batch, item);
    }

    fn set_access(&self, batch: &mut Batch, item: &RetrievalItem) {
        self.write_access(batch, item);
    }

    fn delete(&self, batch: &mut Batch, address: &ChunkAddress) {
        self.data.delete(batch, *address);
        self.access.delete(batch, *address);
    }

    fn count(&self, store: &S) -> Result<u64, DatabaseError> {
        self.data.count(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vertex_storage::MemoryStore;

    fn test_item(n: u8) -> RetrievalItem {
        let mut bytes = [0u8; 32];
        bytes[0] = n;
        RetrievalItem {
            address: ChunkAddress::new(bytes),
            data: Bytes::from(format!("chunk data {}", n)),
            stored_at: 1_000 + n as u64,
            access_seq: None,
        }
    }

    fn check_layout(layout: RetrievalLayout) {
        let store = MemoryStore::new();
        let index = retrieval_index::<MemoryStore>(layout);
        assert_eq!(index.layout(), layout);

        let mut item = test_item(1);
        let mut batch = Batch::new();
        index.put(&mut batch, &item);
        store.write_batch(batch).unwrap();

        assert!(index.has(&store, &item.address).unwrap());
        assert_eq!(index.get(&store, &item.address).unwrap(), Some(item.clone()));
        assert_eq!(index.count(&store).unwrap(), 1);

        item.access_seq = Some(5);
        let mut batch = Batch::new();
        index.set_access(&mut batch, &item);
        store.write_batch(batch).unwrap();

        let stored = index.get(&store, &item.address).unwrap().unwrap();
        assert_eq!(stored.access_seq, Some(5));
        assert_eq!(stored.data, item.data);
        assert_eq!(stored.stored_at, item.stored_at);

        let mut batch = Batch::new();
        index.delete(&mut batch, &item.address);
        store.write_batch(batch).unwrap();

        assert_eq!(index.get(&store, &item.address).unwrap(), None);
        assert_eq!(index.count(&store).unwrap(), 0);
        // nothing left behind in any region
        assert!(store.is_empty());
    }

    #[test]
    fn test_composite_layout() {
        check_layout(RetrievalLayout::Composite);
    }

    #[test]
    fn test_split_layout() {
        check_layout(RetrievalLayout::Split);
    }

    #[test]
    fn test_get_missing() {
        let store = MemoryStore::new();
        for layout in [RetrievalLayout::Composite, RetrievalLayout::Split] {
            let index = retrieval_index::<MemoryStore>(layout);
            assert_eq!(index.get(&store, &test_item(9).address).unwrap(), None);
        }
    }

    #[test]
    fn test_composite_value_rejects_short_input() {
        assert_eq!(
            CompositeValue::decompress(&[0; 12]),
            Err(DatabaseError::Decode)
        );
    }

    #[test]
    fn test_split_put_writes_access() {
        let store = MemoryStore::new();
        let index = SplitRetrieval::new();

        let mut item = test_item(2);
        item.access_seq = Some(11);
        let mut batch = Batch::new();
        RetrievalIndex::<MemoryStore>::put(&index, &mut batch, &item);
        store.write_batch(batch).unwrap();

        assert_eq!(index.access.get(&store, item.address).unwrap(), Some(AccessValue { access_seq: 11 }));
        assert_eq!(RetrievalIndex::<MemoryStore>::get(&index, &store, &item.address).unwrap(), Some(item));
    }
}

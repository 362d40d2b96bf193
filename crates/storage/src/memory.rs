//! In-memory ordered store.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::{Batch, BatchOp, DatabaseError, IndexStore};

/// Simple in-memory ordered store.
///
/// Backed by a [`BTreeMap`], so iteration order matches the bytewise key
/// order of persistent backends. Batches are applied under one write lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of keys across all indices.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl IndexStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DatabaseError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn has(&self, key: &[u8]) -> Result<bool, DatabaseError> {
        Ok(self.entries.read().contains_key(key))
    }

    fn iterate_from<F>(&self, start: &[u8], mut callback: F) -> Result<(), DatabaseError>
    where
        F: FnMut(&[u8], &[u8]) -> Result<bool, DatabaseError>,
    {
        let entries = self.entries.read();
        for (key, value) in entries.range(start.to_vec()..) {
            if !callback(key.as_slice(), value.as_slice())? {
                break;
            }
        }
        Ok(())
    }

    fn write_batch(&self, batch: Batch) -> Result<(), DatabaseError> {
        let mut entries = self.entries.write();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => {
                    entries.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get() {
        let store = MemoryStore::new();

        store.put(b"key", b"value").unwrap();

        assert_eq!(store.get(b"key").unwrap(), Some(b"value".to_vec()));
        assert!(store.has(b"key").unwrap());
        assert!(!store.has(b"other").unwrap());
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let store = MemoryStore::new();
        store.delete(b"missing").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_iterate_from_is_ascending() {
        let store = MemoryStore::new();
        for key in [[2u8, 9], [1, 5], [2, 1], [3, 0]] {
            store.put(&key, b"").unwrap();
        }

        let mut seen = Vec::new();
        store
            .iterate_from(&[2], |key, _| {
                seen.push(key.to_vec());
                Ok(true)
            })
            .unwrap();

        assert_eq!(seen, vec![vec![2, 1], vec![2, 9], vec![3, 0]]);
    }

    #[test]
    fn test_iterate_stops() {
        let store = MemoryStore::new();
        for i in 0..10u8 {
            store.put(&[i], b"").unwrap();
        }

        let mut count = 0;
        store
            .iterate_from(&[], |_, _| {
                count += 1;
                Ok(count < 3)
            })
            .unwrap();

        assert_eq!(count, 3);
    }

    #[test]
    fn test_write_batch_applies_in_order() {
        let store = MemoryStore::new();
        store.put(b"gone", b"x").unwrap();

        let mut batch = Batch::new();
        batch.put(b"a".to_vec(), b"1".to_vec());
        batch.put(b"a".to_vec(), b"2".to_vec());
        batch.delete(b"gone".to_vec());
        store.write_batch(batch).unwrap();

        assert_eq!(store.get(b"a").unwrap(), Some(b"2".to_vec()));
        assert!(!store.has(b"gone").unwrap());
        assert_eq!(store.len(), 1);
    }
}

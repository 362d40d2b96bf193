//! redb-based [`IndexStore`] backend.
//!
//! All indices share a single table of byte keys, so every [`Batch`] is one
//! redb write transaction regardless of how many indices it touches.

use std::path::Path;

use metrics::Counter;
use redb::{Database, TableDefinition};
use tracing::debug;
use vertex_storage::{Batch, BatchOp, DatabaseError, IndexStore};

/// Table definition for all index entries.
/// Key: index prefix byte followed by the encoded index key
/// Value: encoded index value
const ENTRIES_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("entries");

/// redb-based index store.
///
/// Uses redb for ACID-compliant persistent storage.
/// Thread-safe for concurrent reads and writes.
pub struct RedbStore {
    db: Database,
    batches_total: Counter,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let db = Database::create(path).map_err(|e| DatabaseError::Open(e.to_string()))?;

        // Ensure the entries table exists
        let write_txn = db.begin_write().map_err(write_err)?;
        {
            let _ = write_txn.open_table(ENTRIES_TABLE).map_err(write_err)?;
        }
        write_txn.commit().map_err(commit_err)?;

        debug!("Opened redb index store");
        Ok(Self {
            db,
            batches_total: metrics::counter!("storage.redb.batches_total"),
        })
    }
}

fn read_err(err: impl std::fmt::Display) -> DatabaseError {
    DatabaseError::Read(err.to_string())
}

fn write_err(err: impl std::fmt::Display) -> DatabaseError {
    DatabaseError::Write(err.to_string())
}

fn commit_err(err: impl std::fmt::Display) -> DatabaseError {
    DatabaseError::Commit(err.to_string())
}

impl IndexStore for RedbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DatabaseError> {
        let read_txn = self.db.begin_read().map_err(read_err)?;
        let table = read_txn.open_table(ENTRIES_TABLE).map_err(read_err)?;
        match table.get(key).map_err(read_err)? {
            Some(value) => Ok(Some(value.value().to_vec())),
            None => Ok(None),
        }
    }

    fn iterate_from<F>(&self, start: &[u8], mut callback: F) -> Result<(), DatabaseError>
    where
        F: FnMut(&[u8], &[u8]) -> Result<bool, DatabaseError>,
    {
        let read_txn = self.db.begin_read().map_err(read_err)?;
        let table = read_txn.open_table(ENTRIES_TABLE).map_err(read_err)?;

        for entry in table.range::<&[u8]>(start..).map_err(read_err)? {
            let (key, value) = entry.map_err(read_err)?;
            if !callback(key.value(), value.value())? {
                break;
            }
        }

        Ok(())
    }

    fn write_batch(&self, batch: Batch) -> Result<(), DatabaseError> {
        if batch.is_empty() {
            return Ok(());
        }

        let write_txn = self.db.begin_write().map_err(write_err)?;
        {
            let mut table = write_txn.open_table(ENTRIES_TABLE).map_err(write_err)?;
            for op in batch.into_ops() {
                match op {
                    BatchOp::Put { key, value } => {
                        table
                            .insert(key.as_slice(), value.as_slice())
                            .map_err(write_err)?;
                    }
                    BatchOp::Delete { key } => {
                        table.remove(key.as_slice()).map_err(write_err)?;
                    }
                }
            }
        }
        write_txn.commit().map_err(commit_err)?;

        self.batches_total.increment(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_put_get() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        store.put(b"key", b"hello world").unwrap();

        assert_eq!(store.get(b"key").unwrap(), Some(b"hello world".to_vec()));
        assert_eq!(store.get(b"missing").unwrap(), None);
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        store.put(b"key", b"data").unwrap();
        assert!(store.has(b"key").unwrap());

        store.delete(b"key").unwrap();
        assert!(!store.has(b"key").unwrap());

        // deleting again is fine
        store.delete(b"key").unwrap();
    }

    #[test]
    fn test_iterate_from() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        for key in [[5u8, 0, 2], [5, 0, 1], [4, 9, 9], [6, 0, 0]] {
            store.put(&key, b"data").unwrap();
        }

        let mut seen = Vec::new();
        store
            .iterate_from(&[5], |key, _| {
                if key.first() != Some(&5) {
                    return Ok(false);
                }
                seen.push(key.to_vec());
                Ok(true)
            })
            .unwrap();

        assert_eq!(seen, vec![vec![5, 0, 1], vec![5, 0, 2]]);
    }

    #[test]
    fn test_write_batch() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();
        store.put(b"old", b"data").unwrap();

        let mut batch = Batch::new();
        batch.put(b"a".to_vec(), b"1".to_vec());
        batch.put(b"b".to_vec(), b"2".to_vec());
        batch.delete(b"old".to_vec());
        store.write_batch(batch).unwrap();

        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert!(!store.has(b"old").unwrap());
    }

    #[test]
    fn test_reopen_keeps_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.redb");

        {
            let store = RedbStore::open(&path).unwrap();
            store.put(b"persisted", b"yes").unwrap();
        }

        let store = RedbStore::open(&path).unwrap();
        assert_eq!(store.get(b"persisted").unwrap(), Some(b"yes".to_vec()));
    }
}

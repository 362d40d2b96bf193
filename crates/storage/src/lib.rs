//! Ordered key-value storage abstraction.
//!
//! Backends implement [`IndexStore`]: point lookups, ascending iteration from a
//! start key and atomic application of a [`Batch`]. Typed indices built on top
//! encode their keys with [`Encode`]/[`Decode`] and their values with
//! [`Compress`]/[`Decompress`].

use std::fmt::Debug;

mod batch;
mod memory;

pub use batch::{Batch, BatchOp};
pub use memory::MemoryStore;

/// Trait that will transform the data to be saved in the DB in a (ideally) compressed format
pub trait Compress: Send + Sync + Sized + Debug {
    /// Compressed type.
    type Compressed: bytes::BufMut
        + AsRef<[u8]>
        + AsMut<[u8]>
        + Into<Vec<u8>>
        + Default
        + Send
        + Sync
        + Debug;

    /// Compresses data going into the database.
    fn compress(self) -> Self::Compressed {
        let mut buf = Self::Compressed::default();
        self.compress_to_buf(&mut buf);
        buf
    }

    /// Compresses data to a given buffer.
    fn compress_to_buf<B: bytes::BufMut + AsMut<[u8]>>(&self, buf: &mut B);
}

/// Trait that will transform the data to be read from the DB.
pub trait Decompress: Send + Sync + Sized + Debug {
    /// Decompresses data coming from the database.
    fn decompress(value: &[u8]) -> Result<Self, DatabaseError>;

    /// Decompresses owned data coming from the database.
    fn decompress_owned(value: Vec<u8>) -> Result<Self, DatabaseError> {
        Self::decompress(&value)
    }
}

/// Trait that will transform the data to be saved in the DB.
///
/// Encodings of keys must preserve ordering: `a < b` implies
/// `a.encode() < b.encode()` bytewise.
pub trait Encode: Send + Sync + Sized + Debug {
    /// Encoded type.
    type Encoded: AsRef<[u8]> + Into<Vec<u8>> + Send + Sync + Ord + Debug;

    /// Encodes data going into the database.
    fn encode(self) -> Self::Encoded;
}

/// Trait that will transform the data to be read from the DB.
pub trait Decode: Send + Sync + Sized + Debug {
    /// Decodes data coming from the database.
    fn decode(value: &[u8]) -> Result<Self, DatabaseError>;
}

/// Generic trait that enforces the database key to implement [`Encode`] and [`Decode`].
pub trait Key: Encode + Decode + Ord + Clone {}

impl<T> Key for T where T: Encode + Decode + Ord + Clone {}

/// Generic trait that enforces the database value to implement [`Compress`] and [`Decompress`].
pub trait Value: Compress + Decompress {}

impl<T> Value for T where T: Compress + Decompress {}

/// Ordered key-value backend.
///
/// Keys are compared bytewise. Implementations must be thread-safe and must
/// apply a [`Batch`] atomically: either every operation becomes visible or
/// none does.
pub trait IndexStore: Send + Sync + 'static {
    /// Point lookup.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DatabaseError>;

    /// Check if a key exists.
    fn has(&self, key: &[u8]) -> Result<bool, DatabaseError> {
        Ok(self.get(key)?.is_some())
    }

    /// Insert or overwrite a single key.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), DatabaseError> {
        let mut batch = Batch::default();
        batch.put(key, value);
        self.write_batch(batch)
    }

    /// Delete a single key.
    ///
    /// Returns `Ok(())` even if the key didn't exist.
    fn delete(&self, key: &[u8]) -> Result<(), DatabaseError> {
        let mut batch = Batch::default();
        batch.delete(key);
        self.write_batch(batch)
    }

    /// Iterate in ascending key order, starting at the first key `>= start`.
    ///
    /// The callback receives each key and value. Return `Ok(false)` to stop
    /// iteration. The callback must not write to the same store.
    fn iterate_from<F>(&self, start: &[u8], callback: F) -> Result<(), DatabaseError>
    where
        F: FnMut(&[u8], &[u8]) -> Result<bool, DatabaseError>;

    /// Apply all operations of the batch atomically.
    fn write_batch(&self, batch: Batch) -> Result<(), DatabaseError>;
}

/// Database error type.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DatabaseError {
    /// Failed to open the database.
    #[error("failed to open the database: {0}")]
    Open(String),
    /// Failed to read a value from the database.
    #[error("failed to read a value from the database: {0}")]
    Read(String),
    /// Failed to write a batch into the database.
    #[error("failed to write into the database: {0}")]
    Write(String),
    /// Failed to commit transaction changes into the database.
    #[error("failed to commit transaction changes: {0}")]
    Commit(String),
    /// Failed to decode a key from a table.
    #[error("failed to decode a key from a table")]
    Decode,
    /// Other unspecified error.
    #[error("{0}")]
    Other(String),
}

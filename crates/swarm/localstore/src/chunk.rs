//! Content-addressed chunks.

use std::fmt;

use alloy_primitives::B256;
use bytes::Bytes;
use vertex_storage::{DatabaseError, Decode, Encode};

/// Content address of a chunk.
///
/// Derived from the payload by the caller; the store treats it as an opaque
/// 32-byte key.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkAddress(pub B256);

impl ChunkAddress {
    /// Length of an encoded address.
    pub const LEN: usize = 32;

    /// Create an address from raw bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(B256::new(bytes))
    }

    /// Borrow the raw address bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0.0
    }
}

impl From<[u8; 32]> for ChunkAddress {
    fn from(bytes: [u8; 32]) -> Self {
        Self::new(bytes)
    }
}

impl From<B256> for ChunkAddress {
    fn from(value: B256) -> Self {
        Self(value)
    }
}

impl fmt::Display for ChunkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for ChunkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkAddress({})", self.0)
    }
}

impl Encode for ChunkAddress {
    type Encoded = [u8; 32];

    fn encode(self) -> Self::Encoded {
        self.0.0
    }
}

impl Decode for ChunkAddress {
    fn decode(value: &[u8]) -> Result<Self, DatabaseError> {
        let bytes: [u8; 32] = value.try_into().map_err(|_| DatabaseError::Decode)?;
        Ok(Self::new(bytes))
    }
}

/// An immutable (address, payload) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    address: ChunkAddress,
    data: Bytes,
}

impl Chunk {
    /// Create a chunk from an address computed by the caller and its payload.
    pub fn new(address: ChunkAddress, data: impl Into<Bytes>) -> Self {
        Self {
            address,
            data: data.into(),
        }
    }

    /// The chunk's content address.
    pub fn address(&self) -> &ChunkAddress {
        &self.address
    }

    /// The chunk payload.
    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

//! Keys and values of the pull and gc indices.

use bytes::{Buf, BufMut};
use vertex_storage::{Compress, DatabaseError, Decode, Decompress, Encode};

use crate::ChunkAddress;

const SEQ_KEY_LEN: usize = 8 + ChunkAddress::LEN;

/// `(sequence, address)` key shared by the pull and gc indices.
///
/// The sequence is encoded big-endian, so bytewise order is sequence order and
/// ties cannot happen because sequences are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct SeqKey {
    pub(crate) seq: u64,
    pub(crate) address: ChunkAddress,
}

impl SeqKey {
    pub(crate) const fn new(seq: u64, address: ChunkAddress) -> Self {
        Self { seq, address }
    }

    /// The smallest key with the given sequence.
    pub(crate) const fn first_at(seq: u64) -> Self {
        Self::new(seq, ChunkAddress::new([0u8; 32]))
    }
}

impl Encode for SeqKey {
    type Encoded = [u8; SEQ_KEY_LEN];

    fn encode(self) -> Self::Encoded {
        let mut buf = [0u8; SEQ_KEY_LEN];
        let (seq, address) = buf.split_at_mut(8);
        seq.copy_from_slice(&self.seq.to_be_bytes());
        address.copy_from_slice(self.address.as_bytes());
        buf
    }
}

impl Decode for SeqKey {
    fn decode(value: &[u8]) -> Result<Self, DatabaseError> {
        if value.len() != SEQ_KEY_LEN {
            return Err(DatabaseError::Decode);
        }
        let (mut seq, address) = value.split_at(8);
        Ok(Self::new(seq.get_u64(), ChunkAddress::decode(address)?))
    }
}

/// Read a big-endian `u64`, failing on short input.
pub(super) fn read_u64(buf: &mut &[u8]) -> Result<u64, DatabaseError> {
    if buf.remaining() < 8 {
        return Err(DatabaseError::Decode);
    }
    Ok(buf.get_u64())
}

/// Pull index value. The key carries everything a sync cursor needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PullValue;

impl Compress for PullValue {
    type Compressed = Vec<u8>;

    fn compress_to_buf<B: BufMut + AsMut<[u8]>>(&self, _buf: &mut B) {}
}

impl Decompress for PullValue {
    fn decompress(_value: &[u8]) -> Result<Self, DatabaseError> {
        Ok(Self)
    }
}

/// Gc index value: the insertion sequence of the chunk's pull entry, so an
/// eviction can delete it without scanning the pull index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GcValue {
    pub(crate) pull_seq: u64,
}

impl Compress for GcValue {
    type Compressed = Vec<u8>;

    fn compress_to_buf<B: BufMut + AsMut<[u8]>>(&self, buf: &mut B) {
        buf.put_u64(self.pull_seq);
    }
}

impl Decompress for GcValue {
    fn decompress(mut value: &[u8]) -> Result<Self, DatabaseError> {
        Ok(Self {
            pull_seq: read_u64(&mut value)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_key_order_is_byte_order() {
        let address_high = ChunkAddress::new([0xff; 32]);
        let address_low = ChunkAddress::new([0x00; 32]);

        let keys = [
            SeqKey::new(1, address_high),
            SeqKey::new(2, address_low),
            SeqKey::new(256, address_low),
            SeqKey::new(u64::MAX, address_low),
        ];

        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].encode() < pair[1].encode());
        }
    }

    #[test]
    fn test_seq_key_decode() {
        let key = SeqKey::new(42, ChunkAddress::new([3; 32]));
        assert_eq!(SeqKey::decode(&key.encode()).unwrap(), key);
        assert_eq!(SeqKey::decode(&[0; 8]), Err(DatabaseError::Decode));
    }

    #[test]
    fn test_gc_value() {
        let value = GcValue { pull_seq: 99 };
        let bytes = value.compress();
        assert_eq!(bytes.len(), 8);
        assert_eq!(GcValue::decompress(&bytes).unwrap(), value);
        assert_eq!(GcValue::decompress(&[1, 2]), Err(DatabaseError::Decode));
    }
}

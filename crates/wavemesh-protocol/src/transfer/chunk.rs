//! Chunk payloads.
//!
//! ```text
//! index(2, BE) ‖ len(1) ‖ data(len) ‖ zero padding to the chunk size
//! ```

use crate::error::TransferError;

/// Bytes of each chunk payload taken by the index and length.
pub const CHUNK_HEADER_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: u16,
    pub data: Vec<u8>,
}

impl Chunk {
    /// Data bytes one chunk of `chunk_size` can carry.
    pub const fn capacity(chunk_size: usize) -> usize {
        chunk_size.saturating_sub(CHUNK_HEADER_LEN)
    }

    /// Encode into exactly `chunk_size` bytes.
    pub fn encode(&self, chunk_size: usize) -> Result<Vec<u8>, TransferError> {
        if self.data.len() > Self::capacity(chunk_size) || self.data.len() > usize::from(u8::MAX) {
            return Err(TransferError::InvalidChunk("data exceeds chunk capacity"));
        }
        let mut out = Vec::with_capacity(chunk_size);
        out.extend_from_slice(&self.index.to_be_bytes());
        out.push(self.data.len() as u8);
        out.extend_from_slice(&self.data);
        out.resize(chunk_size, 0);
        Ok(out)
    }

    /// Decode from a (decrypted, padded) chunk payload.
    pub fn decode(payload: &[u8]) -> Result<Self, TransferError> {
        if payload.len() < CHUNK_HEADER_LEN {
            return Err(TransferError::InvalidChunk("payload too short"));
        }
        let index = u16::from_be_bytes([payload[0], payload[1]]);
        let len = usize::from(payload[2]);
        let data = payload
            .get(CHUNK_HEADER_LEN..CHUNK_HEADER_LEN + len)
            .ok_or(TransferError::InvalidChunk("length exceeds payload"))?;
        Ok(Chunk {
            index,
            data: data.to_vec(),
        })
    }
}

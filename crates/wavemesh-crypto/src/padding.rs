//! Deterministic zero padding to the cipher block boundary.
//!
//! The payload size of every frame is implied by its packet class, so no
//! length marker is carried: both ends pad with zero bytes and the
//! application layer interprets trailing zeros itself.

extern crate alloc;
use alloc::vec::Vec;

use crate::xtea::BLOCK_SIZE;

/// Length of `len` bytes after padding to the next block boundary.
pub const fn padded_len(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

/// Pad `data` with zero bytes up to the next multiple of the block size.
///
/// Already-aligned input (including the empty slice) is returned unchanged.
#[must_use]
pub fn zero_pad(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(padded_len(data.len()));
    out.extend_from_slice(data);
    out.resize(padded_len(data.len()), 0);
    out
}

/// Pad `data` with zero bytes to exactly `len` bytes.
///
/// Returns `None` if `data` is already longer than `len`.
#[must_use]
pub fn zero_pad_to(data: &[u8], len: usize) -> Option<Vec<u8>> {
    if data.len() > len {
        return None;
    }
    let mut out = Vec::with_capacity(len);
    out.extend_from_slice(data);
    out.resize(len, 0);
    Some(out)
}

//! Nibble-to-symbol line code.
//!
//! Every nibble becomes one byte with exactly four one bits and no run of
//! more than two equal bits, also across the boundary between consecutive
//! symbols. The radio therefore sees a DC-balanced stream with frequent
//! transitions, and any single bit flip turns a symbol into a byte outside
//! the table.

extern crate alloc;
use alloc::vec::Vec;

use crate::error::CodecError;

/// Symbol for each nibble value.
pub const SYMBOLS: [u8; 16] = [
    0x4D, 0x56, 0x59, 0x5A, 0x65, 0x66, 0x69, 0x6A, 0x95, 0x96, 0x99, 0x9A, 0xA5, 0xA6, 0xA9, 0xB2,
];

const NOT_A_SYMBOL: u8 = 0xFF;

const DECODE: [u8; 256] = {
    let mut table = [NOT_A_SYMBOL; 256];
    let mut nibble = 0;
    while nibble < SYMBOLS.len() {
        table[SYMBOLS[nibble] as usize] = nibble as u8;
        nibble += 1;
    }
    table
};

/// Map a single symbol byte back to its nibble.
pub fn decode_symbol(byte: u8) -> Option<u8> {
    match DECODE[byte as usize] {
        NOT_A_SYMBOL => None,
        nibble => Some(nibble),
    }
}

/// Append the symbols for `raw` to `out`, high nibble first.
pub fn encode_into(raw: &[u8], out: &mut Vec<u8>) {
    out.reserve(raw.len() * 2);
    for &byte in raw {
        out.push(SYMBOLS[(byte >> 4) as usize]);
        out.push(SYMBOLS[(byte & 0x0F) as usize]);
    }
}

/// Encode `raw` into twice as many symbol bytes.
#[must_use]
pub fn encode(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() * 2);
    encode_into(raw, &mut out);
    out
}

/// Decode a symbol stream.
///
/// The reported offset is relative to the start of `encoded`.
pub fn decode(encoded: &[u8]) -> Result<Vec<u8>, CodecError> {
    if encoded.len() % 2 != 0 {
        return Err(CodecError::OddLength(encoded.len()));
    }
    let mut out = Vec::with_capacity(encoded.len() / 2);
    for (pair_index, pair) in encoded.chunks_exact(2).enumerate() {
        let offset = pair_index * 2;
        let hi = decode_symbol(pair[0]).ok_or(CodecError::InvalidSymbol {
            offset,
            byte: pair[0],
        })?;
        let lo = decode_symbol(pair[1]).ok_or(CodecError::InvalidSymbol {
            offset: offset + 1,
            byte: pair[1],
        })?;
        out.push((hi << 4) | lo);
    }
    Ok(out)
}

//! CRC-32 check sequences.
//!
//! The header and the payload each carry their own CRC-32 (ISO-HDLC
//! polynomial, reflected, init and final xor `0xFFFFFFFF`), appended
//! big-endian after the payload.

pub use crate::constants::CRC_LEN;

/// Compute the check sequence over `bytes`.
pub fn crc(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// Check `bytes` against an expected check sequence.
pub fn verify_crc(bytes: &[u8], expected: u32) -> bool {
    crc(bytes) == expected
}

//! Wire codec: constant-weight symbol mapping and check sequences.

pub mod crc;
pub mod symbol;

pub use crc::{crc, verify_crc};
pub use symbol::{decode, encode};

//! Test vector loading infrastructure for wavemesh.
//!
//! Each module corresponds to a single JSON file under `vectors/` and provides
//! typed structs matching its schema plus a `load()` function that
//! deserializes the embedded JSON via `include_str!`.
//!
//! # Usage
//!
//! ```rust
//! let vectors = wavemesh_test_vectors::crc::load();
//! for v in &vectors.vectors {
//!     let input = hex::decode(&v.input).unwrap();
//!     // ... compare against v.crc
//!     # let _ = input;
//! }
//! ```

pub mod cipher;
pub mod crc;
pub mod frames;
pub mod symbols;

pub use cipher::CipherVectors;
pub use crc::CrcVectors;
pub use frames::FramesVectors;
pub use symbols::SymbolsVectors;

//! Cipher envelope for the wavemesh radio stack.
//!
//! Every application payload on the air is enciphered with XTEA in a
//! chained block mode under one of a small set of key slots. This crate holds
//! the block cipher, the deterministic padding rule, and the keyed envelope
//! used by the frame layer.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod envelope;
pub mod error;
pub mod padding;
pub mod xtea;

pub use envelope::{CipherKey, KeySet, KeySlot};
pub use error::CryptoError;
pub use xtea::Xtea;

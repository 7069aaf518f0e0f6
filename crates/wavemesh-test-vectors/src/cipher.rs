//! Test vector types for cipher.json
//!
//! Single-block XTEA vectors and chained, zero-padded envelope vectors.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct BlockVector {
    pub key: String,
    pub plaintext: String,
    pub ciphertext: String,
}

#[derive(Debug, Deserialize)]
pub struct EnvelopeVector {
    pub description: String,
    /// One of `network`, `stream`, `access`.
    pub key_slot: String,
    pub key: String,
    pub payload: String,
    pub ciphertext: String,
}

#[derive(Debug, Deserialize)]
pub struct CipherVectors {
    pub description: String,
    pub rounds: u64,
    pub delta: String,
    pub block_vectors: Vec<BlockVector>,
    pub envelope_vectors: Vec<EnvelopeVector>,
}

pub fn load() -> CipherVectors {
    let json = include_str!("../vectors/cipher.json");
    serde_json::from_str(json).expect("Failed to deserialize cipher.json")
}

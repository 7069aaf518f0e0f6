//! Test vector types for crc.json

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CrcVector {
    pub input: String,
    /// Eight hex digits, big-endian.
    pub crc: String,
}

#[derive(Debug, Deserialize)]
pub struct CrcVectors {
    pub description: String,
    pub vectors: Vec<CrcVector>,
}

pub fn load() -> CrcVectors {
    let json = include_str!("../vectors/crc.json");
    serde_json::from_str(json).expect("Failed to deserialize crc.json")
}

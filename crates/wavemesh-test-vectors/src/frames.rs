//! Test vector types for frames.json
//!
//! Complete on-air frames: header fields, plaintext and ciphered payload,
//! both check sequences, and the final encoded byte stream.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct FrameKeys {
    pub network: String,
    pub stream: String,
    pub access: String,
}

#[derive(Debug, Deserialize)]
pub struct FrameVector {
    pub description: String,
    pub packet_class: String,
    pub encryption: String,
    pub pid: String,
    pub nid: u64,
    pub src: u64,
    pub dst: u64,
    pub message_id: u64,
    pub hops: Option<u64>,
    /// Plaintext payload before padding and encryption.
    pub payload: String,
    pub key: Option<String>,
    pub raw_header: String,
    pub ciphertext: String,
    pub header_crc: String,
    pub payload_crc: String,
    pub wire: String,
}

#[derive(Debug, Deserialize)]
pub struct FramesVectors {
    pub description: String,
    pub preamble: String,
    pub start_of_frame: String,
    pub keys: FrameKeys,
    pub vectors: Vec<FrameVector>,
}

pub fn load() -> FramesVectors {
    let json = include_str!("../vectors/frames.json");
    serde_json::from_str(json).expect("Failed to deserialize frames.json")
}

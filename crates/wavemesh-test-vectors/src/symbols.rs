//! Test vector types for symbols.json
//!
//! Constant-weight nibble symbol table and raw/encoded byte pairs.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SymbolVector {
    pub raw: String,
    pub encoded: String,
}

#[derive(Debug, Deserialize)]
pub struct SymbolsVectors {
    pub description: String,
    /// Sixteen hex bytes, indexed by nibble value.
    pub symbol_table: Vec<String>,
    /// Bytes that must never decode.
    pub invalid_symbols: Vec<String>,
    pub vectors: Vec<SymbolVector>,
}

pub fn load() -> SymbolsVectors {
    let json = include_str!("../vectors/symbols.json");
    serde_json::from_str(json).expect("Failed to deserialize symbols.json")
}

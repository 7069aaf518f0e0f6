//! Keyed payload envelope.
//!
//! Payloads are zero-padded to the block boundary and enciphered with XTEA in
//! CBC mode under an all-zero IV. Decryption never fails: a trailing partial
//! block is zero-extended, so the output is always block-aligned and garbage
//! in means garbage out. Integrity is the frame layer's check sequence, not
//! the cipher's.

extern crate alloc;
use alloc::vec::Vec;
use core::fmt;

use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::padding::zero_pad;
use crate::xtea::{BLOCK_SIZE, KEY_SIZE, Xtea};
use crate::CryptoError;

type XteaCbcEnc = cbc::Encryptor<Xtea>;
type XteaCbcDec = cbc::Decryptor<Xtea>;

const ZERO_IV: [u8; BLOCK_SIZE] = [0; BLOCK_SIZE];

/// Which stored key enciphers a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySlot {
    /// Shared by every admitted device of the network.
    Network,
    /// Used for stream transfers.
    Stream,
    /// Installation key for admission exchanges before a device knows the
    /// network key.
    Access,
}

impl fmt::Display for KeySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySlot::Network => f.write_str("network"),
            KeySlot::Stream => f.write_str("stream"),
            KeySlot::Access => f.write_str("access"),
        }
    }
}

/// A 16-byte cipher key. `Debug` never prints the key material.
#[derive(Clone, PartialEq, Eq)]
pub struct CipherKey([u8; KEY_SIZE]);

impl CipherKey {
    pub const fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl TryFrom<&[u8]> for CipherKey {
    type Error = CryptoError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CipherKey(..)")
    }
}

/// Encrypt `payload` under `key`.
#[must_use]
pub fn encrypt(key: &CipherKey, payload: &[u8]) -> Vec<u8> {
    let mut out = zero_pad(payload);
    let mut encryptor = XteaCbcEnc::new(key.as_bytes().into(), &ZERO_IV.into());
    for block in out.chunks_exact_mut(BLOCK_SIZE) {
        encryptor.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
    out
}

/// Decrypt `ciphertext` under `key`.
#[must_use]
pub fn decrypt(key: &CipherKey, ciphertext: &[u8]) -> Vec<u8> {
    // A truncated final block is zero-extended and deciphered like any other.
    let mut out = zero_pad(ciphertext);
    let mut decryptor = XteaCbcDec::new(key.as_bytes().into(), &ZERO_IV.into());
    for block in out.chunks_exact_mut(BLOCK_SIZE) {
        decryptor.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }
    out
}

/// The keys a device currently holds, one per slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    network: Option<CipherKey>,
    stream: Option<CipherKey>,
    access: Option<CipherKey>,
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, slot: KeySlot, key: CipherKey) -> Self {
        self.set(slot, key);
        self
    }

    pub fn set(&mut self, slot: KeySlot, key: CipherKey) {
        *self.slot_mut(slot) = Some(key);
    }

    pub fn clear(&mut self, slot: KeySlot) {
        *self.slot_mut(slot) = None;
    }

    pub fn get(&self, slot: KeySlot) -> Option<&CipherKey> {
        match slot {
            KeySlot::Network => self.network.as_ref(),
            KeySlot::Stream => self.stream.as_ref(),
            KeySlot::Access => self.access.as_ref(),
        }
    }

    pub fn has(&self, slot: KeySlot) -> bool {
        self.get(slot).is_some()
    }

    /// Encrypt `payload` with the key in `slot`.
    pub fn encrypt(&self, payload: &[u8], slot: KeySlot) -> Result<Vec<u8>, CryptoError> {
        let key = self.get(slot).ok_or(CryptoError::MissingKey(slot))?;
        Ok(encrypt(key, payload))
    }

    /// Decrypt `ciphertext` with the key in `slot`.
    ///
    /// Fails only when the slot is empty.
    pub fn decrypt(&self, ciphertext: &[u8], slot: KeySlot) -> Result<Vec<u8>, CryptoError> {
        let key = self.get(slot).ok_or(CryptoError::MissingKey(slot))?;
        Ok(decrypt(key, ciphertext))
    }

    fn slot_mut(&mut self, slot: KeySlot) -> &mut Option<CipherKey> {
        match slot {
            KeySlot::Network => &mut self.network,
            KeySlot::Stream => &mut self.stream,
            KeySlot::Access => &mut self.access,
        }
    }
}

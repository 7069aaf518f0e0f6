//! XTEA block cipher.
//!
//! 64-bit blocks, 128-bit key, 32 cycles (64 Feistel rounds). Words are read
//! and written big-endian, matching the byte order used everywhere else on
//! the wire.
//!
//! [`Xtea`] also implements the `cipher` block traits so it can be driven by
//! the `cbc` mode types.

use cipher::consts::{U1, U8, U16};
use cipher::inout::InOut;
use cipher::{
    Block, BlockBackend, BlockCipher, BlockClosure, BlockDecrypt, BlockEncrypt, BlockSizeUser, Key,
    KeyInit, KeySizeUser, ParBlocksSizeUser,
};

use crate::CryptoError;

/// Block size in bytes.
pub const BLOCK_SIZE: usize = 8;

/// Key size in bytes.
pub const KEY_SIZE: usize = 16;

/// Number of cycles; each cycle is two Feistel rounds.
pub const CYCLES: u32 = 32;

/// Key schedule constant.
pub const DELTA: u32 = 0x9E37_79B9;

/// An expanded XTEA key.
#[derive(Clone)]
pub struct Xtea {
    key: [u32; 4],
}

impl Xtea {
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        let mut words = [0u32; 4];
        for (word, chunk) in words.iter_mut().zip(key.chunks_exact(4)) {
            *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self { key: words }
    }

    /// Build from an arbitrary slice, checking its length.
    pub fn from_slice(key: &[u8]) -> Result<Self, CryptoError> {
        let key: &[u8; KEY_SIZE] = key.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: key.len(),
        })?;
        Ok(Self::new(key))
    }

    pub fn encrypt_block(&self, block: &mut [u8; BLOCK_SIZE]) {
        let (mut v0, mut v1) = split(block);
        let mut sum: u32 = 0;
        for _ in 0..CYCLES {
            v0 = v0.wrapping_add(
                (((v1 << 4) ^ (v1 >> 5)).wrapping_add(v1))
                    ^ sum.wrapping_add(self.key[(sum & 3) as usize]),
            );
            sum = sum.wrapping_add(DELTA);
            v1 = v1.wrapping_add(
                (((v0 << 4) ^ (v0 >> 5)).wrapping_add(v0))
                    ^ sum.wrapping_add(self.key[((sum >> 11) & 3) as usize]),
            );
        }
        join(block, v0, v1);
    }

    pub fn decrypt_block(&self, block: &mut [u8; BLOCK_SIZE]) {
        let (mut v0, mut v1) = split(block);
        let mut sum: u32 = DELTA.wrapping_mul(CYCLES);
        for _ in 0..CYCLES {
            v1 = v1.wrapping_sub(
                (((v0 << 4) ^ (v0 >> 5)).wrapping_add(v0))
                    ^ sum.wrapping_add(self.key[((sum >> 11) & 3) as usize]),
            );
            sum = sum.wrapping_sub(DELTA);
            v0 = v0.wrapping_sub(
                (((v1 << 4) ^ (v1 >> 5)).wrapping_add(v1))
                    ^ sum.wrapping_add(self.key[(sum & 3) as usize]),
            );
        }
        join(block, v0, v1);
    }
}

impl core::fmt::Debug for Xtea {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Xtea(..)")
    }
}

impl KeySizeUser for Xtea {
    type KeySize = U16;
}

impl BlockSizeUser for Xtea {
    type BlockSize = U8;
}

impl BlockCipher for Xtea {}

impl KeyInit for Xtea {
    fn new(key: &Key<Self>) -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(key);
        Xtea::new(&bytes)
    }
}

impl BlockEncrypt for Xtea {
    fn encrypt_with_backend(&self, f: impl BlockClosure<BlockSize = U8>) {
        f.call(&mut Backend {
            cipher: self,
            encrypt: true,
        });
    }
}

impl BlockDecrypt for Xtea {
    fn decrypt_with_backend(&self, f: impl BlockClosure<BlockSize = U8>) {
        f.call(&mut Backend {
            cipher: self,
            encrypt: false,
        });
    }
}

/// One block at a time, in either direction.
struct Backend<'a> {
    cipher: &'a Xtea,
    encrypt: bool,
}

impl BlockSizeUser for Backend<'_> {
    type BlockSize = U8;
}

impl ParBlocksSizeUser for Backend<'_> {
    type ParBlocksSize = U1;
}

impl BlockBackend for Backend<'_> {
    fn proc_block(&mut self, mut block: InOut<'_, '_, Block<Self>>) {
        let mut work = [0u8; BLOCK_SIZE];
        work.copy_from_slice(block.get_in());
        if self.encrypt {
            self.cipher.encrypt_block(&mut work);
        } else {
            self.cipher.decrypt_block(&mut work);
        }
        block.get_out().copy_from_slice(&work);
    }
}

fn split(block: &[u8; BLOCK_SIZE]) -> (u32, u32) {
    (
        u32::from_be_bytes([block[0], block[1], block[2], block[3]]),
        u32::from_be_bytes([block[4], block[5], block[6], block[7]]),
    )
}

fn join(block: &mut [u8; BLOCK_SIZE], v0: u32, v1: u32) {
    block[..4].copy_from_slice(&v0.to_be_bytes());
    block[4..].copy_from_slice(&v1.to_be_bytes());
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn block_decrypt_inverts_encrypt(key in any::<[u8; 16]>(), block in any::<[u8; 8]>()) {
            let cipher = Xtea::new(&key);
            let mut work = block;
            cipher.encrypt_block(&mut work);
            cipher.decrypt_block(&mut work);
            prop_assert_eq!(work, block);
        }
    }
}

use core::fmt;

use crate::envelope::KeySlot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    InvalidKeyLength { expected: usize, actual: usize },
    MissingKey(KeySlot),
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::InvalidKeyLength { expected, actual } => {
                write!(f, "invalid key length: expected {expected}, got {actual}")
            }
            CryptoError::MissingKey(slot) => write!(f, "no key loaded in {slot} slot"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CryptoError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_error_display_all_variants() {
        let variants = [
            CryptoError::InvalidKeyLength {
                expected: 16,
                actual: 7,
            },
            CryptoError::MissingKey(KeySlot::Stream),
        ];
        for variant in &variants {
            let msg = variant.to_string();
            assert!(!msg.is_empty(), "{variant:?} should have non-empty Display");
        }
        assert_eq!(
            CryptoError::MissingKey(KeySlot::Network).to_string(),
            "no key loaded in network slot"
        );
    }
}

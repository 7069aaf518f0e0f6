//! Error types for the wavemesh-core crate.

use core::fmt;

use wavemesh_crypto::CryptoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    OddLength(usize),
    InvalidSymbol { offset: usize, byte: u8 },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::OddLength(len) => write!(f, "odd encoded length: {len}"),
            CodecError::InvalidSymbol { offset, byte } => {
                write!(f, "invalid symbol 0x{byte:02x} at offset {offset}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CodecError {}

/// Which check sequence failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSection {
    Header,
    Payload,
}

impl fmt::Display for FrameSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameSection::Header => f.write_str("header"),
            FrameSection::Payload => f.write_str("payload"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    Malformed(&'static str),
    InvalidSymbol { offset: usize, byte: u8 },
    CorruptCrc { section: FrameSection },
    Crypto(CryptoError),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Malformed(reason) => write!(f, "malformed frame: {reason}"),
            FrameError::InvalidSymbol { offset, byte } => {
                write!(f, "invalid symbol 0x{byte:02x} at offset {offset}")
            }
            FrameError::CorruptCrc { section } => write!(f, "{section} crc mismatch"),
            FrameError::Crypto(e) => write!(f, "crypto error: {e}"),
        }
    }
}

impl From<CryptoError> for FrameError {
    fn from(e: CryptoError) -> Self {
        FrameError::Crypto(e)
    }
}

impl From<CodecError> for FrameError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::OddLength(_) => FrameError::Malformed("odd symbol stream length"),
            CodecError::InvalidSymbol { offset, byte } => FrameError::InvalidSymbol { offset, byte },
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FrameError {}

#[cfg(test)]
mod tests {
    use super::*;
    use wavemesh_crypto::KeySlot;

    #[test]
    fn test_frame_error_display_all_variants() {
        let variants = [
            FrameError::Malformed("too short"),
            FrameError::InvalidSymbol {
                offset: 9,
                byte: 0xff,
            },
            FrameError::CorruptCrc {
                section: FrameSection::Payload,
            },
            FrameError::Crypto(CryptoError::MissingKey(KeySlot::Network)),
        ];
        for variant in &variants {
            assert!(!variant.to_string().is_empty(), "{variant:?}");
        }
        assert_eq!(
            FrameError::CorruptCrc {
                section: FrameSection::Header
            }
            .to_string(),
            "header crc mismatch"
        );
    }

    #[test]
    fn test_codec_error_conversion() {
        assert_eq!(
            FrameError::from(CodecError::InvalidSymbol {
                offset: 4,
                byte: 0x00
            }),
            FrameError::InvalidSymbol {
                offset: 4,
                byte: 0x00
            }
        );
        assert!(matches!(
            FrameError::from(CodecError::OddLength(3)),
            FrameError::Malformed(_)
        ));
    }
}

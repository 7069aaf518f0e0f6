//! Frame geometry and packet-class enumerations.

use crate::error::FrameError;

/// Raw bytes sent before the first symbol so the receiver can lock on.
pub const PREAMBLE: [u8; 4] = [0xAA; 4];
/// Start-of-frame marker, symbol-encoded on the air.
pub const START_OF_FRAME: u8 = 0xD3;

/// `pid ‖ nid(2) ‖ src ‖ dst ‖ message_id`
pub const HEADER_LEN: usize = 6;
/// Header plus the trailing hop byte.
pub const MULTI_HOP_HEADER_LEN: usize = HEADER_LEN + 1;
/// One CRC-32, big-endian.
pub const CRC_LEN: usize = 4;

pub const SINGLE_PAYLOAD_LEN: usize = 16;
pub const ADMIN_PAYLOAD_LEN: usize = 32;
pub const CONTROL_PAYLOAD_LEN: usize = 16;
pub const ACK_PAYLOAD_LEN: usize = 8;
/// Smallest block/stream chunk frame payload.
pub const MIN_CHUNK_PAYLOAD_LEN: usize = 8;
/// Largest block/stream chunk frame payload.
pub const MAX_CHUNK_PAYLOAD_LEN: usize = 64;
/// Chunk payloads are whole cipher blocks.
pub const CHUNK_GRANULE: usize = 8;

/// Raw (pre-symbol) length of the shortest possible frame body.
pub const MIN_RAW_LEN: usize = 1 + HEADER_LEN + ACK_PAYLOAD_LEN + 2 * CRC_LEN;
/// Raw (pre-symbol) length of the longest possible frame body.
pub const MAX_RAW_LEN: usize = 1 + MULTI_HOP_HEADER_LEN + MAX_CHUNK_PAYLOAD_LEN + 2 * CRC_LEN;
/// Shortest on-air frame.
pub const MIN_FRAME_LEN: usize = PREAMBLE.len() + 2 * MIN_RAW_LEN;
/// Longest on-air frame.
pub const MAX_FRAME_LEN: usize = PREAMBLE.len() + 2 * MAX_RAW_LEN;

/// Packet class, PID bits 0-2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketClass {
    Single = 0,
    Block = 1,
    Stream = 2,
    Admin = 3,
    Ack = 4,
    Control = 5,
}

impl PacketClass {
    pub fn from_u8(v: u8) -> Result<Self, FrameError> {
        match v {
            0 => Ok(PacketClass::Single),
            1 => Ok(PacketClass::Block),
            2 => Ok(PacketClass::Stream),
            3 => Ok(PacketClass::Admin),
            4 => Ok(PacketClass::Ack),
            5 => Ok(PacketClass::Control),
            _ => Err(FrameError::Malformed("unknown packet class")),
        }
    }

    /// Exact payload length for fixed-size classes, `None` for chunk classes.
    pub const fn fixed_payload_len(self) -> Option<usize> {
        match self {
            PacketClass::Single => Some(SINGLE_PAYLOAD_LEN),
            PacketClass::Admin => Some(ADMIN_PAYLOAD_LEN),
            PacketClass::Control => Some(CONTROL_PAYLOAD_LEN),
            PacketClass::Ack => Some(ACK_PAYLOAD_LEN),
            PacketClass::Block | PacketClass::Stream => None,
        }
    }

    /// Whether a payload of `len` bytes is legal on the air for this class.
    pub const fn permits_payload_len(self, len: usize) -> bool {
        match self.fixed_payload_len() {
            Some(fixed) => len == fixed,
            None => is_valid_chunk_len(len),
        }
    }

    /// Block and stream frames carry transfer chunks.
    pub const fn is_chunked(self) -> bool {
        matches!(self, PacketClass::Block | PacketClass::Stream)
    }
}

/// True for a legal block/stream chunk frame payload length.
pub const fn is_valid_chunk_len(len: usize) -> bool {
    len >= MIN_CHUNK_PAYLOAD_LEN && len <= MAX_CHUNK_PAYLOAD_LEN && len % CHUNK_GRANULE == 0
}

/// Payload encryption method, PID bits 4-5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Encryption {
    None = 0,
    Network = 1,
    Stream = 2,
    Access = 3,
}

impl Encryption {
    pub fn from_u8(v: u8) -> Result<Self, FrameError> {
        match v {
            0 => Ok(Encryption::None),
            1 => Ok(Encryption::Network),
            2 => Ok(Encryption::Stream),
            3 => Ok(Encryption::Access),
            _ => Err(FrameError::Malformed("unknown encryption method")),
        }
    }

    /// Key slot for this method, or `None` for plaintext.
    pub const fn key_slot(self) -> Option<wavemesh_crypto::KeySlot> {
        match self {
            Encryption::None => None,
            Encryption::Network => Some(wavemesh_crypto::KeySlot::Network),
            Encryption::Stream => Some(wavemesh_crypto::KeySlot::Stream),
            Encryption::Access => Some(wavemesh_crypto::KeySlot::Access),
        }
    }
}

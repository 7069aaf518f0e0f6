//! Acknowledgment payloads.
//!
//! ```text
//! status(1) ‖ reason(1) ‖ value(2, BE) ‖ reserved(4)
//! ```
//!
//! `status` is 0 for ACK and 1 for NACK. For an ACK the reason byte is zero
//! and `value` is an optional application value. For a NACK `value`
//! qualifies the reason, e.g. the chunk size the receiver wants.

use crate::constants::ACK_PAYLOAD_LEN;
use crate::error::FrameError;

const STATUS_ACK: u8 = 0;
const STATUS_NACK: u8 = 1;

/// Why a receiver refused a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NackReason {
    Generic = 0x00,
    Busy = 0x01,
    Unsupported = 0x02,
    /// The receiver wants a different chunk size; `value` carries it.
    InvalidChunkSize = 0x03,
    /// The receiver moves to another channel; `value` carries it.
    ChannelChange = 0x04,
    /// The receiver wants another data rate; `value` carries it.
    DataRateChange = 0x05,
    AdmissionClosed = 0x06,
    NotJoined = 0x07,
    UnknownTransfer = 0x08,
    OutOfSequence = 0x09,
}

impl NackReason {
    pub fn from_u8(v: u8) -> Result<Self, FrameError> {
        match v {
            0x00 => Ok(NackReason::Generic),
            0x01 => Ok(NackReason::Busy),
            0x02 => Ok(NackReason::Unsupported),
            0x03 => Ok(NackReason::InvalidChunkSize),
            0x04 => Ok(NackReason::ChannelChange),
            0x05 => Ok(NackReason::DataRateChange),
            0x06 => Ok(NackReason::AdmissionClosed),
            0x07 => Ok(NackReason::NotJoined),
            0x08 => Ok(NackReason::UnknownTransfer),
            0x09 => Ok(NackReason::OutOfSequence),
            _ => Err(FrameError::Malformed("unknown nack reason")),
        }
    }

    /// Fatality before the application gets a say.
    pub const fn is_fatal_by_default(self) -> bool {
        matches!(
            self,
            NackReason::Unsupported
                | NackReason::AdmissionClosed
                | NackReason::NotJoined
                | NackReason::UnknownTransfer
        )
    }

    /// Reasons that ask the sender to change transfer parameters.
    pub const fn is_adjustment(self) -> bool {
        matches!(
            self,
            NackReason::InvalidChunkSize | NackReason::ChannelChange | NackReason::DataRateChange
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckDescriptor {
    Ack { value: Option<u16> },
    Nack { reason: NackReason, value: u16 },
}

impl AckDescriptor {
    pub const fn ack() -> Self {
        AckDescriptor::Ack { value: None }
    }

    pub const fn ack_with(value: u16) -> Self {
        AckDescriptor::Ack { value: Some(value) }
    }

    pub const fn nack(reason: NackReason) -> Self {
        AckDescriptor::Nack { reason, value: 0 }
    }

    pub const fn is_ack(&self) -> bool {
        matches!(self, AckDescriptor::Ack { .. })
    }

    pub fn to_bytes(&self) -> [u8; ACK_PAYLOAD_LEN] {
        let mut out = [0u8; ACK_PAYLOAD_LEN];
        match *self {
            AckDescriptor::Ack { value } => {
                out[0] = STATUS_ACK;
                // An ACK value of zero and no value are the same on the air.
                out[2..4].copy_from_slice(&value.unwrap_or(0).to_be_bytes());
            }
            AckDescriptor::Nack { reason, value } => {
                out[0] = STATUS_NACK;
                out[1] = reason as u8;
                out[2..4].copy_from_slice(&value.to_be_bytes());
            }
        }
        out
    }

    /// Parse from a (padded) ACK frame payload. Reserved bytes are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < 4 {
            return Err(FrameError::Malformed("ack payload too short"));
        }
        let value = u16::from_be_bytes([bytes[2], bytes[3]]);
        match bytes[0] {
            STATUS_ACK => Ok(AckDescriptor::Ack {
                value: (value != 0).then_some(value),
            }),
            STATUS_NACK => Ok(AckDescriptor::Nack {
                reason: NackReason::from_u8(bytes[1])?,
                value,
            }),
            _ => Err(FrameError::Malformed("unknown ack status")),
        }
    }
}

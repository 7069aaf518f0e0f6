//! Transfer control payloads, carried in 16-byte `Control` frames.
//!
//! ```text
//! Start:    01 ‖ transfer ‖ kind ‖ chunk_size ‖ total_len(4, BE) ‖ src_unit ‖ dst_unit ‖ pattern
//! Complete: 02 ‖ transfer ‖ total_len(4, BE) ‖ chunk_count(2, BE)
//! Abort:    03 ‖ transfer ‖ reason
//! ```
//!
//! Streams announce a total length of zero.

use wavemesh_core::constants::CONTROL_PAYLOAD_LEN;
use wavemesh_core::{NackReason, Pattern, UnitId};

use super::{TransferId, TransferKind};
use crate::error::TransferError;

const OP_START: u8 = 0x01;
const OP_COMPLETE: u8 = 0x02;
const OP_ABORT: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartControl {
    pub transfer: TransferId,
    pub kind: TransferKind,
    pub chunk_size: u8,
    pub total_len: u32,
    pub src_unit: UnitId,
    pub dst_unit: UnitId,
    pub pattern: Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Start(StartControl),
    Complete {
        transfer: TransferId,
        total_len: u32,
        chunk_count: u16,
    },
    Abort {
        transfer: TransferId,
        reason: NackReason,
    },
}

impl Control {
    pub fn transfer(&self) -> TransferId {
        match self {
            Control::Start(start) => start.transfer,
            Control::Complete { transfer, .. } | Control::Abort { transfer, .. } => *transfer,
        }
    }

    pub fn to_bytes(&self) -> [u8; CONTROL_PAYLOAD_LEN] {
        let mut out = [0u8; CONTROL_PAYLOAD_LEN];
        match *self {
            Control::Start(s) => {
                out[0] = OP_START;
                out[1] = s.transfer.0;
                out[2] = s.kind.to_byte();
                out[3] = s.chunk_size;
                out[4..8].copy_from_slice(&s.total_len.to_be_bytes());
                out[8] = s.src_unit.0;
                out[9] = s.dst_unit.0;
                out[10] = s.pattern.0;
            }
            Control::Complete {
                transfer,
                total_len,
                chunk_count,
            } => {
                out[0] = OP_COMPLETE;
                out[1] = transfer.0;
                out[2..6].copy_from_slice(&total_len.to_be_bytes());
                out[6..8].copy_from_slice(&chunk_count.to_be_bytes());
            }
            Control::Abort { transfer, reason } => {
                out[0] = OP_ABORT;
                out[1] = transfer.0;
                out[2] = reason as u8;
            }
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransferError> {
        if bytes.len() < 11 {
            return Err(TransferError::InvalidControl("payload too short"));
        }
        let transfer = TransferId(bytes[1]);
        match bytes[0] {
            OP_START => Ok(Control::Start(StartControl {
                transfer,
                kind: TransferKind::from_byte(bytes[2])
                    .ok_or(TransferError::InvalidControl("unknown transfer kind"))?,
                chunk_size: bytes[3],
                total_len: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
                src_unit: UnitId(bytes[8]),
                dst_unit: UnitId(bytes[9]),
                pattern: Pattern(bytes[10]),
            })),
            OP_COMPLETE => Ok(Control::Complete {
                transfer,
                total_len: u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
                chunk_count: u16::from_be_bytes([bytes[6], bytes[7]]),
            }),
            OP_ABORT => Ok(Control::Abort {
                transfer,
                reason: NackReason::from_u8(bytes[2])
                    .map_err(|_| TransferError::InvalidControl("unknown abort reason"))?,
            }),
            _ => Err(TransferError::InvalidControl("unknown opcode")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_layout() {
        let start = Control::Start(StartControl {
            transfer: TransferId(9),
            kind: TransferKind::Block,
            chunk_size: 32,
            total_len: 0x0000_0150,
            src_unit: UnitId(1),
            dst_unit: UnitId(2),
            pattern: Pattern(3),
        });
        let bytes = start.to_bytes();
        assert_eq!(hex::encode(bytes), "01090120000001500102030000000000");
        assert_eq!(Control::from_bytes(&bytes).unwrap(), start);
        assert_eq!(start.transfer(), TransferId(9));
    }

    #[test]
    fn test_complete_and_abort_parse() {
        let complete = Control::Complete {
            transfer: TransferId(1),
            total_len: 100,
            chunk_count: 4,
        };
        assert_eq!(Control::from_bytes(&complete.to_bytes()).unwrap(), complete);

        let abort = Control::Abort {
            transfer: TransferId(2),
            reason: NackReason::Generic,
        };
        assert_eq!(Control::from_bytes(&abort.to_bytes()).unwrap(), abort);
    }

    #[test]
    fn test_rejects_unknown_opcode_and_kind() {
        let mut bytes = [0u8; CONTROL_PAYLOAD_LEN];
        assert!(Control::from_bytes(&bytes).is_err());
        bytes[0] = OP_START;
        bytes[2] = 7;
        assert_eq!(
            Control::from_bytes(&bytes),
            Err(TransferError::InvalidControl("unknown transfer kind"))
        );
        assert!(Control::from_bytes(&bytes[..4]).is_err());
    }
}

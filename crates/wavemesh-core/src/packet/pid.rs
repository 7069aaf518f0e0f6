//! Packet identifier byte.
//!
//! ```text
//! Bit 7: multi-hop (a hop byte follows the message id)
//! Bit 6: reserved
//! Bits 5-4: encryption (0=NONE, 1=NETWORK, 2=STREAM, 3=ACCESS)
//! Bit 3: reserved
//! Bits 2-0: packet class (0=SINGLE, 1=BLOCK, 2=STREAM, 3=ADMIN, 4=ACK, 5=CONTROL)
//! ```
//!
//! Reserved bits are ignored on parse and always written as zero.

use crate::constants::{Encryption, HEADER_LEN, MULTI_HOP_HEADER_LEN, PacketClass};
use crate::error::FrameError;

const CLASS_MASK: u8 = 0x07;
const ENCRYPTION_SHIFT: u8 = 4;
const ENCRYPTION_MASK: u8 = 0x03;
const MULTI_HOP_BIT: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid {
    pub class: PacketClass,
    pub encryption: Encryption,
    pub multi_hop: bool,
}

impl Pid {
    pub const fn new(class: PacketClass, encryption: Encryption) -> Self {
        Self {
            class,
            encryption,
            multi_hop: false,
        }
    }

    #[must_use]
    pub const fn with_multi_hop(mut self, multi_hop: bool) -> Self {
        self.multi_hop = multi_hop;
        self
    }

    pub fn from_byte(byte: u8) -> Result<Self, FrameError> {
        let class = PacketClass::from_u8(byte & CLASS_MASK)?;
        let encryption = Encryption::from_u8((byte >> ENCRYPTION_SHIFT) & ENCRYPTION_MASK)?;
        Ok(Pid {
            class,
            encryption,
            multi_hop: byte & MULTI_HOP_BIT != 0,
        })
    }

    pub const fn to_byte(self) -> u8 {
        (self.class as u8)
            | ((self.encryption as u8) << ENCRYPTION_SHIFT)
            | if self.multi_hop { MULTI_HOP_BIT } else { 0 }
    }

    /// Raw header length implied by this PID.
    pub const fn header_len(self) -> usize {
        if self.multi_hop {
            MULTI_HOP_HEADER_LEN
        } else {
            HEADER_LEN
        }
    }
}

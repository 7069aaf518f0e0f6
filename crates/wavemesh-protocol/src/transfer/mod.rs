//! Block and stream transfers.
//!
//! A transfer moves more data than fits one frame. The sender announces it
//! with a `Start` control frame, sends numbered chunks one at a time (each
//! its own acknowledged transaction), and closes it with `Complete`. Either
//! side may end it early with `Abort`.
//!
//! This module holds the pure state machines and payload codecs; scheduling
//! chunks onto the engine is the coordinator's job.

pub mod chunk;
pub mod control;
pub mod state;

use core::fmt;

use wavemesh_core::{Encryption, PacketClass};

pub use chunk::{CHUNK_HEADER_LEN, Chunk};
pub use control::{Control, StartControl};
pub use state::{
    Adjustment, ChunkAccepted, ChunkStep, InboundTransfer, TransferPhase, TransferState,
};

/// Sender-chosen transfer number, unique per (sender, receiver) while live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TransferId(pub u8);

impl TransferId {
    pub const fn next(self) -> Self {
        TransferId(self.0.wrapping_add(1))
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xfer{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    /// The whole payload is known up front and delivered at once.
    Block,
    /// Pieces are pulled from the application and delivered as they arrive.
    Stream,
}

impl TransferKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(TransferKind::Block),
            2 => Some(TransferKind::Stream),
            _ => None,
        }
    }

    pub const fn to_byte(self) -> u8 {
        match self {
            TransferKind::Block => 1,
            TransferKind::Stream => 2,
        }
    }

    /// Packet class of the chunk frames.
    pub const fn chunk_class(self) -> PacketClass {
        match self {
            TransferKind::Block => PacketClass::Block,
            TransferKind::Stream => PacketClass::Stream,
        }
    }

    /// Key used for chunk payloads.
    pub const fn chunk_encryption(self) -> Encryption {
        match self {
            TransferKind::Block => Encryption::Network,
            TransferKind::Stream => Encryption::Stream,
        }
    }

    pub fn from_class(class: PacketClass) -> Option<Self> {
        match class {
            PacketClass::Block => Some(TransferKind::Block),
            PacketClass::Stream => Some(TransferKind::Stream),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            TransferKind::Block => "block",
            TransferKind::Stream => "stream",
        }
    }
}

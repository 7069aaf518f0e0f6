//! Identifiers, wire codec and frame format for the wavemesh radio stack.
//!
//! This crate defines the addressing newtypes, the PID byte, the
//! constant-weight symbol code with its CRC-32 check sequences, and the
//! on-air frame built from them.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod codec;
pub mod constants;
pub mod error;
pub mod packet;
pub mod types;

pub use constants::{Encryption, PacketClass};
pub use error::{CodecError, FrameError, FrameSection};
pub use packet::{AckDescriptor, Frame, NackReason, Pid};
pub use types::{Channel, DataRate, Did, MessageId, Nid, Pattern, UnitId};

//! Protocol error types.
//!
//! These errors cover transaction delivery failures and transfer state
//! machine violations.

use wavemesh_core::{FrameError, NackReason};
use wavemesh_interfaces::HalError;

/// Why a transaction failed. Surfaced once, after the retry budget is spent
/// or a fatal condition cut it short.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    #[error("no acknowledgment before the retry budget ran out")]
    Timeout,

    #[error("refused by peer: {reason:?} ({value})")]
    NackedRetryable { reason: NackReason, value: u16 },

    #[error("refused fatally by peer: {reason:?} ({value})")]
    NackedFatal { reason: NackReason, value: u16 },

    #[error("aborted by application")]
    AbortedByApplication,

    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("radio error: {0}")]
    Radio(#[from] HalError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("{0} transfers not supported")]
    Unsupported(&'static str),

    #[error("invalid control payload: {0}")]
    InvalidControl(&'static str),

    #[error("invalid chunk: {0}")]
    InvalidChunk(&'static str),

    #[error("chunk out of sequence: expected {expected}, got {actual}")]
    OutOfSequence { expected: u16, actual: u16 },

    #[error("adjustment out of bounds: {reason:?} to {value}")]
    AdjustmentOutOfBounds { reason: NackReason, value: u16 },

    #[error("length mismatch: announced {announced}, received {received}")]
    LengthMismatch { announced: usize, received: usize },

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

/// The transaction arena has no free slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("transaction queue full")]
pub struct QueueFull;

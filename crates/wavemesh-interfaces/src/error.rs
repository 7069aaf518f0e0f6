//! Error types for the radio layer.

use wavemesh_core::Channel;

/// Errors a radio driver reports for a single transmit attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HalError {
    #[error("channel {0} busy")]
    ChannelBusy(Channel),
    #[error("frame of {len} bytes exceeds radio limit of {max}")]
    FrameTooLong { len: usize, max: usize },
    #[error("transmit failed: {0}")]
    TransmitFailed(String),
    #[error("radio detached from medium")]
    Detached,
}

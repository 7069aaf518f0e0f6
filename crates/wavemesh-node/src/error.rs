//! Error types for the device layer.

use wavemesh_core::{Did, FrameError};
use wavemesh_crypto::KeySlot;
use wavemesh_protocol::{QueueFull, TransferError};

use crate::admin::AdminError;
use crate::directory::DirectoryError;
use crate::settings::StoreError;

/// Misconfiguration. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("device has not joined a network")]
    NotJoined,
    #[error("missing {0} key")]
    MissingKey(KeySlot),
    #[error("invalid DID {0}")]
    InvalidDid(Did),
    #[error("invalid key for {slot}: {reason}")]
    InvalidKey { slot: KeySlot, reason: String },
    #[error("invalid engine configuration: {0}")]
    Engine(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read config file: {0}")]
    Read(String),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Why an enqueue was refused. Nothing was queued when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    #[error("transaction queue full")]
    QueueFull,
    #[error("no destinations")]
    NoTargets,
    #[error("{0} messages not supported")]
    Unsupported(&'static str),
    #[error("payload too long: {len} bytes (max {max})")]
    PayloadTooLong { len: usize, max: usize },
    #[error("busy: {0}")]
    Busy(&'static str),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
}

impl From<QueueFull> for EnqueueError {
    fn from(_: QueueFull) -> Self {
        EnqueueError::QueueFull
    }
}

/// Errors surfaced by the device layer as a whole.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("enqueue failed: {0}")]
    Enqueue(#[from] EnqueueError),
    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),
    #[error("settings store error: {0}")]
    Store(#[from] StoreError),
    #[error("admin payload error: {0}")]
    Admin(#[from] AdminError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

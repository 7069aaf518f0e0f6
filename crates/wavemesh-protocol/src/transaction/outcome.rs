//! Terminal results handed to the application.

use wavemesh_core::{Did, PacketClass};

use super::state::{TxId, TxPurpose};
use crate::error::TransactionError;

/// Final result of one transaction or transfer, reported exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub tx: TxId,
    pub peer: Did,
    pub class: PacketClass,
    pub purpose: TxPurpose,
    pub retries: u8,
    /// The ACK value on success.
    pub result: Result<Option<u16>, TransactionError>,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

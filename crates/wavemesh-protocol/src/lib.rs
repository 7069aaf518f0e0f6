//! Transaction engine for the wavemesh stack.
//!
//! This crate owns everything between a framed packet and the application:
//! per-transaction acknowledgment, retry and backoff, duplicate suppression,
//! block/stream transfer state machines, and the application hook trait.

pub mod config;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod receipt;
pub mod time;
pub mod transaction;
pub mod transfer;

pub use config::EngineConfig;
pub use engine::{EngineEvent, EngineStats, TransactionEngine};
pub use error::{QueueFull, TransactionError, TransferError};
pub use hooks::{AppHooks, Delivery, NetworkEvent, NoHooks};
pub use receipt::{ReceiptCache, ReceiptCheck};
pub use time::Tick;
pub use transaction::{Outcome, Priority, TxId, TxPurpose, TxRequest, TxState};
pub use transfer::{TransferId, TransferKind, TransferState};

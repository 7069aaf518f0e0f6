//! Per-transaction state machine.
//!
//! ```text
//! Idle → Queued → AwaitingChannel → Sent → AwaitingAck → Acked
//!          ↑            │ busy: backoff        │
//!          │            ↓                      ├→ Nacked ──┐
//!          └──── retry (retries + 1) ──────────┴→ TimedOut ┴→ Aborted
//! ```
//!
//! The transitions that involve a decision are pure functions so they can be
//! tested without an engine or a radio.

use wavemesh_core::{Did, MessageId, NackReason, PacketClass};

use crate::error::TransactionError;
use crate::time::Tick;
use crate::transfer::TransferId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxState {
    Idle,
    Queued,
    AwaitingChannel,
    Sent,
    AwaitingAck,
    Acked,
    Nacked,
    TimedOut,
    Aborted,
}

impl TxState {
    /// States that hold the peer's single in-flight slot.
    pub const fn is_in_flight(self) -> bool {
        matches!(
            self,
            TxState::AwaitingChannel | TxState::Sent | TxState::AwaitingAck
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, TxState::Acked | TxState::Aborted)
    }

    pub const fn name(self) -> &'static str {
        match self {
            TxState::Idle => "idle",
            TxState::Queued => "queued",
            TxState::AwaitingChannel => "awaiting_channel",
            TxState::Sent => "sent",
            TxState::AwaitingAck => "awaiting_ack",
            TxState::Acked => "acked",
            TxState::Nacked => "nacked",
            TxState::TimedOut => "timed_out",
            TxState::Aborted => "aborted",
        }
    }
}

/// Handle to a transaction: arena slot plus generation, so a stale handle
/// never addresses a slot that has since been reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId {
    pub slot: u16,
    pub generation: u32,
}

impl core::fmt::Display for TxId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "tx{}.{}", self.slot, self.generation)
    }
}

/// What a transaction is carrying, which decides who handles its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxPurpose {
    Application,
    Transfer(TransferId),
    Admin,
    Relay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Priority {
    #[default]
    Normal,
    High,
}

/// Everything the engine needs to run one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub peer: Did,
    pub class: PacketClass,
    pub message_id: MessageId,
    /// Complete on-air bytes, sent unchanged on every attempt.
    pub wire: Vec<u8>,
    /// Hop budget written in the frame; scales the ACK deadline.
    pub hops: u8,
    /// Fire-and-forget transactions complete on transmission.
    pub expects_ack: bool,
    pub purpose: TxPurpose,
    pub priority: Priority,
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: TxId,
    pub request: TxRequest,
    pub state: TxState,
    pub retries: u8,
    /// Earliest tick the next channel attempt may happen.
    pub not_before: Tick,
    pub deadline: Option<Tick>,
    pub cancel_requested: bool,
    pub last_error: Option<TransactionError>,
    /// Submission order, used to keep equal-priority traffic FIFO.
    pub sequence: u64,
}

impl Transaction {
    pub fn new(id: TxId, request: TxRequest, now: Tick, sequence: u64) -> Self {
        Self {
            id,
            request,
            state: TxState::Idle,
            retries: 0,
            not_before: now,
            deadline: None,
            cancel_requested: false,
            last_error: None,
            sequence,
        }
    }

    pub fn peer(&self) -> Did {
        self.request.peer
    }

    pub fn message_id(&self) -> MessageId {
        self.request.message_id
    }
}

// ---------------------------------------------------------------------------
// Pure decision functions
// ---------------------------------------------------------------------------

/// ACK deadline for a frame sent at `now`: one timeout per hop plus the
/// direct hop.
pub fn compute_ack_deadline(now: Tick, ack_timeout_ms: u32, hops: u8) -> Tick {
    now + ack_timeout_ms.saturating_mul(u32::from(hops) + 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryInput {
    pub retries: u8,
    pub max_retries: u8,
    pub fatal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-enter `Queued` with the new retry count.
    Retry { retries: u8 },
    Abort,
}

/// Decide what happens after a failed attempt.
///
/// A fatal failure aborts at once. Otherwise the attempt is retried unless
/// the retry count already equals the budget.
#[must_use]
pub fn decide_retry(input: RetryInput) -> RetryDecision {
    if input.fatal || input.retries >= input.max_retries {
        RetryDecision::Abort
    } else {
        RetryDecision::Retry {
            retries: input.retries + 1,
        }
    }
}

/// Classify a NACK before and after the application's fatality override.
///
/// The hook sees every NACK independently: downgrading a reason to retryable
/// only continues within the remaining budget, upgrading to fatal ends the
/// transaction now.
pub fn nack_error(reason: NackReason, value: u16, fatal: bool) -> TransactionError {
    if fatal {
        TransactionError::NackedFatal { reason, value }
    } else {
        TransactionError::NackedRetryable { reason, value }
    }
}

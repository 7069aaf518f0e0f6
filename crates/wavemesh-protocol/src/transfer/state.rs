//! Transfer state machines.
//!
//! Sender phases:
//!
//! ```text
//! Negotiating ──Start acked──→ Transferring ──drained──→ Completing ──Complete acked──→ Done
//!      │                        (ChunkComplete ⇄ InFlight)                                │
//!      └──────────────────────────── any failure ───────────────────────→ Aborted ←───────┘
//! ```
//!
//! Chunk data is only consumed once its chunk is acknowledged, so an
//! adjustment re-slices the unacknowledged bytes with the new parameters.

use wavemesh_core::{Channel, DataRate, Did, NackReason, Pattern, UnitId};

use super::chunk::Chunk;
use super::control::{Control, StartControl};
use super::{TransferId, TransferKind};
use crate::config::EngineConfig;
use crate::error::TransferError;
use crate::time::Tick;
use crate::transaction::TxId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferPhase {
    Negotiating,
    Transferring,
    Completing,
    Done,
    Aborted,
}

impl TransferPhase {
    pub const fn is_finished(self) -> bool {
        matches!(self, TransferPhase::Done | TransferPhase::Aborted)
    }
}

/// Checkpoint between chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStep {
    /// No chunk outstanding; the next one may be scheduled.
    ChunkComplete,
    /// A chunk carrying `len` data bytes is in flight.
    InFlight { tx: TxId, len: usize },
}

/// A parameter change accepted from the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    ChunkSize(usize),
    Channel(Channel),
    DataRate(DataRate),
}

/// Outgoing transfer.
#[derive(Debug, Clone)]
pub struct TransferState {
    pub id: TransferId,
    pub kind: TransferKind,
    pub peer: Did,
    pub src_unit: UnitId,
    pub dst_unit: UnitId,
    pub pattern: Pattern,
    pub phase: TransferPhase,
    pub step: ChunkStep,
    pub chunk_size: usize,
    /// Radio overrides requested by the receiver for the rest of the transfer.
    pub channel: Option<Channel>,
    pub data_rate: Option<DataRate>,
    /// Handle reported to the application when the transfer ends.
    pub handle: Option<TxId>,
    /// Control transaction currently in flight (Start or Complete).
    pub control_tx: Option<TxId>,
    pub next_index: u16,
    /// Data bytes acknowledged so far.
    pub acked_len: usize,
    /// Bytes announced in Start; zero for streams.
    pub total_len: usize,
    /// Consecutive adjustments without an acknowledged chunk in between.
    pub adjustments: u8,
    /// No more stream pieces will come from the application.
    pub source_done: bool,
    pending: Vec<u8>,
}

impl TransferState {
    pub fn new(
        id: TransferId,
        kind: TransferKind,
        peer: Did,
        units: (UnitId, UnitId, Pattern),
        first: Vec<u8>,
        chunk_size: usize,
    ) -> Self {
        let (src_unit, dst_unit, pattern) = units;
        let total_len = match kind {
            TransferKind::Block => first.len(),
            TransferKind::Stream => 0,
        };
        Self {
            id,
            kind,
            peer,
            src_unit,
            dst_unit,
            pattern,
            phase: TransferPhase::Negotiating,
            step: ChunkStep::ChunkComplete,
            chunk_size,
            channel: None,
            data_rate: None,
            handle: None,
            control_tx: None,
            next_index: 0,
            acked_len: 0,
            total_len,
            adjustments: 0,
            source_done: kind == TransferKind::Block,
            pending: first,
        }
    }

    pub fn start_control(&self) -> Control {
        Control::Start(StartControl {
            transfer: self.id,
            kind: self.kind,
            chunk_size: self.chunk_size as u8,
            total_len: self.total_len as u32,
            src_unit: self.src_unit,
            dst_unit: self.dst_unit,
            pattern: self.pattern,
        })
    }

    pub fn complete_control(&self) -> Control {
        Control::Complete {
            transfer: self.id,
            total_len: self.acked_len as u32,
            chunk_count: self.next_index,
        }
    }

    /// Bytes not yet acknowledged.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// A stream that has sent everything it holds and may pull more.
    pub fn wants_data(&self) -> bool {
        self.phase == TransferPhase::Transferring
            && self.step == ChunkStep::ChunkComplete
            && self.pending.is_empty()
            && !self.source_done
    }

    /// Append a piece supplied by the application, or mark the source done.
    pub fn supply(&mut self, piece: Option<Vec<u8>>) {
        match piece {
            Some(bytes) if !bytes.is_empty() => self.pending.extend_from_slice(&bytes),
            Some(_) => {}
            None => self.source_done = true,
        }
    }

    /// Every byte was acknowledged and no more will come.
    pub fn is_drained(&self) -> bool {
        self.phase == TransferPhase::Transferring
            && self.step == ChunkStep::ChunkComplete
            && self.pending.is_empty()
            && self.source_done
    }

    /// The next chunk to send, if one may be scheduled now.
    pub fn next_chunk(&self) -> Option<Chunk> {
        if self.phase != TransferPhase::Transferring
            || self.step != ChunkStep::ChunkComplete
            || self.pending.is_empty()
        {
            return None;
        }
        let n = self.pending.len().min(Chunk::capacity(self.chunk_size));
        Some(Chunk {
            index: self.next_index,
            data: self.pending[..n].to_vec(),
        })
    }

    pub fn chunk_sent(&mut self, tx: TxId, len: usize) {
        self.step = ChunkStep::InFlight { tx, len };
    }

    pub fn start_acked(&mut self) {
        self.control_tx = None;
        self.adjustments = 0;
        self.phase = TransferPhase::Transferring;
    }

    /// The in-flight chunk was acknowledged: consume its bytes.
    pub fn chunk_acked(&mut self) {
        if let ChunkStep::InFlight { len, .. } = self.step {
            self.pending.drain(..len.min(self.pending.len()));
            self.acked_len += len;
            self.next_index = self.next_index.wrapping_add(1);
            self.adjustments = 0;
        }
        self.step = ChunkStep::ChunkComplete;
    }

    pub fn begin_completing(&mut self, tx: TxId) {
        self.control_tx = Some(tx);
        self.phase = TransferPhase::Completing;
    }

    pub fn finish(&mut self, phase: TransferPhase) {
        self.phase = phase;
        self.step = ChunkStep::ChunkComplete;
        self.control_tx = None;
    }

    /// Whether `tx` is the chunk or control transaction of this transfer.
    pub fn owns(&self, tx: TxId) -> bool {
        self.control_tx == Some(tx) || matches!(self.step, ChunkStep::InFlight { tx: t, .. } if t == tx)
    }

    /// Apply a receiver's adjustment request.
    ///
    /// The refused frame is resent afterwards: Start while negotiating, the
    /// same chunk (re-sliced) while transferring. Requests outside the local
    /// bounds, or more than `max_adjustments` in a row, are errors.
    pub fn apply_adjustment(
        &mut self,
        reason: NackReason,
        value: u16,
        config: &EngineConfig,
    ) -> Result<Adjustment, TransferError> {
        let out_of_bounds = TransferError::AdjustmentOutOfBounds { reason, value };
        if self.adjustments >= config.max_adjustments {
            return Err(out_of_bounds);
        }
        if !config.adjustment_in_bounds(reason, value) {
            return Err(out_of_bounds);
        }
        let adjustment = match reason {
            NackReason::InvalidChunkSize => Adjustment::ChunkSize(usize::from(value)),
            NackReason::ChannelChange => Adjustment::Channel(Channel(value as u8)),
            NackReason::DataRateChange => Adjustment::DataRate(DataRate(value as u8)),
            _ => return Err(out_of_bounds),
        };
        match adjustment {
            Adjustment::ChunkSize(size) => self.chunk_size = size,
            Adjustment::Channel(ch) => self.channel = Some(ch),
            Adjustment::DataRate(rate) => self.data_rate = Some(rate),
        }
        self.adjustments += 1;
        self.step = ChunkStep::ChunkComplete;
        self.control_tx = None;
        tracing::debug!(
            transfer = %self.id,
            peer = %self.peer,
            ?adjustment,
            "transfer: adjustment applied"
        );
        Ok(adjustment)
    }
}

/// What the receiver does with an accepted chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkAccepted {
    /// Block data held until Complete.
    Buffered,
    /// Stream data to hand to the application now.
    Deliver(Vec<u8>),
}

/// Incoming transfer.
#[derive(Debug, Clone)]
pub struct InboundTransfer {
    pub id: TransferId,
    pub kind: TransferKind,
    pub from: Did,
    pub src_unit: UnitId,
    pub dst_unit: UnitId,
    pub pattern: Pattern,
    pub chunk_size: usize,
    pub total_len: usize,
    pub expected_index: u16,
    pub received_len: usize,
    pub last_activity: Tick,
    /// Sent as the NACK of the next chunk.
    pub pending_adjustment: Option<(NackReason, u16)>,
    buffer: Vec<u8>,
}

impl InboundTransfer {
    pub fn from_start(from: Did, start: &StartControl, now: Tick) -> Self {
        Self {
            id: start.transfer,
            kind: start.kind,
            from,
            src_unit: start.src_unit,
            dst_unit: start.dst_unit,
            pattern: start.pattern,
            chunk_size: usize::from(start.chunk_size),
            total_len: start.total_len as usize,
            expected_index: 0,
            received_len: 0,
            last_activity: now,
            pending_adjustment: None,
            buffer: Vec::new(),
        }
    }

    /// Check a Start against local limits. On refusal returns the NACK to send.
    pub fn vet_start(start: &StartControl, config: &EngineConfig) -> Result<(), (NackReason, u16)> {
        let supported = match start.kind {
            TransferKind::Block => config.supports_block,
            TransferKind::Stream => config.supports_stream,
        };
        if !supported {
            return Err((NackReason::Unsupported, 0));
        }
        if start.kind == TransferKind::Block && start.total_len as usize > config.max_block_len {
            return Err((NackReason::Unsupported, 0));
        }
        if !config.chunk_size_in_bounds(usize::from(start.chunk_size)) {
            return Err((NackReason::InvalidChunkSize, config.chunk_size as u16));
        }
        Ok(())
    }

    /// Accept the next chunk. `frame_len` is the chunk payload length seen on
    /// the air, which is the sender's current chunk size.
    pub fn accept(
        &mut self,
        chunk: Chunk,
        frame_len: usize,
        max_block_len: usize,
        now: Tick,
    ) -> Result<ChunkAccepted, TransferError> {
        if chunk.index != self.expected_index {
            return Err(TransferError::OutOfSequence {
                expected: self.expected_index,
                actual: chunk.index,
            });
        }
        if self.kind == TransferKind::Block && self.buffer.len() + chunk.data.len() > max_block_len {
            return Err(TransferError::LengthMismatch {
                announced: self.total_len,
                received: self.buffer.len() + chunk.data.len(),
            });
        }
        self.chunk_size = frame_len;
        self.expected_index = self.expected_index.wrapping_add(1);
        self.received_len += chunk.data.len();
        self.last_activity = now;
        match self.kind {
            TransferKind::Block => {
                self.buffer.extend_from_slice(&chunk.data);
                Ok(ChunkAccepted::Buffered)
            }
            TransferKind::Stream => Ok(ChunkAccepted::Deliver(chunk.data)),
        }
    }

    /// Close the transfer. Returns the assembled block, or `None` for streams.
    pub fn complete(&mut self, total_len: u32, chunk_count: u16) -> Result<Option<Vec<u8>>, TransferError> {
        let total_len = total_len as usize;
        if total_len != self.received_len || chunk_count != self.expected_index {
            return Err(TransferError::LengthMismatch {
                announced: total_len,
                received: self.received_len,
            });
        }
        match self.kind {
            TransferKind::Block if self.total_len != self.received_len => {
                Err(TransferError::LengthMismatch {
                    announced: self.total_len,
                    received: self.received_len,
                })
            }
            TransferKind::Block => Ok(Some(core::mem::take(&mut self.buffer))),
            TransferKind::Stream => Ok(None),
        }
    }

    pub fn is_idle(&self, now: Tick, timeout_ms: u32) -> bool {
        now.elapsed_since(self.last_activity) >= timeout_ms
    }

    pub fn touch(&mut self, now: Tick) {
        self.last_activity = now;
    }
}

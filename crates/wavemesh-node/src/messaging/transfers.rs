//! Scheduling block and stream transfers onto the engine.
//!
//! Every frame of a transfer is its own transaction: Start, each chunk,
//! and Complete. The Start transaction's id is the handle the application
//! gets back; its single outcome is reported when the transfer ends.

use wavemesh_core::{AckDescriptor, Channel, DataRate, Did, Encryption, Frame, NackReason, PacketClass, Pattern, UnitId};
use wavemesh_interfaces::Radio;
use wavemesh_protocol::transfer::{
    Adjustment, Chunk, ChunkAccepted, Control, InboundTransfer, StartControl, TransferPhase,
};
use wavemesh_protocol::{
    AppHooks, Delivery, EngineConfig, Outcome, Priority, TransactionError, TransferError,
    TransferId, TransferKind, TransferState, TxId, TxPurpose,
};

use super::{Outgoing, submit};
use crate::context::DeviceContext;
use crate::directory::Target;
use crate::error::EnqueueError;

/// Radio settings a receiver asked a sender to move to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReceiverTuning {
    from: Did,
    channel: Option<Channel>,
    data_rate: Option<DataRate>,
}

#[derive(Debug, Default)]
pub struct Transfers {
    outbound: Vec<TransferState>,
    inbound: Vec<InboundTransfer>,
    next_id: TransferId,
    receiver_tuning: Option<ReceiverTuning>,
}

fn submit_control<R: Radio, H: AppHooks>(
    ctx: &mut DeviceContext<R>,
    hooks: &mut H,
    peer: Did,
    control: &Control,
    expects_ack: bool,
) -> Result<TxId, EnqueueError> {
    submit(
        ctx,
        hooks,
        Outgoing {
            dst: peer,
            class: PacketClass::Control,
            encryption: Encryption::Network,
            payload: &control.to_bytes(),
            purpose: TxPurpose::Transfer(control.transfer()),
            priority: Priority::Normal,
            expects_ack,
        },
    )
}

impl Transfers {
    pub fn outbound(&self) -> &[TransferState] {
        &self.outbound
    }

    pub fn inbound(&self) -> &[InboundTransfer] {
        &self.inbound
    }

    pub fn by_handle(&self, handle: TxId) -> Option<TransferId> {
        self.outbound
            .iter()
            .find(|t| t.handle == Some(handle))
            .map(|t| t.id)
    }

    /// Radio settings the live transfers need, if they differ from the
    /// device's own.
    pub fn tuning(&self) -> (Option<Channel>, Option<DataRate>) {
        if let Some(t) = self
            .outbound
            .iter()
            .find(|t| t.channel.is_some() || t.data_rate.is_some())
        {
            return (t.channel, t.data_rate);
        }
        match self.receiver_tuning {
            Some(r) => (r.channel, r.data_rate),
            None => (None, None),
        }
    }

    fn allocate_id(&mut self, peer: Did) -> Option<TransferId> {
        for _ in 0..=u8::MAX {
            let id = self.next_id;
            self.next_id = id.next();
            if !self.outbound.iter().any(|t| t.peer == peer && t.id == id) {
                return Some(id);
            }
        }
        None
    }

    /// Announce a new transfer to `target` and return its handle.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn start<R: Radio, H: AppHooks>(
        &mut self,
        ctx: &mut DeviceContext<R>,
        hooks: &mut H,
        kind: TransferKind,
        target: Target,
        local_unit: UnitId,
        pattern: Pattern,
        data: Vec<u8>,
    ) -> Result<TxId, EnqueueError> {
        let id = self
            .allocate_id(target.did)
            .ok_or(EnqueueError::Busy("no free transfer id"))?;
        let mut state = TransferState::new(
            id,
            kind,
            target.did,
            (local_unit, target.unit, pattern),
            data,
            ctx.config().chunk_size,
        );
        let tx = submit_control(ctx, hooks, target.did, &state.start_control(), true)?;
        state.handle = Some(tx);
        state.control_tx = Some(tx);
        tracing::debug!(
            transfer = %id,
            kind = kind.name(),
            peer = %target.did,
            len = state.total_len,
            "transfer: started"
        );
        self.outbound.push(state);
        Ok(tx)
    }

    /// Queue whatever each outgoing transfer can send next.
    pub(crate) fn pump<R: Radio, H: AppHooks>(&mut self, ctx: &mut DeviceContext<R>, hooks: &mut H) {
        let mut failed = Vec::new();
        for t in &mut self.outbound {
            let step = match t.phase {
                TransferPhase::Negotiating if t.control_tx.is_none() => {
                    submit_control(ctx, hooks, t.peer, &t.start_control(), true)
                        .map(|tx| t.control_tx = Some(tx))
                }
                TransferPhase::Transferring => {
                    if t.kind == TransferKind::Stream && t.wants_data() {
                        let piece = hooks.next_block_or_stream_payload(t);
                        t.supply(piece);
                    }
                    if let Some(chunk) = t.next_chunk() {
                        send_chunk(ctx, hooks, t, chunk)
                    } else if t.is_drained() {
                        submit_control(ctx, hooks, t.peer, &t.complete_control(), true)
                            .map(|tx| t.begin_completing(tx))
                    } else {
                        Ok(())
                    }
                }
                _ => Ok(()),
            };
            match step {
                Ok(()) | Err(EnqueueError::QueueFull) => {}
                Err(e) => failed.push((t.id, t.peer, e)),
            }
        }
        for (id, peer, e) in failed {
            tracing::warn!(transfer = %id, error = %e, "transfer: cannot queue frame");
            self.abort(ctx, hooks, id, peer, TransactionError::InvalidParameter("transfer frame"), 0, true);
        }
    }

    pub(crate) fn on_outcome<R: Radio, H: AppHooks>(
        &mut self,
        ctx: &mut DeviceContext<R>,
        hooks: &mut H,
        outcome: &Outcome,
    ) {
        let Some(index) = self.outbound.iter().position(|t| t.owns(outcome.tx)) else {
            return;
        };
        let t = &mut self.outbound[index];
        match &outcome.result {
            Ok(_) if t.control_tx == Some(outcome.tx) => match t.phase {
                TransferPhase::Negotiating => {
                    tracing::debug!(transfer = %t.id, peer = %t.peer, "transfer: start acknowledged");
                    t.start_acked();
                }
                TransferPhase::Completing => {
                    t.finish(TransferPhase::Done);
                    tracing::debug!(
                        transfer = %t.id,
                        peer = %t.peer,
                        len = t.acked_len,
                        "transfer: done"
                    );
                    let t = self.outbound.remove(index);
                    report(hooks, &t, outcome.retries, Ok(None));
                }
                _ => {}
            },
            Ok(_) => t.chunk_acked(),
            Err(e) => {
                let (id, peer) = (t.id, t.peer);
                self.abort(ctx, hooks, id, peer, e.clone(), outcome.retries, true);
            }
        }
    }

    pub(crate) fn on_adjustment<R: Radio, H: AppHooks>(
        &mut self,
        ctx: &mut DeviceContext<R>,
        hooks: &mut H,
        transfer: TransferId,
        tx: TxId,
        reason: NackReason,
        value: u16,
    ) {
        let Some(t) = self
            .outbound
            .iter_mut()
            .find(|t| t.id == transfer && t.owns(tx))
        else {
            return;
        };
        let config = ctx.config().clone();
        match t.apply_adjustment(reason, value, &config) {
            Ok(Adjustment::ChunkSize(_)) => {}
            Ok(Adjustment::Channel(_) | Adjustment::DataRate(_)) => {
                tracing::debug!(transfer = %t.id, "transfer: radio override requested");
            }
            Err(e) => {
                tracing::debug!(transfer = %t.id, error = %e, "transfer: adjustment refused");
                let peer = t.peer;
                self.abort(
                    ctx,
                    hooks,
                    transfer,
                    peer,
                    TransactionError::InvalidParameter("adjustment out of bounds"),
                    0,
                    true,
                );
            }
        }
    }

    /// End an outgoing transfer early. Returns false if it was not found.
    pub(crate) fn abort<R: Radio, H: AppHooks>(
        &mut self,
        ctx: &mut DeviceContext<R>,
        hooks: &mut H,
        id: TransferId,
        peer: Did,
        error: TransactionError,
        retries: u8,
        notify_peer: bool,
    ) -> bool {
        let Some(index) = self
            .outbound
            .iter()
            .position(|t| t.id == id && t.peer == peer)
        else {
            return false;
        };
        let mut t = self.outbound.remove(index);
        ctx.engine
            .cancel_where(|tx| tx.request.purpose == TxPurpose::Transfer(id) && tx.peer() == peer);
        t.finish(TransferPhase::Aborted);
        if notify_peer {
            let reason = match &error {
                TransactionError::NackedFatal { reason, .. }
                | TransactionError::NackedRetryable { reason, .. } => *reason,
                _ => NackReason::Generic,
            };
            let abort = Control::Abort {
                transfer: id,
                reason,
            };
            if let Err(e) = submit_control(ctx, hooks, peer, &abort, false) {
                tracing::debug!(transfer = %id, error = %e, "transfer: abort not sent");
            }
        }
        tracing::debug!(transfer = %id, peer = %peer, error = %error, "transfer: aborted");
        report(hooks, &t, retries, Err(error));
        true
    }

    pub(crate) fn cancel<R: Radio, H: AppHooks>(
        &mut self,
        ctx: &mut DeviceContext<R>,
        hooks: &mut H,
        id: TransferId,
    ) -> bool {
        let Some(peer) = self.outbound.iter().find(|t| t.id == id).map(|t| t.peer) else {
            return false;
        };
        self.abort(ctx, hooks, id, peer, TransactionError::AbortedByApplication, 0, true)
    }

    // -- receiver side ------------------------------------------------------

    pub(crate) fn on_control<R: Radio, H: AppHooks>(
        &mut self,
        ctx: &mut DeviceContext<R>,
        hooks: &mut H,
        frame: &Frame,
        control: Control,
    ) -> Option<AckDescriptor> {
        let from = frame.src;
        match control {
            Control::Start(start) => Some(self.on_start(ctx, from, &start)),
            Control::Complete {
                transfer,
                total_len,
                chunk_count,
            } => {
                let Some(index) = self
                    .inbound
                    .iter()
                    .position(|t| t.from == from && t.id == transfer)
                else {
                    return Some(AckDescriptor::nack(NackReason::UnknownTransfer));
                };
                let mut t = self.inbound.remove(index);
                self.release_tuning(from);
                match t.complete(total_len, chunk_count) {
                    Ok(Some(block)) => {
                        deliver(ctx, hooks, frame, &t, PacketClass::Block, block);
                        Some(AckDescriptor::ack())
                    }
                    Ok(None) => {
                        tracing::debug!(transfer = %transfer, from = %from, len = t.received_len, "transfer: stream closed");
                        Some(AckDescriptor::ack())
                    }
                    Err(e) => {
                        tracing::debug!(transfer = %transfer, from = %from, error = %e, "transfer: incomplete");
                        Some(AckDescriptor::nack(NackReason::Generic))
                    }
                }
            }
            Control::Abort { transfer, reason } => {
                let before = self.inbound.len();
                self.inbound.retain(|t| !(t.from == from && t.id == transfer));
                if self.inbound.len() != before {
                    tracing::debug!(transfer = %transfer, from = %from, ?reason, "transfer: aborted by sender");
                    self.release_tuning(from);
                } else {
                    // The receiver gave up on one of ours.
                    self.abort(
                        ctx,
                        hooks,
                        transfer,
                        from,
                        TransactionError::NackedFatal { reason, value: 0 },
                        0,
                        false,
                    );
                }
                None
            }
        }
    }

    fn on_start<R: Radio>(
        &mut self,
        ctx: &DeviceContext<R>,
        from: Did,
        start: &StartControl,
    ) -> AckDescriptor {
        if let Err((reason, value)) = InboundTransfer::vet_start(start, ctx.config()) {
            tracing::debug!(transfer = %start.transfer, from = %from, ?reason, "transfer: start refused");
            return AckDescriptor::Nack { reason, value };
        }
        self.inbound.retain(|t| t.from != from);
        self.inbound.push(InboundTransfer::from_start(from, start, ctx.now));
        tracing::debug!(
            transfer = %start.transfer,
            from = %from,
            kind = start.kind.name(),
            len = start.total_len,
            "transfer: accepted"
        );
        AckDescriptor::ack()
    }

    pub(crate) fn on_chunk<R: Radio, H: AppHooks>(
        &mut self,
        ctx: &mut DeviceContext<R>,
        hooks: &mut H,
        frame: &Frame,
        plain: &[u8],
    ) -> Option<AckDescriptor> {
        let kind = TransferKind::from_class(frame.pid.class)?;
        let Some(index) = self
            .inbound
            .iter()
            .position(|t| t.from == frame.src && t.kind == kind)
        else {
            return Some(AckDescriptor::nack(NackReason::UnknownTransfer));
        };
        let Ok(chunk) = Chunk::decode(plain) else {
            return Some(AckDescriptor::nack(NackReason::Generic));
        };

        let now = ctx.now;
        if let Some((reason, value)) = self.inbound[index].pending_adjustment.take() {
            self.inbound[index].touch(now);
            match reason {
                NackReason::ChannelChange => self.tune_for(frame.src, Some(Channel(value as u8)), None),
                NackReason::DataRateChange => self.tune_for(frame.src, None, Some(DataRate(value as u8))),
                _ => {}
            }
            return Some(AckDescriptor::Nack { reason, value });
        }

        let config = ctx.config();
        let frame_len = frame.payload().len();
        if !config.chunk_size_in_bounds(frame_len) {
            return Some(AckDescriptor::Nack {
                reason: NackReason::InvalidChunkSize,
                value: config.chunk_size as u16,
            });
        }
        let max_block_len = config.max_block_len;
        match self.inbound[index].accept(chunk, frame_len, max_block_len, now) {
            Ok(ChunkAccepted::Buffered) => Some(AckDescriptor::ack()),
            Ok(ChunkAccepted::Deliver(data)) => {
                let t = self.inbound[index].clone();
                deliver(ctx, hooks, frame, &t, PacketClass::Stream, data);
                Some(AckDescriptor::ack())
            }
            Err(TransferError::OutOfSequence { expected, .. }) => Some(AckDescriptor::Nack {
                reason: NackReason::OutOfSequence,
                value: expected,
            }),
            Err(e) => {
                tracing::debug!(from = %frame.src, error = %e, "transfer: chunk refused");
                self.inbound.remove(index);
                self.release_tuning(frame.src);
                Some(AckDescriptor::nack(NackReason::Unsupported))
            }
        }
    }

    /// Queue an adjustment request for the sender of an inbound transfer.
    /// Values outside this device's own bounds are refused.
    pub(crate) fn request_adjustment(
        &mut self,
        config: &EngineConfig,
        from: Did,
        reason: NackReason,
        value: u16,
    ) -> bool {
        if !config.adjustment_in_bounds(reason, value) {
            tracing::debug!(from = %from, ?reason, value, "transfer: adjustment request out of bounds");
            return false;
        }
        match self.inbound.iter_mut().find(|t| t.from == from) {
            Some(t) => {
                t.pending_adjustment = Some((reason, value));
                true
            }
            None => false,
        }
    }

    /// Free inbound transfers that went quiet.
    pub(crate) fn expire_inbound(&mut self, now: wavemesh_protocol::Tick, timeout_ms: u32) -> usize {
        let mut expired = Vec::new();
        self.inbound.retain(|t| {
            let idle = t.is_idle(now, timeout_ms);
            if idle {
                tracing::debug!(transfer = %t.id, from = %t.from, "transfer: inbound idle, dropped");
                expired.push(t.from);
            }
            !idle
        });
        for from in &expired {
            self.release_tuning(*from);
        }
        expired.len()
    }

    fn tune_for(&mut self, from: Did, channel: Option<Channel>, data_rate: Option<DataRate>) {
        let previous = self.receiver_tuning.filter(|r| r.from == from);
        self.receiver_tuning = Some(ReceiverTuning {
            from,
            channel: channel.or(previous.and_then(|r| r.channel)),
            data_rate: data_rate.or(previous.and_then(|r| r.data_rate)),
        });
    }

    fn release_tuning(&mut self, from: Did) {
        if self.receiver_tuning.is_some_and(|r| r.from == from) {
            self.receiver_tuning = None;
        }
    }
}

fn send_chunk<R: Radio, H: AppHooks>(
    ctx: &mut DeviceContext<R>,
    hooks: &mut H,
    t: &mut TransferState,
    chunk: Chunk,
) -> Result<(), EnqueueError> {
    let len = chunk.data.len();
    let payload = chunk.encode(t.chunk_size)?;
    let tx = submit(
        ctx,
        hooks,
        Outgoing {
            dst: t.peer,
            class: t.kind.chunk_class(),
            encryption: t.kind.chunk_encryption(),
            payload: &payload,
            purpose: TxPurpose::Transfer(t.id),
            priority: Priority::Normal,
            expects_ack: true,
        },
    )?;
    tracing::trace!(transfer = %t.id, index = chunk.index, len, tx = %tx, "transfer: chunk queued");
    t.chunk_sent(tx, len);
    Ok(())
}

fn report<H: AppHooks>(
    hooks: &mut H,
    t: &TransferState,
    retries: u8,
    result: Result<Option<u16>, TransactionError>,
) {
    let Some(handle) = t.handle else { return };
    hooks.on_transaction_outcome(&Outcome {
        tx: handle,
        peer: t.peer,
        class: t.kind.chunk_class(),
        purpose: TxPurpose::Transfer(t.id),
        retries,
        result,
    });
}

fn deliver<R: Radio, H: AppHooks>(
    ctx: &mut DeviceContext<R>,
    hooks: &mut H,
    frame: &Frame,
    t: &InboundTransfer,
    class: PacketClass,
    data: Vec<u8>,
) {
    ctx.stats.delivered += 1;
    hooks.on_message_delivered(&Delivery {
        from: t.from,
        class,
        message_id: frame.message_id,
        src_unit: t.src_unit,
        dst_unit: t.dst_unit,
        pattern: t.pattern,
        data,
        hops: frame.pid.multi_hop.then_some(frame.hops),
    });
}

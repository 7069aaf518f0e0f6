//! The transaction engine.
//!
//! [`TransactionEngine`] owns a fixed-capacity arena of transactions and
//! advances them one poll at a time. A poll reaps cancellations, expires ACK
//! deadlines, and then puts at most one frame on the air: a queued response
//! if there is one, otherwise the highest-priority transaction whose peer has
//! nothing else in flight. Nothing here blocks; waiting is a deadline checked
//! on a later poll.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wavemesh_core::{AckDescriptor, Did, MessageId};
use wavemesh_interfaces::Radio;

use crate::config::EngineConfig;
use crate::error::{QueueFull, TransactionError};
use crate::hooks::AppHooks;
use crate::time::Tick;
use crate::transaction::state::nack_error;
use crate::transaction::{
    Outcome, RetryDecision, RetryInput, Transaction, TxId, TxPurpose, TxRequest, TxState,
    compute_ack_deadline, decide_retry,
};
use crate::transfer::TransferId;

/// Something the caller has to act on after a poll or an ACK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A transaction reached a terminal state.
    Completed(Outcome),
    /// A transfer chunk was refused with a request to change parameters.
    /// The chunk's transaction is gone; the transfer decides what to resend.
    AdjustmentRequested {
        tx: TxId,
        transfer: TransferId,
        peer: Did,
        reason: wavemesh_core::NackReason,
        value: u16,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub transmissions: u64,
    pub responses_sent: u64,
    pub busy_backoffs: u64,
    pub retries: u64,
    pub timeouts: u64,
    pub completed: u64,
    pub aborted: u64,
}

#[derive(Debug)]
enum Slot {
    Free { generation: u32 },
    Used(Transaction),
}

#[derive(Debug)]
pub struct TransactionEngine {
    config: EngineConfig,
    slots: Vec<Slot>,
    responses: VecDeque<Vec<u8>>,
    response_not_before: Tick,
    rng: StdRng,
    next_sequence: u64,
    stats: EngineStats,
}

impl TransactionEngine {
    pub fn new(config: EngineConfig) -> Self {
        let slots = (0..config.queue_capacity)
            .map(|_| Slot::Free { generation: 0 })
            .collect();
        let rng = StdRng::seed_from_u64(config.rng_seed);
        Self {
            config,
            slots,
            responses: VecDeque::new(),
            response_not_before: Tick::ZERO,
            rng,
            next_sequence: 0,
            stats: EngineStats::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Queue a transaction.
    pub fn submit(&mut self, request: TxRequest, now: Tick) -> Result<TxId, QueueFull> {
        let (index, generation) = self
            .slots
            .iter()
            .enumerate()
            .find_map(|(i, s)| match s {
                Slot::Free { generation } => Some((i, *generation)),
                Slot::Used(_) => None,
            })
            .ok_or(QueueFull)?;

        let id = TxId {
            slot: index as u16,
            generation,
        };
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let mut tx = Transaction::new(id, request, now, sequence);
        tx.state = TxState::Queued;
        tracing::trace!(
            tx = %id,
            peer = %tx.peer(),
            message_id = tx.message_id().0,
            class = ?tx.request.class,
            "engine: queued"
        );
        self.slots[index] = Slot::Used(tx);
        Ok(id)
    }

    /// Request cancellation. Takes effect at the next poll.
    pub fn cancel(&mut self, id: TxId) -> bool {
        match self.get_mut(id) {
            Some(tx) => {
                tx.cancel_requested = true;
                true
            }
            None => false,
        }
    }

    /// Request cancellation of every transaction matching `pred`.
    pub fn cancel_where(&mut self, pred: impl Fn(&Transaction) -> bool) -> usize {
        let mut count = 0;
        for slot in &mut self.slots {
            if let Slot::Used(tx) = slot
                && pred(tx)
            {
                tx.cancel_requested = true;
                count += 1;
            }
        }
        count
    }

    pub fn get(&self, id: TxId) -> Option<&Transaction> {
        match self.slots.get(id.slot as usize) {
            Some(Slot::Used(tx)) if tx.id == id => Some(tx),
            _ => None,
        }
    }

    fn get_mut(&mut self, id: TxId) -> Option<&mut Transaction> {
        match self.slots.get_mut(id.slot as usize) {
            Some(Slot::Used(tx)) if tx.id == id => Some(tx),
            _ => None,
        }
    }

    pub fn state(&self, id: TxId) -> Option<TxState> {
        self.get(id).map(|tx| tx.state)
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.slots.iter().filter_map(|s| match s {
            Slot::Used(tx) => Some(tx),
            Slot::Free { .. } => None,
        })
    }

    /// Number of live transactions.
    pub fn len(&self) -> usize {
        self.transactions().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether nothing is queued, in flight, or waiting to be answered.
    pub fn is_idle(&self) -> bool {
        self.is_empty() && self.responses.is_empty()
    }

    pub fn has_pending_for(&self, peer: Did) -> bool {
        self.transactions().any(|tx| tx.peer() == peer)
    }

    /// Queue a response frame (ACK/NACK). Responses bypass the per-peer
    /// single-flight rule and go out before any transaction. At most
    /// `receipt_capacity` wait; the oldest is dropped to make room.
    pub fn respond(&mut self, wire: Vec<u8>) {
        if self.responses.len() >= self.config.receipt_capacity.max(1) {
            self.responses.pop_front();
            tracing::debug!("engine: response queue full, oldest dropped");
        }
        self.responses.push_back(wire);
    }

    pub fn pending_responses(&self) -> usize {
        self.responses.len()
    }

    /// Advance every transaction and transmit at most one frame.
    pub fn poll<R: Radio + ?Sized>(&mut self, radio: &mut R, now: Tick) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        self.reap_cancelled(&mut events);
        self.expire_deadlines(now, &mut events);
        if !self.flush_response(radio, now) {
            self.transmit_next(radio, now, &mut events);
        }
        events
    }

    /// Feed an ACK or NACK from `from` for `message_id`.
    pub fn on_ack<H: AppHooks + ?Sized>(
        &mut self,
        from: Did,
        message_id: MessageId,
        descriptor: AckDescriptor,
        now: Tick,
        hooks: &mut H,
    ) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let Some(index) = self.slots.iter().position(|s| match s {
            Slot::Used(tx) => {
                tx.state == TxState::AwaitingAck
                    && !tx.cancel_requested
                    && tx.peer() == from
                    && tx.message_id() == message_id
            }
            Slot::Free { .. } => false,
        }) else {
            tracing::trace!(from = %from, message_id = message_id.0, "engine: unmatched ack");
            return events;
        };

        match descriptor {
            AckDescriptor::Ack { value } => {
                self.transition(index, TxState::Acked);
                self.finish(index, Ok(value), &mut events);
            }
            AckDescriptor::Nack { reason, value } => {
                self.transition(index, TxState::Nacked);
                let (tx_id, purpose, peer) = match &self.slots[index] {
                    Slot::Used(tx) => (tx.id, tx.request.purpose, tx.peer()),
                    Slot::Free { .. } => return events,
                };
                let mut fatal = reason.is_fatal_by_default();
                hooks.adjust_nack_fatality(reason, &mut fatal);
                if let TxPurpose::Transfer(transfer) = purpose
                    && reason.is_adjustment()
                    && !fatal
                {
                    self.slots[index] = Slot::Free {
                        generation: tx_id.generation.wrapping_add(1),
                    };
                    events.push(EngineEvent::AdjustmentRequested {
                        tx: tx_id,
                        transfer,
                        peer,
                        reason,
                        value,
                    });
                    return events;
                }

                self.fail(index, nack_error(reason, value, fatal), fatal, now, &mut events);
            }
        }
        events
    }

    // -- poll steps ---------------------------------------------------------

    fn reap_cancelled(&mut self, events: &mut Vec<EngineEvent>) {
        for index in 0..self.slots.len() {
            if matches!(&self.slots[index], Slot::Used(tx) if tx.cancel_requested) {
                self.transition(index, TxState::Aborted);
                self.finish(index, Err(TransactionError::AbortedByApplication), events);
            }
        }
    }

    fn expire_deadlines(&mut self, now: Tick, events: &mut Vec<EngineEvent>) {
        for index in 0..self.slots.len() {
            let expired = matches!(
                &self.slots[index],
                Slot::Used(tx) if tx.state == TxState::AwaitingAck
                    && tx.deadline.is_some_and(|d| now.has_reached(d))
            );
            if expired {
                self.stats.timeouts += 1;
                self.transition(index, TxState::TimedOut);
                self.fail(index, TransactionError::Timeout, false, now, events);
            }
        }
    }

    /// Send the oldest queued response. Returns true if the radio turn was
    /// used (including finding the channel busy).
    fn flush_response<R: Radio + ?Sized>(&mut self, radio: &mut R, now: Tick) -> bool {
        if self.responses.is_empty() || !now.has_reached(self.response_not_before) {
            return false;
        }
        if !radio.channel_is_idle() {
            self.response_not_before = now + self.busy_backoff();
            self.stats.busy_backoffs += 1;
            return true;
        }
        if let Some(wire) = self.responses.pop_front() {
            match radio.transmit(&wire) {
                Ok(()) => self.stats.responses_sent += 1,
                // The peer retransmits and is answered from the receipt cache.
                Err(e) => tracing::warn!(error = %e, "engine: response transmit failed"),
            }
        }
        true
    }

    fn transmit_next<R: Radio + ?Sized>(
        &mut self,
        radio: &mut R,
        now: Tick,
        events: &mut Vec<EngineEvent>,
    ) {
        let Some(index) = self.next_candidate(now) else {
            return;
        };
        self.transition(index, TxState::AwaitingChannel);

        if !radio.channel_is_idle() {
            let backoff = self.busy_backoff();
            self.stats.busy_backoffs += 1;
            if let Slot::Used(tx) = &mut self.slots[index] {
                tx.not_before = now + backoff;
                tracing::trace!(tx = %tx.id, backoff_ms = backoff, "engine: channel busy");
            }
            return;
        }

        let result = match &self.slots[index] {
            Slot::Used(tx) => radio.transmit(&tx.request.wire),
            Slot::Free { .. } => return,
        };
        match result {
            Ok(()) => {
                self.stats.transmissions += 1;
                self.transition(index, TxState::Sent);
                let ack_timeout = self.config.ack_timeout_ms;
                let expects_ack = match &mut self.slots[index] {
                    Slot::Used(tx) if tx.request.expects_ack => {
                        tx.deadline =
                            Some(compute_ack_deadline(now, ack_timeout, tx.request.hops));
                        true
                    }
                    _ => false,
                };
                if expects_ack {
                    self.transition(index, TxState::AwaitingAck);
                } else {
                    self.transition(index, TxState::Acked);
                    self.finish(index, Ok(None), events);
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "engine: transmit failed");
                self.fail(index, TransactionError::Radio(e), false, now, events);
            }
        }
    }

    /// Highest priority, then oldest, eligible transaction whose peer has no
    /// other transaction in flight.
    fn next_candidate(&self, now: Tick) -> Option<usize> {
        let mut best: Option<(usize, &Transaction)> = None;
        for (index, slot) in self.slots.iter().enumerate() {
            let Slot::Used(tx) = slot else { continue };
            if !matches!(tx.state, TxState::Queued | TxState::AwaitingChannel)
                || !now.has_reached(tx.not_before)
                || self.peer_in_flight(tx.peer(), index)
            {
                continue;
            }
            let better = match best {
                None => true,
                Some((_, current)) => {
                    (tx.request.priority, std::cmp::Reverse(tx.sequence))
                        > (current.request.priority, std::cmp::Reverse(current.sequence))
                }
            };
            if better {
                best = Some((index, tx));
            }
        }
        best.map(|(index, _)| index)
    }

    fn peer_in_flight(&self, peer: Did, except: usize) -> bool {
        self.slots.iter().enumerate().any(|(i, s)| {
            i != except && matches!(s, Slot::Used(tx) if tx.peer() == peer && tx.state.is_in_flight())
        })
    }

    fn busy_backoff(&mut self) -> u32 {
        self.rng
            .gen_range(self.config.backoff_min_ms..=self.config.backoff_max_ms)
    }

    // -- state changes ------------------------------------------------------

    fn transition(&mut self, index: usize, to: TxState) {
        if let Slot::Used(tx) = &mut self.slots[index] {
            tracing::trace!(
                tx = %tx.id,
                from = tx.state.name(),
                to = to.name(),
                "engine: transition"
            );
            tx.state = to;
        }
    }

    fn fail(
        &mut self,
        index: usize,
        error: TransactionError,
        fatal: bool,
        now: Tick,
        events: &mut Vec<EngineEvent>,
    ) {
        let max_retries = self.config.max_retries;
        let retry_backoff = self.config.retry_backoff_ms;
        let Slot::Used(tx) = &mut self.slots[index] else {
            return;
        };
        let decision = decide_retry(RetryInput {
            retries: tx.retries,
            max_retries,
            fatal,
        });
        tx.last_error = Some(error.clone());
        match decision {
            RetryDecision::Retry { retries } => {
                tracing::debug!(
                    tx = %tx.id,
                    peer = %tx.peer(),
                    retries,
                    error = %error,
                    "engine: retrying"
                );
                tx.retries = retries;
                tx.deadline = None;
                tx.not_before = now + retry_backoff;
                self.stats.retries += 1;
                self.transition(index, TxState::Queued);
            }
            RetryDecision::Abort => {
                tracing::debug!(tx = %tx.id, peer = %tx.peer(), error = %error, "engine: aborted");
                self.transition(index, TxState::Aborted);
                self.finish(index, Err(error), events);
            }
        }
    }

    /// Free the slot and report the outcome.
    fn finish(
        &mut self,
        index: usize,
        result: Result<Option<u16>, TransactionError>,
        events: &mut Vec<EngineEvent>,
    ) {
        let generation = match &self.slots[index] {
            Slot::Used(tx) => tx.id.generation.wrapping_add(1),
            Slot::Free { .. } => return,
        };
        let Slot::Used(tx) = std::mem::replace(&mut self.slots[index], Slot::Free { generation })
        else {
            return;
        };
        if result.is_ok() {
            self.stats.completed += 1;
        } else {
            self.stats.aborted += 1;
        }
        events.push(EngineEvent::Completed(Outcome {
            tx: tx.id,
            peer: tx.peer(),
            class: tx.request.class,
            purpose: tx.request.purpose,
            retries: tx.retries,
            result,
        }));
    }
}

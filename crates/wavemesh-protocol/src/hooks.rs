//! Application callbacks.
//!
//! Every method has a no-op default, so an application only implements the
//! callbacks it cares about. Hooks are injected at construction and called
//! synchronously from inside `on_tick`/`on_frame_received`.

use wavemesh_core::{Channel, Did, MessageId, NackReason, Nid, PacketClass, Pattern, UnitId};
use wavemesh_crypto::KeySlot;

use crate::transaction::Outcome;
use crate::transfer::TransferState;

/// A message handed to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub from: Did,
    pub class: PacketClass,
    pub message_id: MessageId,
    pub src_unit: UnitId,
    pub dst_unit: UnitId,
    pub pattern: Pattern,
    pub data: Vec<u8>,
    /// Hops left when the frame arrived, `None` for single-hop frames.
    pub hops: Option<u8>,
}

/// Membership and administrative changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// This member was admitted.
    Joined { nid: Nid, did: Did },
    /// This member was removed and is unjoined again.
    Removed,
    /// The coordinator admitted a device.
    DeviceAdmitted { did: Did, serial: u32 },
    /// The coordinator forgot a device.
    DeviceRemoved { did: Did },
    KeyRotated { slot: KeySlot },
    ChannelChanged { channel: Channel },
    AdmissionClosed,
}

pub trait AppHooks {
    /// Override whether a NACK ends the transaction. Called once per NACK
    /// with the reason's default fatality already in `is_fatal`.
    fn adjust_nack_fatality(&mut self, _reason: NackReason, _is_fatal: &mut bool) {}

    /// Supply the next piece of an outgoing stream, `None` once it is done.
    fn next_block_or_stream_payload(&mut self, _transfer: &TransferState) -> Option<Vec<u8>> {
        None
    }

    fn on_message_delivered(&mut self, _delivery: &Delivery) {}

    /// Called exactly once per handle returned from enqueue.
    fn on_transaction_outcome(&mut self, _outcome: &Outcome) {}

    /// Override the hop budget for a frame to `dst`.
    fn adjust_hop_count(&mut self, _dst: Did, _max_hops: &mut u8) {}

    fn on_network_event(&mut self, _event: &NetworkEvent) {}
}

/// Hooks that ignore everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl AppHooks for NoHooks {}

impl<H: AppHooks + ?Sized> AppHooks for &mut H {
    fn adjust_nack_fatality(&mut self, reason: NackReason, is_fatal: &mut bool) {
        (**self).adjust_nack_fatality(reason, is_fatal);
    }

    fn next_block_or_stream_payload(&mut self, transfer: &TransferState) -> Option<Vec<u8>> {
        (**self).next_block_or_stream_payload(transfer)
    }

    fn on_message_delivered(&mut self, delivery: &Delivery) {
        (**self).on_message_delivered(delivery);
    }

    fn on_transaction_outcome(&mut self, outcome: &Outcome) {
        (**self).on_transaction_outcome(outcome);
    }

    fn adjust_hop_count(&mut self, dst: Did, max_hops: &mut u8) {
        (**self).adjust_hop_count(dst, max_hops);
    }

    fn on_network_event(&mut self, event: &NetworkEvent) {
        (**self).on_network_event(event);
    }
}

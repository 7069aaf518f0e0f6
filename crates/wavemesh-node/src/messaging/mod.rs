//! The message coordinator: everything between the radio and the
//! application for one device.
//!
//! [`MessageCoordinator`] holds the role state (member or coordinator), the
//! settings store, the application hooks and the transfer scheduler. All
//! per-device data lives in the [`DeviceContext`] passed into each call, and
//! all work happens inside [`MessageCoordinator::on_tick`] and
//! [`MessageCoordinator::on_frame_received`].
//!
//! Receive path, in order: parse, drop our own echoes, check the network id
//! (admission traffic under the access key is exempt), relay, check the
//! destination, note the sender, then either feed an ACK to the engine or
//! handle the frame and queue its response. Unicast frames are answered from
//! the receipt cache when they repeat within the freshness window.

pub mod coordinator;
pub mod fanout;
pub mod member;
pub mod relay;
pub mod transfers;

use std::collections::VecDeque;

use wavemesh_core::{
    AckDescriptor, Channel, Did, Encryption, Frame, MessageId, NackReason, PacketClass, Pattern,
    Pid, UnitId,
};
use wavemesh_crypto::{CipherKey, KeySlot};
use wavemesh_interfaces::Radio;
use wavemesh_protocol::transaction::constants::DEFAULT_RECEIPT_CAPACITY;
use wavemesh_protocol::transfer::Control;
use wavemesh_protocol::{
    AppHooks, Delivery, EngineEvent, NetworkEvent, Priority, ReceiptCheck, Tick, TransferId,
    TransferKind, TxId, TxPurpose, TxRequest,
};

use crate::admin::AdminCommand;
use crate::config::{DeviceRole, NodeConfig};
use crate::context::{DeviceContext, DropReason};
use crate::error::{ConfigError, EnqueueError, NodeError};
use crate::settings::{BaseParams, SettingsStore};

pub use coordinator::{CoordinatorState, generate_key};
pub use fanout::Destinations;
pub use member::{JoinState, MemberState};
pub use relay::RelayCache;
pub use transfers::Transfers;

/// Application bytes carried by one single-frame message.
pub const SINGLE_BODY_MAX: usize = wavemesh_core::constants::SINGLE_PAYLOAD_LEN - 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageClass {
    Single,
    Block,
    Stream,
}

#[derive(Debug)]
pub enum Role {
    Member(MemberState),
    Coordinator(CoordinatorState),
}

/// One frame for the engine.
pub(crate) struct Outgoing<'a> {
    pub dst: Did,
    pub class: PacketClass,
    pub encryption: Encryption,
    pub payload: &'a [u8],
    pub purpose: TxPurpose,
    pub priority: Priority,
    pub expects_ack: bool,
}

/// Seal a frame and queue it as a transaction.
pub(crate) fn submit<R: Radio, H: AppHooks>(
    ctx: &mut DeviceContext<R>,
    hooks: &mut H,
    out: Outgoing<'_>,
) -> Result<TxId, EnqueueError> {
    let hops = fanout::hop_budget(&ctx.directory, hooks, out.dst, ctx.config().max_hops);
    let message_id = ctx.directory.next_message_id(out.dst);
    let mut frame = Frame::seal(
        Pid::new(out.class, out.encryption),
        ctx.nid(),
        ctx.did(),
        out.dst,
        message_id,
        out.payload,
        &ctx.keys,
    )?;
    if hops > 0 {
        frame = frame.with_hops(hops);
    }
    let request = TxRequest {
        peer: out.dst,
        class: out.class,
        message_id,
        wire: frame.to_bytes(),
        hops,
        expects_ack: out.expects_ack && !out.dst.is_broadcast(),
        purpose: out.purpose,
        priority: out.priority,
    };
    Ok(ctx.engine.submit(request, ctx.now)?)
}

/// Save the base parameters. A failing store is logged, not fatal: the
/// device keeps running on what it has in memory.
pub(crate) fn persist<S: SettingsStore>(store: &mut S, params: &BaseParams) {
    if let Err(e) = store.save_base_params(params) {
        tracing::error!(error = %e, "settings: save failed");
    }
}

fn encode_single(src_unit: UnitId, dst_unit: UnitId, pattern: Pattern, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&[src_unit.0, dst_unit.0, pattern.0, body.len() as u8]);
    out.extend_from_slice(body);
    out
}

fn decode_single(plain: &[u8]) -> Option<(UnitId, UnitId, Pattern, Vec<u8>)> {
    let (header, rest) = plain.split_at_checked(4)?;
    let len = usize::from(header[3]);
    if len > SINGLE_BODY_MAX {
        return None;
    }
    let body = rest.get(..len)?;
    Some((UnitId(header[0]), UnitId(header[1]), Pattern(header[2]), body.to_vec()))
}

/// Wire bytes of recent responses, so a repeated frame gets the exact
/// response it got the first time even if keys changed since.
#[derive(Debug, Default)]
struct ResponseLog {
    entries: VecDeque<(Did, MessageId, Vec<u8>)>,
    capacity: usize,
}

impl ResponseLog {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn remember(&mut self, from: Did, message_id: MessageId, wire: Vec<u8>) {
        if self.capacity == 0 {
            return;
        }
        self.entries
            .retain(|(f, m, _)| !(*f == from && *m == message_id));
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((from, message_id, wire));
    }

    fn get(&self, from: Did, message_id: MessageId) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(f, m, _)| *f == from && *m == message_id)
            .map(|(_, _, wire)| wire.as_slice())
    }
}

pub struct MessageCoordinator<S, H> {
    role: Role,
    store: S,
    hooks: H,
    transfers: Transfers,
    relay_cache: RelayCache,
    responses: ResponseLog,
}

impl<S: SettingsStore, H: AppHooks> MessageCoordinator<S, H> {
    pub fn member(store: S, hooks: H, joined: bool) -> Self {
        Self::with_role(Role::Member(MemberState::new(joined)), store, hooks)
    }

    pub fn coordinator(store: S, hooks: H, max_devices: u8) -> Self {
        Self::with_role(
            Role::Coordinator(CoordinatorState::new(max_devices)),
            store,
            hooks,
        )
    }

    fn with_role(role: Role, store: S, hooks: H) -> Self {
        Self {
            role,
            store,
            hooks,
            transfers: Transfers::default(),
            relay_cache: RelayCache::default(),
            responses: ResponseLog::new(DEFAULT_RECEIPT_CAPACITY),
        }
    }

    /// Load stored parameters and build a ready device from configuration.
    pub fn boot<R: Radio>(
        radio: R,
        config: &NodeConfig,
        mut store: S,
        hooks: H,
    ) -> Result<(DeviceContext<R>, Self), NodeError> {
        let stored = store.load_base_params()?;
        let ctx = DeviceContext::from_config(radio, config, stored)?;
        let mut coordinator = match config.device.role {
            DeviceRole::Coordinator => {
                if !ctx.did().is_coordinator() {
                    return Err(ConfigError::InvalidDid(ctx.did()).into());
                }
                Self::coordinator(store, hooks, config.network.max_devices)
            }
            DeviceRole::Member => Self::member(store, hooks, ctx.is_joined()),
        };
        coordinator.responses = ResponseLog::new(ctx.config().receipt_capacity);
        tracing::info!(
            did = %ctx.did(),
            nid = %ctx.nid(),
            channel = %ctx.params.channel,
            role = ?config.device.role,
            "device started"
        );
        Ok((ctx, coordinator))
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Member join state, `None` on the coordinator.
    pub fn join_state(&self) -> Option<JoinState> {
        match &self.role {
            Role::Member(m) => Some(m.join_state()),
            Role::Coordinator(_) => None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    pub fn transfers(&self) -> &Transfers {
        &self.transfers
    }

    // -- application entry points -------------------------------------------

    /// Queue a message from `local_unit` to every destination. Returns one
    /// handle per target; each gets exactly one outcome. Nothing is queued
    /// when an error is returned.
    pub fn enqueue<R: Radio>(
        &mut self,
        ctx: &mut DeviceContext<R>,
        local_unit: UnitId,
        class: MessageClass,
        payload: &[u8],
        destinations: Destinations,
    ) -> Result<Vec<TxId>, EnqueueError> {
        if !ctx.is_joined() {
            return Err(ConfigError::NotJoined.into());
        }
        if !ctx.keys.has(KeySlot::Network) {
            return Err(ConfigError::MissingKey(KeySlot::Network).into());
        }
        let targets = fanout::resolve(&ctx.directory, local_unit, &destinations)?;
        let free = ctx.config().queue_capacity.saturating_sub(ctx.engine.len());
        if targets.len() > free {
            return Err(EnqueueError::QueueFull);
        }
        let pattern = destinations.pattern();

        let kind = match class {
            MessageClass::Single => {
                if payload.len() > SINGLE_BODY_MAX {
                    return Err(EnqueueError::PayloadTooLong {
                        len: payload.len(),
                        max: SINGLE_BODY_MAX,
                    });
                }
                let mut handles = Vec::with_capacity(targets.len());
                for target in &targets {
                    let body = encode_single(local_unit, target.unit, pattern, payload);
                    handles.push(submit(
                        ctx,
                        &mut self.hooks,
                        Outgoing {
                            dst: target.did,
                            class: PacketClass::Single,
                            encryption: Encryption::Network,
                            payload: &body,
                            purpose: TxPurpose::Application,
                            priority: Priority::Normal,
                            expects_ack: true,
                        },
                    )?);
                }
                return Ok(handles);
            }
            MessageClass::Block => TransferKind::Block,
            MessageClass::Stream => TransferKind::Stream,
        };

        let config = ctx.config();
        if destinations.is_broadcast() {
            return Err(EnqueueError::Unsupported("broadcast transfer"));
        }
        match kind {
            TransferKind::Block if !config.supports_block => {
                return Err(EnqueueError::Unsupported("block"));
            }
            TransferKind::Block if payload.len() > config.max_block_len => {
                return Err(EnqueueError::PayloadTooLong {
                    len: payload.len(),
                    max: config.max_block_len,
                });
            }
            TransferKind::Stream if !config.supports_stream => {
                return Err(EnqueueError::Unsupported("stream"));
            }
            TransferKind::Stream if !ctx.keys.has(KeySlot::Stream) => {
                return Err(ConfigError::MissingKey(KeySlot::Stream).into());
            }
            _ => {}
        }
        let mut handles = Vec::with_capacity(targets.len());
        for target in targets {
            handles.push(self.transfers.start(
                ctx,
                &mut self.hooks,
                kind,
                target,
                local_unit,
                pattern,
                payload.to_vec(),
            )?);
        }
        Ok(handles)
    }

    /// Cancel a handle returned from [`enqueue`](Self::enqueue). Takes effect
    /// at the next tick; the outcome is `AbortedByApplication`.
    pub fn cancel<R: Radio>(&mut self, ctx: &mut DeviceContext<R>, tx: TxId) -> bool {
        match self.transfers.by_handle(tx) {
            Some(id) => self.cancel_transfer(ctx, id),
            None => ctx.engine.cancel(tx),
        }
    }

    pub fn cancel_transfer<R: Radio>(&mut self, ctx: &mut DeviceContext<R>, transfer: TransferId) -> bool {
        self.transfers.cancel(ctx, &mut self.hooks, transfer)
    }

    /// Ask the sender of an inbound transfer to change chunk size, channel
    /// or data rate. Sent as the NACK of its next chunk.
    pub fn request_transfer_adjustment<R: Radio>(
        &mut self,
        ctx: &DeviceContext<R>,
        from: Did,
        reason: NackReason,
        value: u16,
    ) -> bool {
        self.transfers
            .request_adjustment(ctx.config(), from, reason, value)
    }

    pub fn request_admission<R: Radio>(&mut self, ctx: &mut DeviceContext<R>) -> Result<TxId, EnqueueError> {
        match &mut self.role {
            Role::Member(m) => m.request_admission(ctx, &mut self.hooks),
            Role::Coordinator(_) => Err(EnqueueError::Unsupported("admission request on coordinator")),
        }
    }

    pub fn open_admission<R: Radio>(
        &mut self,
        ctx: &mut DeviceContext<R>,
        duration_ms: u32,
    ) -> Result<(), EnqueueError> {
        let c = self.coordinator_state()?;
        Ok(c.open_admission(ctx, duration_ms)?)
    }

    pub fn close_admission(&mut self) {
        if let Role::Coordinator(c) = &mut self.role
            && c.close_admission()
        {
            self.hooks.on_network_event(&NetworkEvent::AdmissionClosed);
        }
    }

    /// Distribute a new key to every admitted device, then switch to it.
    pub fn rotate_key<R: Radio>(
        &mut self,
        ctx: &mut DeviceContext<R>,
        slot: KeySlot,
        key: CipherKey,
    ) -> Result<Vec<TxId>, EnqueueError> {
        let Role::Coordinator(c) = &mut self.role else {
            return Err(EnqueueError::Unsupported("key rotation on member"));
        };
        c.rotate_key(ctx, &mut self.store, &mut self.hooks, slot, key)
    }

    /// Move every admitted device to `channel`, then follow.
    pub fn change_channel<R: Radio>(
        &mut self,
        ctx: &mut DeviceContext<R>,
        channel: Channel,
    ) -> Result<Vec<TxId>, EnqueueError> {
        let Role::Coordinator(c) = &mut self.role else {
            return Err(EnqueueError::Unsupported("channel change on member"));
        };
        c.change_channel(ctx, &mut self.store, &mut self.hooks, channel)
    }

    pub fn remove_device<R: Radio>(&mut self, ctx: &mut DeviceContext<R>, did: Did) -> Result<TxId, EnqueueError> {
        let Role::Coordinator(c) = &mut self.role else {
            return Err(EnqueueError::Unsupported("device removal on member"));
        };
        c.remove_device(ctx, &mut self.hooks, did)
    }

    fn coordinator_state(&mut self) -> Result<&mut CoordinatorState, EnqueueError> {
        match &mut self.role {
            Role::Coordinator(c) => Ok(c),
            Role::Member(_) => Err(EnqueueError::Unsupported("coordinator command on member")),
        }
    }

    // -- tick ---------------------------------------------------------------

    /// Advance the device to `now`: drain the radio, run housekeeping,
    /// schedule transfer frames and poll the engine once.
    pub fn on_tick<R: Radio>(&mut self, ctx: &mut DeviceContext<R>, now: Tick) {
        ctx.now = now;
        while let Some(bytes) = ctx.radio.try_receive() {
            self.on_frame_received(ctx, &bytes);
        }

        ctx.receipts.expire(now);
        let timeout = ctx.config().transfer_idle_timeout_ms;
        self.transfers.expire_inbound(now, timeout);
        if let Role::Coordinator(c) = &mut self.role
            && c.expire_admission(now)
        {
            self.hooks.on_network_event(&NetworkEvent::AdmissionClosed);
        }

        self.transfers.pump(ctx, &mut self.hooks);

        // Responses leave on the channel the request came in on.
        if ctx.engine.pending_responses() == 0 {
            let (channel, data_rate) = self.transfers.tuning();
            let channel = channel.unwrap_or(ctx.params.channel);
            let data_rate = data_rate.unwrap_or(ctx.params.data_rate);
            ctx.tune(channel, data_rate);
        }

        let events = ctx.engine.poll(&mut ctx.radio, now);
        self.handle_events(ctx, events);
        ctx.sync_stats();
    }

    fn handle_events<R: Radio>(&mut self, ctx: &mut DeviceContext<R>, events: Vec<EngineEvent>) {
        for event in events {
            match event {
                EngineEvent::Completed(outcome) => match outcome.purpose {
                    TxPurpose::Application => self.hooks.on_transaction_outcome(&outcome),
                    TxPurpose::Transfer(_) => {
                        self.transfers.on_outcome(ctx, &mut self.hooks, &outcome);
                    }
                    TxPurpose::Admin => match &mut self.role {
                        Role::Member(m) => m.on_outcome(&outcome),
                        Role::Coordinator(c) => {
                            c.on_outcome(ctx, &mut self.store, &mut self.hooks, &outcome);
                        }
                    },
                    TxPurpose::Relay => {
                        if let Err(e) = &outcome.result {
                            tracing::debug!(peer = %outcome.peer, error = %e, "relay: forward failed");
                        }
                    }
                },
                EngineEvent::AdjustmentRequested {
                    tx,
                    transfer,
                    reason,
                    value,
                    ..
                } => {
                    self.transfers
                        .on_adjustment(ctx, &mut self.hooks, transfer, tx, reason, value);
                }
            }
        }
    }

    // -- receive ------------------------------------------------------------

    /// Handle one frame from the radio.
    pub fn on_frame_received<R: Radio>(&mut self, ctx: &mut DeviceContext<R>, bytes: &[u8]) {
        ctx.stats.frames_received += 1;
        let frame = match Frame::parse(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::trace!(error = %e, len = bytes.len(), "rx: dropped");
                ctx.stats.record_drop(DropReason::from_frame_error(&e));
                return;
            }
        };
        if ctx.is_joined() && frame.src == ctx.did() {
            ctx.stats.record_drop(DropReason::OwnFrame);
            return;
        }
        let admission = frame.pid.encryption == Encryption::Access;
        if frame.nid != ctx.nid() && !admission {
            tracing::trace!(nid = %frame.nid, "rx: foreign network");
            ctx.stats.record_drop(DropReason::ForeignNetwork);
            return;
        }

        let addressed = frame.dst == ctx.did() || frame.is_broadcast();
        let relayed = frame.dst != ctx.did() && self.relay(ctx, &frame);
        if !addressed {
            if !relayed {
                ctx.stats.record_drop(DropReason::NotAddressed);
            }
            return;
        }

        let hops = frame.pid.multi_hop.then_some(frame.hops);
        ctx.directory
            .note_received(frame.src, frame.message_id, hops, ctx.now);

        if frame.pid.class == PacketClass::Ack {
            self.on_ack_frame(ctx, &frame);
            return;
        }

        // Unjoined devices share one DID, so their message ids collide.
        let tracked = !frame.src.is_unassigned();
        if tracked
            && let ReceiptCheck::Duplicate(response) =
                ctx.receipts.check(frame.src, frame.message_id, ctx.now)
        {
            ctx.stats.duplicates += 1;
            tracing::trace!(from = %frame.src, message_id = frame.message_id.0, "rx: duplicate");
            if frame.is_broadcast() {
                return;
            }
            if !ctx.config().accept_duplicates {
                match self.responses.get(frame.src, frame.message_id) {
                    Some(wire) => {
                        ctx.engine.respond(wire.to_vec());
                        ctx.stats.responses_queued += 1;
                    }
                    None => self.send_response(ctx, &frame, response),
                }
                return;
            }
        }

        let plain = match frame.open(&ctx.keys) {
            Ok(plain) => plain,
            Err(e) => {
                tracing::trace!(error = %e, from = %frame.src, "rx: cannot open");
                ctx.stats.record_drop(DropReason::Undecryptable);
                return;
            }
        };

        if frame.is_broadcast() {
            if tracked {
                ctx.receipts
                    .record(frame.src, frame.message_id, ctx.now, AckDescriptor::ack());
            }
            if frame.pid.class == PacketClass::Single {
                self.deliver_single(ctx, &frame, &plain);
            }
            return;
        }

        let (response, effect) = self.handle_unicast(ctx, &frame, &plain);
        if let Some(descriptor) = response {
            if tracked {
                ctx.receipts
                    .record(frame.src, frame.message_id, ctx.now, descriptor);
            }
            self.send_response(ctx, &frame, descriptor);
        }
        if let (Some(effect), Role::Member(m)) = (effect, &mut self.role) {
            m.apply(effect, ctx, &mut self.store, &mut self.hooks);
        }
    }

    fn on_ack_frame<R: Radio>(&mut self, ctx: &mut DeviceContext<R>, frame: &Frame) {
        if frame.is_broadcast() {
            ctx.stats.record_drop(DropReason::NotAddressed);
            return;
        }
        let descriptor = match frame
            .open(&ctx.keys)
            .and_then(|plain| AckDescriptor::from_bytes(&plain))
        {
            Ok(descriptor) => descriptor,
            Err(e) => {
                tracing::trace!(error = %e, from = %frame.src, "rx: bad ack");
                ctx.stats.record_drop(DropReason::from_frame_error(&e));
                return;
            }
        };
        let events =
            ctx.engine
                .on_ack(frame.src, frame.message_id, descriptor, ctx.now, &mut self.hooks);
        self.handle_events(ctx, events);
    }

    fn handle_unicast<R: Radio>(
        &mut self,
        ctx: &mut DeviceContext<R>,
        frame: &Frame,
        plain: &[u8],
    ) -> (Option<AckDescriptor>, Option<member::MemberEffect>) {
        let class = frame.pid.class;
        if class != PacketClass::Admin && (frame.src.is_unassigned() || !ctx.is_joined()) {
            return (Some(AckDescriptor::nack(NackReason::NotJoined)), None);
        }
        match class {
            PacketClass::Single => (Some(self.deliver_single(ctx, frame, plain)), None),
            PacketClass::Admin => {
                let command = match AdminCommand::from_bytes(plain) {
                    Ok(command) => command,
                    Err(e) => {
                        tracing::debug!(error = %e, from = %frame.src, "rx: bad admin payload");
                        return (Some(AckDescriptor::nack(NackReason::Unsupported)), None);
                    }
                };
                tracing::debug!(command = command.name(), from = %frame.src, "rx: admin command");
                match &mut self.role {
                    Role::Member(m) => m.handle_admin(ctx, frame.src, command),
                    Role::Coordinator(c) => (
                        c.handle_admin(ctx, &mut self.hooks, frame.src, command),
                        None,
                    ),
                }
            }
            PacketClass::Control => match Control::from_bytes(plain) {
                Ok(control) => (
                    self.transfers
                        .on_control(ctx, &mut self.hooks, frame, control),
                    None,
                ),
                Err(e) => {
                    tracing::debug!(error = %e, from = %frame.src, "rx: bad control payload");
                    (Some(AckDescriptor::nack(NackReason::Generic)), None)
                }
            },
            PacketClass::Block | PacketClass::Stream => (
                self.transfers.on_chunk(ctx, &mut self.hooks, frame, plain),
                None,
            ),
            PacketClass::Ack => (None, None),
        }
    }

    fn deliver_single<R: Radio>(
        &mut self,
        ctx: &mut DeviceContext<R>,
        frame: &Frame,
        plain: &[u8],
    ) -> AckDescriptor {
        let Some((src_unit, dst_unit, pattern, data)) = decode_single(plain) else {
            tracing::debug!(from = %frame.src, "rx: malformed single payload");
            return AckDescriptor::nack(NackReason::Generic);
        };
        ctx.stats.delivered += 1;
        self.hooks.on_message_delivered(&Delivery {
            from: frame.src,
            class: PacketClass::Single,
            message_id: frame.message_id,
            src_unit,
            dst_unit,
            pattern,
            data,
            hops: frame.pid.multi_hop.then_some(frame.hops),
        });
        AckDescriptor::ack()
    }

    /// Queue the ACK/NACK for `incoming`, under the same encryption.
    fn send_response<R: Radio>(
        &mut self,
        ctx: &mut DeviceContext<R>,
        incoming: &Frame,
        descriptor: AckDescriptor,
    ) {
        let hops = fanout::hop_budget(
            &ctx.directory,
            &mut self.hooks,
            incoming.src,
            ctx.config().max_hops,
        );
        let hops = if incoming.pid.multi_hop { hops.max(1) } else { hops };
        let sealed = Frame::seal(
            Pid::new(PacketClass::Ack, incoming.pid.encryption),
            ctx.nid(),
            ctx.did(),
            incoming.src,
            incoming.message_id,
            &descriptor.to_bytes(),
            &ctx.keys,
        );
        match sealed {
            Ok(frame) => {
                let frame = if hops > 0 { frame.with_hops(hops) } else { frame };
                let wire = frame.to_bytes();
                self.responses
                    .remember(incoming.src, incoming.message_id, wire.clone());
                ctx.engine.respond(wire);
                ctx.stats.responses_queued += 1;
                tracing::trace!(
                    to = %incoming.src,
                    message_id = incoming.message_id.0,
                    ack = descriptor.is_ack(),
                    "tx: response queued"
                );
            }
            Err(e) => tracing::warn!(error = %e, to = %incoming.src, "tx: cannot seal response"),
        }
    }

    /// Forward a multi-hop frame addressed to someone else. Returns true if
    /// it was queued.
    fn relay<R: Radio>(&mut self, ctx: &mut DeviceContext<R>, frame: &Frame) -> bool {
        if !ctx.params.relay || !ctx.is_joined() {
            return false;
        }
        let Some(next) = frame.relayed() else {
            return false;
        };
        // Shorter than any sender's retry interval, so retries get through.
        let hold = ctx.config().ack_timeout_ms;
        if !self.relay_cache.insert(frame.relay_key(), ctx.now, hold) {
            return false;
        }
        let request = TxRequest {
            peer: frame.dst,
            class: frame.pid.class,
            message_id: frame.message_id,
            wire: next.to_bytes(),
            hops: next.hops,
            expects_ack: false,
            purpose: TxPurpose::Relay,
            priority: Priority::Normal,
        };
        match ctx.engine.submit(request, ctx.now) {
            Ok(tx) => {
                ctx.stats.relayed += 1;
                tracing::trace!(
                    src = %frame.src,
                    dst = %frame.dst,
                    hops = next.hops,
                    tx = %tx,
                    "relay: forwarding"
                );
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "relay: dropped");
                false
            }
        }
    }
}

impl<S, H> std::fmt::Debug for MessageCoordinator<S, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCoordinator")
            .field("role", &self.role)
            .field("outbound", &self.transfers.outbound().len())
            .field("inbound", &self.transfers.inbound().len())
            .finish_non_exhaustive()
    }
}

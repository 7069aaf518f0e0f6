//! Coordinator role: admission and administrative commands.
//!
//! Admission only happens inside a window opened by the application. A
//! member asks with `AdmissionRequest`; the coordinator acknowledges it,
//! picks a DID (the one the serial had before, or the lowest free one) and
//! sends an `Invite` to the unassigned address. The device counts as
//! admitted once the invite is acknowledged.
//!
//! Key rotations and channel changes fan out to every admitted device; the
//! coordinator switches itself once all of those transactions have ended,
//! successful or not.

use wavemesh_core::{AckDescriptor, Channel, Did, NackReason, PacketClass};
use wavemesh_crypto::{CipherKey, KeySlot};
use wavemesh_interfaces::Radio;
use wavemesh_protocol::{AppHooks, NetworkEvent, Outcome, Priority, Tick, TxId, TxPurpose};

use super::{Outgoing, persist, submit};
use crate::admin::AdminCommand;
use crate::context::DeviceContext;
use crate::directory::PeerInfo;
use crate::error::{ConfigError, EnqueueError};
use crate::settings::{AdmittedDevice, SettingsStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingInvite {
    serial: u32,
    did: Did,
    tx: TxId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NetworkChange {
    Key { slot: KeySlot, key: CipherKey },
    Channel(Channel),
}

#[derive(Debug, Clone)]
struct PendingChange {
    change: NetworkChange,
    txs: Vec<TxId>,
}

#[derive(Debug, Clone)]
pub struct CoordinatorState {
    max_devices: u8,
    admission_until: Option<Tick>,
    invites: Vec<PendingInvite>,
    change: Option<PendingChange>,
    removals: Vec<(TxId, Did)>,
}

/// A fresh random key for [`crate::messaging::MessageCoordinator::rotate_key`].
pub fn generate_key() -> CipherKey {
    CipherKey::new(rand::random())
}

impl CoordinatorState {
    pub fn new(max_devices: u8) -> Self {
        Self {
            max_devices,
            admission_until: None,
            invites: Vec::new(),
            change: None,
            removals: Vec::new(),
        }
    }

    pub fn admission_open(&self, now: Tick) -> bool {
        self.admission_until.is_some_and(|until| now.is_before(until))
    }

    pub fn change_in_progress(&self) -> bool {
        self.change.is_some()
    }

    pub(crate) fn open_admission<R: Radio>(
        &mut self,
        ctx: &DeviceContext<R>,
        duration_ms: u32,
    ) -> Result<(), ConfigError> {
        if !ctx.keys.has(KeySlot::Access) {
            return Err(ConfigError::MissingKey(KeySlot::Access));
        }
        if !ctx.keys.has(KeySlot::Network) {
            return Err(ConfigError::MissingKey(KeySlot::Network));
        }
        let until = ctx.now + duration_ms;
        self.admission_until = Some(until);
        tracing::info!(until = %until, "coordinator: admission open");
        Ok(())
    }

    /// Close the window. Returns true if it was open.
    pub(crate) fn close_admission(&mut self) -> bool {
        let was_open = self.admission_until.take().is_some();
        if was_open {
            tracing::info!("coordinator: admission closed");
        }
        was_open
    }

    /// Close the window if it ran out.
    pub(crate) fn expire_admission(&mut self, now: Tick) -> bool {
        match self.admission_until {
            Some(until) if now.has_reached(until) => self.close_admission(),
            _ => false,
        }
    }

    pub(crate) fn handle_admin<R: Radio, H: AppHooks>(
        &mut self,
        ctx: &mut DeviceContext<R>,
        hooks: &mut H,
        from: Did,
        command: AdminCommand,
    ) -> Option<AckDescriptor> {
        let AdminCommand::AdmissionRequest { serial } = command else {
            return Some(AckDescriptor::nack(NackReason::Unsupported));
        };
        if !from.is_unassigned() && ctx.params.serial_of(from) != Some(serial) {
            return Some(AckDescriptor::nack(NackReason::Unsupported));
        }
        if !self.admission_open(ctx.now) {
            tracing::debug!(serial, "coordinator: admission request outside window");
            return Some(AckDescriptor::nack(NackReason::AdmissionClosed));
        }
        if self.invites.iter().any(|i| i.serial == serial) {
            return Some(AckDescriptor::ack());
        }
        let Some(did) = self.allocate_did(ctx, serial) else {
            tracing::warn!(serial, "coordinator: no free DID");
            return Some(AckDescriptor::nack(NackReason::AdmissionClosed));
        };
        let Some(network_key) = ctx.params.network_key.clone() else {
            return Some(AckDescriptor::nack(NackReason::NotJoined));
        };
        let invite = AdminCommand::Invite {
            serial,
            nid: ctx.params.nid,
            did,
            channel: ctx.params.channel,
            network_key,
        };
        match submit(
            ctx,
            hooks,
            Outgoing {
                dst: Did::UNASSIGNED,
                class: PacketClass::Admin,
                encryption: invite.encryption(),
                payload: &invite.to_bytes(),
                purpose: TxPurpose::Admin,
                priority: Priority::High,
                expects_ack: true,
            },
        ) {
            Ok(tx) => {
                tracing::debug!(serial, did = %did, tx = %tx, "coordinator: inviting device");
                self.invites.push(PendingInvite { serial, did, tx });
                Some(AckDescriptor::ack())
            }
            Err(e) => {
                tracing::warn!(serial, error = %e, "coordinator: invite not queued");
                Some(AckDescriptor::nack(NackReason::Busy))
            }
        }
    }

    fn allocate_did<R>(&self, ctx: &DeviceContext<R>, serial: u32) -> Option<Did> {
        if let Some(known) = ctx.params.registry.iter().find(|d| d.serial == serial) {
            return Some(known.did);
        }
        (1..=self.max_devices).map(Did).find(|did| {
            ctx.params.registry.iter().all(|d| d.did != *did)
                && self.invites.iter().all(|i| i.did != *did)
        })
    }

    pub(crate) fn rotate_key<R: Radio, S: SettingsStore, H: AppHooks>(
        &mut self,
        ctx: &mut DeviceContext<R>,
        store: &mut S,
        hooks: &mut H,
        slot: KeySlot,
        key: CipherKey,
    ) -> Result<Vec<TxId>, EnqueueError> {
        let command = AdminCommand::RotateKey {
            slot,
            key: key.clone(),
        };
        self.begin_change(ctx, store, hooks, command, NetworkChange::Key { slot, key })
    }

    pub(crate) fn change_channel<R: Radio, S: SettingsStore, H: AppHooks>(
        &mut self,
        ctx: &mut DeviceContext<R>,
        store: &mut S,
        hooks: &mut H,
        channel: Channel,
    ) -> Result<Vec<TxId>, EnqueueError> {
        if channel.0 >= ctx.config().channel_count {
            return Err(ConfigError::Invalid(format!("channel {channel} out of range")).into());
        }
        let command = AdminCommand::ChangeChannel { channel };
        self.begin_change(ctx, store, hooks, command, NetworkChange::Channel(channel))
    }

    fn begin_change<R: Radio, S: SettingsStore, H: AppHooks>(
        &mut self,
        ctx: &mut DeviceContext<R>,
        store: &mut S,
        hooks: &mut H,
        command: AdminCommand,
        change: NetworkChange,
    ) -> Result<Vec<TxId>, EnqueueError> {
        if self.change.is_some() {
            return Err(EnqueueError::Busy("network change in progress"));
        }
        if !ctx.keys.has(KeySlot::Network) {
            return Err(ConfigError::MissingKey(KeySlot::Network).into());
        }
        let members: Vec<Did> = ctx.params.registry.iter().map(|d| d.did).collect();
        let free = ctx.config().queue_capacity.saturating_sub(ctx.engine.len());
        if members.len() > free {
            return Err(EnqueueError::QueueFull);
        }
        let payload = command.to_bytes();
        let mut txs = Vec::with_capacity(members.len());
        for did in members {
            txs.push(submit(
                ctx,
                hooks,
                Outgoing {
                    dst: did,
                    class: PacketClass::Admin,
                    encryption: command.encryption(),
                    payload: &payload,
                    purpose: TxPurpose::Admin,
                    priority: Priority::High,
                    expects_ack: true,
                },
            )?);
        }
        tracing::info!(command = command.name(), members = txs.len(), "coordinator: network change started");
        if txs.is_empty() {
            apply_change(ctx, store, hooks, change);
        } else {
            self.change = Some(PendingChange {
                change,
                txs: txs.clone(),
            });
        }
        Ok(txs)
    }

    pub(crate) fn remove_device<R: Radio, H: AppHooks>(
        &mut self,
        ctx: &mut DeviceContext<R>,
        hooks: &mut H,
        did: Did,
    ) -> Result<TxId, EnqueueError> {
        if ctx.params.serial_of(did).is_none() {
            return Err(ConfigError::InvalidDid(did).into());
        }
        if self.removals.iter().any(|(_, d)| *d == did) {
            return Err(EnqueueError::Busy("removal in progress"));
        }
        let command = AdminCommand::RemoveDevice;
        let tx = submit(
            ctx,
            hooks,
            Outgoing {
                dst: did,
                class: PacketClass::Admin,
                encryption: command.encryption(),
                payload: &command.to_bytes(),
                purpose: TxPurpose::Admin,
                priority: Priority::High,
                expects_ack: true,
            },
        )?;
        self.removals.push((tx, did));
        Ok(tx)
    }

    pub(crate) fn on_outcome<R: Radio, S: SettingsStore, H: AppHooks>(
        &mut self,
        ctx: &mut DeviceContext<R>,
        store: &mut S,
        hooks: &mut H,
        outcome: &Outcome,
    ) {
        if let Some(pos) = self.invites.iter().position(|i| i.tx == outcome.tx) {
            let invite = self.invites.swap_remove(pos);
            match &outcome.result {
                Ok(_) => admit(ctx, store, hooks, invite.did, invite.serial),
                Err(e) => {
                    tracing::warn!(serial = invite.serial, error = %e, "coordinator: invite failed");
                }
            }
            return;
        }

        if let Some(pos) = self.removals.iter().position(|(tx, _)| *tx == outcome.tx) {
            let (_, did) = self.removals.swap_remove(pos);
            if let Err(e) = &outcome.result {
                tracing::warn!(did = %did, error = %e, "coordinator: removal not acknowledged");
            }
            ctx.params.registry.retain(|d| d.did != did);
            ctx.directory.remove_peer(did);
            ctx.receipts.forget(did);
            persist(store, &ctx.params);
            tracing::info!(did = %did, "coordinator: device removed");
            hooks.on_network_event(&NetworkEvent::DeviceRemoved { did });
            return;
        }

        let finished = match &mut self.change {
            Some(pending) if pending.txs.contains(&outcome.tx) => {
                if let Err(e) = &outcome.result {
                    tracing::warn!(peer = %outcome.peer, error = %e, "coordinator: member missed network change");
                }
                pending.txs.retain(|tx| *tx != outcome.tx);
                pending.txs.is_empty()
            }
            _ => false,
        };
        if finished && let Some(pending) = self.change.take() {
            apply_change(ctx, store, hooks, pending.change);
        }
    }
}

fn admit<R: Radio, S: SettingsStore, H: AppHooks>(
    ctx: &mut DeviceContext<R>,
    store: &mut S,
    hooks: &mut H,
    did: Did,
    serial: u32,
) {
    ctx.params
        .registry
        .retain(|d| d.did != did && d.serial != serial);
    ctx.params.registry.push(AdmittedDevice { did, serial });
    if ctx.directory.lookup_peer(did).is_none()
        && let Err(e) = ctx.directory.upsert_peer(PeerInfo::new(did))
    {
        tracing::warn!(did = %did, error = %e, "coordinator: admitted device not in directory");
    }
    persist(store, &ctx.params);
    tracing::info!(did = %did, serial, "coordinator: device admitted");
    hooks.on_network_event(&NetworkEvent::DeviceAdmitted { did, serial });
}

fn apply_change<R: Radio, S: SettingsStore, H: AppHooks>(
    ctx: &mut DeviceContext<R>,
    store: &mut S,
    hooks: &mut H,
    change: NetworkChange,
) {
    let event = match change {
        NetworkChange::Key { slot, key } => {
            ctx.params.set_key(slot, Some(key));
            ctx.refresh_keys();
            NetworkEvent::KeyRotated { slot }
        }
        NetworkChange::Channel(channel) => {
            ctx.params.channel = channel;
            NetworkEvent::ChannelChanged { channel }
        }
    };
    persist(store, &ctx.params);
    tracing::info!(?event, "coordinator: network change applied");
    hooks.on_network_event(&event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Directory;
    use crate::settings::BaseParams;
    use wavemesh_core::Nid;
    use wavemesh_interfaces::{SimMedium, SimRadio};
    use wavemesh_protocol::{EngineConfig, NoHooks};

    fn coordinator_ctx() -> DeviceContext<SimRadio> {
        let mut params = BaseParams::unjoined(1);
        params.did = Did::COORDINATOR;
        params.nid = Nid(0x4242);
        params.network_key = Some(CipherKey::new([1; 16]));
        params.access_key = Some(CipherKey::new([2; 16]));
        DeviceContext::new(
            SimMedium::new().attach(),
            params,
            Directory::new(8, 4),
            EngineConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_request_outside_window_is_refused() {
        let mut ctx = coordinator_ctx();
        let mut state = CoordinatorState::new(4);
        let response = state.handle_admin(
            &mut ctx,
            &mut NoHooks,
            Did::UNASSIGNED,
            AdminCommand::AdmissionRequest { serial: 9 },
        );
        assert_eq!(response, Some(AckDescriptor::nack(NackReason::AdmissionClosed)));
        assert!(ctx.engine.is_empty());
    }

    #[test]
    fn test_request_inside_window_sends_invite() {
        let mut ctx = coordinator_ctx();
        let mut state = CoordinatorState::new(4);
        state.open_admission(&ctx, 1_000).unwrap();
        let response = state.handle_admin(
            &mut ctx,
            &mut NoHooks,
            Did::UNASSIGNED,
            AdminCommand::AdmissionRequest { serial: 9 },
        );
        assert_eq!(response, Some(AckDescriptor::ack()));
        let tx = ctx.engine.transactions().next().unwrap();
        assert_eq!(tx.peer(), Did::UNASSIGNED);
        assert_eq!(tx.request.purpose, TxPurpose::Admin);
        assert_eq!(state.invites[0].did, Did(1));

        // A repeated request for the same serial does not invite twice.
        state.handle_admin(
            &mut ctx,
            &mut NoHooks,
            Did::UNASSIGNED,
            AdminCommand::AdmissionRequest { serial: 9 },
        );
        assert_eq!(ctx.engine.len(), 1);
    }

    #[test]
    fn test_did_pool_is_bounded() {
        let mut ctx = coordinator_ctx();
        ctx.params.registry.push(AdmittedDevice { did: Did(1), serial: 100 });
        let state = CoordinatorState::new(1);
        assert_eq!(state.allocate_did(&ctx, 101), None);
        assert_eq!(state.allocate_did(&ctx, 100), Some(Did(1)), "known serial keeps its DID");
    }

    #[test]
    fn test_window_expires() {
        let ctx = coordinator_ctx();
        let mut state = CoordinatorState::new(4);
        state.open_admission(&ctx, 100).unwrap();
        assert!(state.admission_open(Tick(99)));
        assert!(!state.expire_admission(Tick(50)));
        assert!(state.expire_admission(Tick(100)));
        assert!(!state.admission_open(Tick(100)));
        assert!(!state.expire_admission(Tick(200)), "reported once");
    }

    #[test]
    fn test_change_without_members_applies_at_once() {
        let mut ctx = coordinator_ctx();
        let mut state = CoordinatorState::new(4);
        let mut store = crate::settings::MemoryStore::new();
        let txs = state
            .change_channel(&mut ctx, &mut store, &mut NoHooks, Channel(3))
            .unwrap();
        assert!(txs.is_empty());
        assert_eq!(ctx.params.channel, Channel(3));
        assert_eq!(store.saves(), 1);
        assert!(!state.change_in_progress());
    }

    #[test]
    fn test_remove_unknown_device_rejected() {
        let mut ctx = coordinator_ctx();
        let mut state = CoordinatorState::new(4);
        assert_eq!(
            state.remove_device(&mut ctx, &mut NoHooks, Did(3)),
            Err(EnqueueError::Config(ConfigError::InvalidDid(Did(3))))
        );
    }
}

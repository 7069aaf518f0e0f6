//! Member role: joining a network and obeying the coordinator.

use wavemesh_core::{AckDescriptor, Channel, Did, Encryption, NackReason, Nid, PacketClass};
use wavemesh_crypto::{CipherKey, KeySlot};
use wavemesh_interfaces::Radio;
use wavemesh_protocol::{AppHooks, NetworkEvent, Outcome, Priority, TxId, TxPurpose};

use super::{Outgoing, persist, submit};
use crate::admin::AdminCommand;
use crate::context::DeviceContext;
use crate::directory::PeerInfo;
use crate::error::{ConfigError, EnqueueError};
use crate::settings::{BaseParams, SettingsStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinState {
    Unjoined,
    /// An admission request was sent; waiting for the invite.
    Requesting,
    Joined,
}

/// A change the coordinator asked for, applied once its ACK is queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MemberEffect {
    Adopt {
        nid: Nid,
        did: Did,
        channel: Channel,
        network_key: CipherKey,
    },
    RotateKey {
        slot: KeySlot,
        key: CipherKey,
    },
    ChangeChannel(Channel),
    Reset,
}

#[derive(Debug, Clone)]
pub struct MemberState {
    join: JoinState,
    request_tx: Option<TxId>,
}

impl MemberState {
    pub fn new(joined: bool) -> Self {
        Self {
            join: if joined {
                JoinState::Joined
            } else {
                JoinState::Unjoined
            },
            request_tx: None,
        }
    }

    pub fn join_state(&self) -> JoinState {
        self.join
    }

    pub(crate) fn request_admission<R: Radio, H: AppHooks>(
        &mut self,
        ctx: &mut DeviceContext<R>,
        hooks: &mut H,
    ) -> Result<TxId, EnqueueError> {
        if ctx.is_joined() {
            return Err(EnqueueError::Busy("already joined"));
        }
        if self.request_tx.is_some() {
            return Err(EnqueueError::Busy("admission request in flight"));
        }
        if !ctx.keys.has(KeySlot::Access) {
            return Err(ConfigError::MissingKey(KeySlot::Access).into());
        }
        let request = AdminCommand::AdmissionRequest {
            serial: ctx.params.serial,
        };
        let tx = submit(
            ctx,
            hooks,
            Outgoing {
                dst: Did::COORDINATOR,
                class: PacketClass::Admin,
                encryption: request.encryption(),
                payload: &request.to_bytes(),
                purpose: TxPurpose::Admin,
                priority: Priority::Normal,
                expects_ack: true,
            },
        )?;
        tracing::debug!(serial = ctx.params.serial, tx = %tx, "member: admission requested");
        self.request_tx = Some(tx);
        self.join = JoinState::Requesting;
        Ok(tx)
    }

    /// Decide the response to an administrative command and the change to
    /// apply after it was queued.
    pub(crate) fn handle_admin<R: Radio>(
        &mut self,
        ctx: &DeviceContext<R>,
        from: Did,
        command: AdminCommand,
    ) -> (Option<AckDescriptor>, Option<MemberEffect>) {
        match command {
            AdminCommand::Invite {
                serial,
                nid,
                did,
                channel,
                network_key,
            } => {
                // Invites for other devices are none of our business.
                if serial != ctx.params.serial || !from.is_coordinator() {
                    return (None, None);
                }
                if !did.is_member() || channel.0 >= ctx.config().channel_count {
                    return (Some(AckDescriptor::nack(NackReason::Generic)), None);
                }
                (
                    Some(AckDescriptor::ack()),
                    Some(MemberEffect::Adopt {
                        nid,
                        did,
                        channel,
                        network_key,
                    }),
                )
            }
            AdminCommand::AdmissionRequest { .. } => {
                (Some(AckDescriptor::nack(NackReason::Unsupported)), None)
            }
            _ if !from.is_coordinator() => {
                (Some(AckDescriptor::nack(NackReason::Unsupported)), None)
            }
            _ if !ctx.is_joined() => (Some(AckDescriptor::nack(NackReason::NotJoined)), None),
            AdminCommand::RotateKey { slot, key } => (
                Some(AckDescriptor::ack()),
                Some(MemberEffect::RotateKey { slot, key }),
            ),
            AdminCommand::ChangeChannel { channel } => {
                if channel.0 >= ctx.config().channel_count {
                    return (Some(AckDescriptor::nack(NackReason::Unsupported)), None);
                }
                (
                    Some(AckDescriptor::ack()),
                    Some(MemberEffect::ChangeChannel(channel)),
                )
            }
            AdminCommand::RemoveDevice => (Some(AckDescriptor::ack()), Some(MemberEffect::Reset)),
        }
    }

    pub(crate) fn apply<R: Radio, S: SettingsStore, H: AppHooks>(
        &mut self,
        effect: MemberEffect,
        ctx: &mut DeviceContext<R>,
        store: &mut S,
        hooks: &mut H,
    ) {
        let event = match effect {
            MemberEffect::Adopt {
                nid,
                did,
                channel,
                network_key,
            } => {
                ctx.params.nid = nid;
                ctx.params.did = did;
                ctx.params.channel = channel;
                ctx.params.network_key = Some(network_key);
                if ctx.directory.lookup_peer(Did::COORDINATOR).is_none()
                    && let Err(e) = ctx.directory.upsert_peer(PeerInfo::new(Did::COORDINATOR))
                {
                    tracing::warn!(error = %e, "member: coordinator not added to directory");
                }
                self.join = JoinState::Joined;
                self.request_tx = None;
                tracing::info!(nid = %nid, did = %did, channel = %channel, "member: joined network");
                NetworkEvent::Joined { nid, did }
            }
            MemberEffect::RotateKey { slot, key } => {
                ctx.params.set_key(slot, Some(key));
                tracing::info!(slot = %slot, "member: key rotated");
                NetworkEvent::KeyRotated { slot }
            }
            MemberEffect::ChangeChannel(channel) => {
                // The radio follows once the ACK has left on the old channel.
                ctx.params.channel = channel;
                tracing::info!(channel = %channel, "member: channel changed");
                NetworkEvent::ChannelChanged { channel }
            }
            MemberEffect::Reset => {
                let mut fresh = BaseParams::unjoined(ctx.params.serial);
                fresh.access_key = ctx.params.access_key.take();
                fresh.relay = ctx.params.relay;
                fresh.channel = ctx.params.channel;
                fresh.data_rate = ctx.params.data_rate;
                ctx.params = fresh;
                ctx.directory.remove_peer(Did::COORDINATOR);
                self.join = JoinState::Unjoined;
                self.request_tx = None;
                tracing::info!("member: removed from network");
                NetworkEvent::Removed
            }
        };
        ctx.refresh_keys();
        persist(store, &ctx.params);
        hooks.on_network_event(&event);
    }

    pub(crate) fn on_outcome(&mut self, outcome: &Outcome) {
        if self.request_tx != Some(outcome.tx) {
            return;
        }
        self.request_tx = None;
        match &outcome.result {
            Ok(_) => {
                tracing::debug!("member: admission request acknowledged, awaiting invite");
            }
            Err(e) if self.join == JoinState::Requesting => {
                tracing::warn!(error = %e, "member: admission request failed");
                self.join = JoinState::Unjoined;
            }
            Err(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Directory;
    use wavemesh_interfaces::SimMedium;
    use wavemesh_protocol::EngineConfig;

    fn unjoined_ctx() -> DeviceContext<wavemesh_interfaces::SimRadio> {
        let mut params = BaseParams::unjoined(42);
        params.access_key = Some(CipherKey::new([7; 16]));
        DeviceContext::new(
            SimMedium::new().attach(),
            params,
            Directory::new(4, 4),
            EngineConfig::default(),
        )
        .unwrap()
    }

    fn invite(serial: u32) -> AdminCommand {
        AdminCommand::Invite {
            serial,
            nid: Nid(0x1234),
            did: Did(5),
            channel: Channel(2),
            network_key: CipherKey::new([1; 16]),
        }
    }

    #[test]
    fn test_invite_for_other_serial_is_ignored() {
        let ctx = unjoined_ctx();
        let mut member = MemberState::new(false);
        assert_eq!(
            member.handle_admin(&ctx, Did::COORDINATOR, invite(41)),
            (None, None)
        );
    }

    #[test]
    fn test_invite_is_acked_then_adopted() {
        let mut ctx = unjoined_ctx();
        let mut member = MemberState::new(false);
        let (response, effect) = member.handle_admin(&ctx, Did::COORDINATOR, invite(42));
        assert_eq!(response, Some(AckDescriptor::ack()));

        let mut store = crate::settings::MemoryStore::new();
        let mut events = Vec::new();
        struct Events<'a>(&'a mut Vec<NetworkEvent>);
        impl AppHooks for Events<'_> {
            fn on_network_event(&mut self, event: &NetworkEvent) {
                self.0.push(event.clone());
            }
        }
        member.apply(effect.unwrap(), &mut ctx, &mut store, &mut Events(&mut events));

        assert_eq!(member.join_state(), JoinState::Joined);
        assert_eq!(ctx.did(), Did(5));
        assert!(ctx.keys.has(KeySlot::Network));
        assert!(ctx.keys.has(KeySlot::Access));
        assert_eq!(store.saves(), 1);
        assert_eq!(
            events,
            vec![NetworkEvent::Joined {
                nid: Nid(0x1234),
                did: Did(5)
            }]
        );
    }

    #[test]
    fn test_commands_need_coordinator_and_membership() {
        let ctx = unjoined_ctx();
        let mut member = MemberState::new(false);
        let (response, effect) = member.handle_admin(&ctx, Did::COORDINATOR, AdminCommand::RemoveDevice);
        assert_eq!(response, Some(AckDescriptor::nack(NackReason::NotJoined)));
        assert!(effect.is_none());

        let (response, _) = member.handle_admin(&ctx, Did(9), AdminCommand::RemoveDevice);
        assert_eq!(response, Some(AckDescriptor::nack(NackReason::Unsupported)));
    }

    #[test]
    fn test_request_needs_access_key() {
        let mut ctx = unjoined_ctx();
        ctx.params.access_key = None;
        ctx.refresh_keys();
        let mut member = MemberState::new(false);
        assert_eq!(
            member.request_admission(&mut ctx, &mut wavemesh_protocol::NoHooks),
            Err(EnqueueError::Config(ConfigError::MissingKey(KeySlot::Access)))
        );
    }
}

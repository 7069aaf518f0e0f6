//! Administrative payloads, carried in 32-byte `Admin` frames.
//!
//! ```text
//! Invite:           01 ‖ serial(4) ‖ nid(2) ‖ did ‖ channel ‖ network_key(16)
//! AdmissionRequest: 02 ‖ serial(4)
//! RotateKey:        03 ‖ slot ‖ key(16)
//! ChangeChannel:    04 ‖ channel
//! RemoveDevice:     05
//! ```
//!
//! Admission frames travel under the access key; the rest under the network
//! key.

use wavemesh_core::constants::ADMIN_PAYLOAD_LEN;
use wavemesh_core::{Channel, Did, Encryption, Nid};
use wavemesh_crypto::{CipherKey, KeySlot};

const TAG_INVITE: u8 = 0x01;
const TAG_ADMISSION_REQUEST: u8 = 0x02;
const TAG_ROTATE_KEY: u8 = 0x03;
const TAG_CHANGE_CHANNEL: u8 = 0x04;
const TAG_REMOVE_DEVICE: u8 = 0x05;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdminError {
    #[error("unknown admin tag 0x{0:02x}")]
    UnknownTag(u8),
    #[error("admin payload truncated")]
    Truncated,
    #[error("unknown key slot {0}")]
    UnknownKeySlot(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Invite {
        serial: u32,
        nid: Nid,
        did: Did,
        channel: Channel,
        network_key: CipherKey,
    },
    AdmissionRequest {
        serial: u32,
    },
    RotateKey {
        slot: KeySlot,
        key: CipherKey,
    },
    ChangeChannel {
        channel: Channel,
    },
    RemoveDevice,
}

fn slot_to_byte(slot: KeySlot) -> u8 {
    match slot {
        KeySlot::Network => 1,
        KeySlot::Stream => 2,
        KeySlot::Access => 3,
    }
}

fn slot_from_byte(b: u8) -> Result<KeySlot, AdminError> {
    match b {
        1 => Ok(KeySlot::Network),
        2 => Ok(KeySlot::Stream),
        3 => Ok(KeySlot::Access),
        _ => Err(AdminError::UnknownKeySlot(b)),
    }
}

fn key_at(bytes: &[u8], offset: usize) -> Result<CipherKey, AdminError> {
    let slice = bytes.get(offset..offset + 16).ok_or(AdminError::Truncated)?;
    CipherKey::try_from(slice).map_err(|_| AdminError::Truncated)
}

impl AdminCommand {
    /// Encryption the command travels under.
    pub fn encryption(&self) -> Encryption {
        match self {
            AdminCommand::Invite { .. } | AdminCommand::AdmissionRequest { .. } => {
                Encryption::Access
            }
            _ => Encryption::Network,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AdminCommand::Invite { .. } => "invite",
            AdminCommand::AdmissionRequest { .. } => "admission_request",
            AdminCommand::RotateKey { .. } => "rotate_key",
            AdminCommand::ChangeChannel { .. } => "change_channel",
            AdminCommand::RemoveDevice => "remove_device",
        }
    }

    pub fn to_bytes(&self) -> [u8; ADMIN_PAYLOAD_LEN] {
        let mut out = [0u8; ADMIN_PAYLOAD_LEN];
        match self {
            AdminCommand::Invite {
                serial,
                nid,
                did,
                channel,
                network_key,
            } => {
                out[0] = TAG_INVITE;
                out[1..5].copy_from_slice(&serial.to_be_bytes());
                out[5..7].copy_from_slice(&nid.to_be_bytes());
                out[7] = did.0;
                out[8] = channel.0;
                out[9..25].copy_from_slice(network_key.as_bytes());
            }
            AdminCommand::AdmissionRequest { serial } => {
                out[0] = TAG_ADMISSION_REQUEST;
                out[1..5].copy_from_slice(&serial.to_be_bytes());
            }
            AdminCommand::RotateKey { slot, key } => {
                out[0] = TAG_ROTATE_KEY;
                out[1] = slot_to_byte(*slot);
                out[2..18].copy_from_slice(key.as_bytes());
            }
            AdminCommand::ChangeChannel { channel } => {
                out[0] = TAG_CHANGE_CHANNEL;
                out[1] = channel.0;
            }
            AdminCommand::RemoveDevice => out[0] = TAG_REMOVE_DEVICE,
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AdminError> {
        let tag = *bytes.first().ok_or(AdminError::Truncated)?;
        let serial_at = |offset: usize| -> Result<u32, AdminError> {
            let s = bytes.get(offset..offset + 4).ok_or(AdminError::Truncated)?;
            Ok(u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
        };
        match tag {
            TAG_INVITE => {
                if bytes.len() < 25 {
                    return Err(AdminError::Truncated);
                }
                Ok(AdminCommand::Invite {
                    serial: serial_at(1)?,
                    nid: Nid::from_be_bytes([bytes[5], bytes[6]]),
                    did: Did(bytes[7]),
                    channel: Channel(bytes[8]),
                    network_key: key_at(bytes, 9)?,
                })
            }
            TAG_ADMISSION_REQUEST => Ok(AdminCommand::AdmissionRequest {
                serial: serial_at(1)?,
            }),
            TAG_ROTATE_KEY => Ok(AdminCommand::RotateKey {
                slot: slot_from_byte(*bytes.get(1).ok_or(AdminError::Truncated)?)?,
                key: key_at(bytes, 2)?,
            }),
            TAG_CHANGE_CHANNEL => Ok(AdminCommand::ChangeChannel {
                channel: Channel(*bytes.get(1).ok_or(AdminError::Truncated)?),
            }),
            TAG_REMOVE_DEVICE => Ok(AdminCommand::RemoveDevice),
            other => Err(AdminError::UnknownTag(other)),
        }
    }
}

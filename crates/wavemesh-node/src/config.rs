//! TOML-based configuration for wavemesh devices.

use std::path::Path;

use serde::Deserialize;
use wavemesh_core::{Channel, DataRate, Did, Nid, Pattern, UnitId};
use wavemesh_crypto::{CipherKey, KeySlot};
use wavemesh_protocol::EngineConfig;

use crate::directory::{Directory, PeerInfo, Target};
use crate::error::ConfigError;
use crate::settings::BaseParams;

/// Top-level device configuration loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub peers: Vec<PeerEntry>,
    #[serde(default)]
    pub assignments: Vec<AssignmentEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    Coordinator,
    #[default]
    Member,
}

/// The `[device]` section.
#[derive(Debug, Default, Deserialize)]
pub struct DeviceSection {
    #[serde(default)]
    pub role: DeviceRole,
    /// Hardware serial number, used during admission.
    #[serde(default)]
    pub serial: u32,
    /// Forward multi-hop frames for others.
    #[serde(default)]
    pub relay: bool,
    /// Pre-provisioned DID. Members without one start unjoined.
    pub did: Option<u8>,
}

/// The `[network]` section. Keys are 32 hex digits.
#[derive(Debug, Deserialize)]
pub struct NetworkSection {
    #[serde(default)]
    pub nid: u16,
    #[serde(default)]
    pub channel: u8,
    #[serde(default)]
    pub data_rate: u8,
    pub network_key: Option<String>,
    pub stream_key: Option<String>,
    pub access_key: Option<String>,
    /// Coordinator only: highest DID handed out during admission.
    #[serde(default = "default_max_devices")]
    pub max_devices: u8,
}

fn default_max_devices() -> u8 {
    32
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            nid: 0,
            channel: 0,
            data_rate: 0,
            network_key: None,
            stream_key: None,
            access_key: None,
            max_devices: default_max_devices(),
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// A `[[peers]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct PeerEntry {
    pub did: u8,
    #[serde(default)]
    pub multi_hop: bool,
}

/// A `[[assignments]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentEntry {
    pub unit: u8,
    pub pattern: u8,
    #[serde(default)]
    pub targets: Vec<TargetEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetEntry {
    pub did: u8,
    pub unit: u8,
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.engine.validate().map_err(ConfigError::Engine)?;
        Ok(config)
    }

    /// Base parameters as provisioned, before anything was stored.
    pub fn base_params(&self) -> Result<BaseParams, ConfigError> {
        let did = match (self.device.role, self.device.did) {
            (DeviceRole::Coordinator, None | Some(0)) => Did::COORDINATOR,
            (DeviceRole::Coordinator, Some(other)) => return Err(ConfigError::InvalidDid(Did(other))),
            (DeviceRole::Member, Some(d)) if Did(d).is_member() => Did(d),
            (DeviceRole::Member, Some(d)) => return Err(ConfigError::InvalidDid(Did(d))),
            (DeviceRole::Member, None) => Did::UNASSIGNED,
        };
        if usize::from(self.network.channel) >= usize::from(self.engine.channel_count) {
            return Err(ConfigError::Invalid(format!(
                "channel {} outside 0..{}",
                self.network.channel, self.engine.channel_count
            )));
        }
        if self.network.max_devices == 0 || !Did(self.network.max_devices).is_member() {
            return Err(ConfigError::Invalid("max_devices must be in 1..=253".into()));
        }
        let params = BaseParams {
            nid: Nid(self.network.nid),
            did,
            serial: self.device.serial,
            channel: Channel(self.network.channel),
            data_rate: DataRate(self.network.data_rate),
            network_key: parse_key(KeySlot::Network, self.network.network_key.as_deref())?,
            stream_key: parse_key(KeySlot::Stream, self.network.stream_key.as_deref())?,
            access_key: parse_key(KeySlot::Access, self.network.access_key.as_deref())?,
            relay: self.device.relay || self.device.role == DeviceRole::Coordinator,
            registry: Vec::new(),
        };
        if self.device.role == DeviceRole::Coordinator && params.network_key.is_none() {
            return Err(ConfigError::MissingKey(KeySlot::Network));
        }
        Ok(params)
    }

    /// Directory populated from `[[peers]]` and `[[assignments]]`.
    pub fn directory(&self) -> Result<Directory, ConfigError> {
        let mut directory = Directory::new(self.engine.max_peers, self.engine.max_assignments);
        for peer in &self.peers {
            directory
                .upsert_peer(PeerInfo::new(Did(peer.did)).with_multi_hop(peer.multi_hop))
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        for a in &self.assignments {
            let targets = a
                .targets
                .iter()
                .map(|t| Target {
                    did: Did(t.did),
                    unit: UnitId(t.unit),
                })
                .collect();
            directory
                .assign_peer(UnitId(a.unit), Pattern(a.pattern), targets)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(directory)
    }
}

/// Decode a 32-hex-digit key.
pub fn parse_key(slot: KeySlot, s: Option<&str>) -> Result<Option<CipherKey>, ConfigError> {
    let Some(s) = s else { return Ok(None) };
    let bytes = hex::decode(s.trim()).map_err(|e| ConfigError::InvalidKey {
        slot,
        reason: e.to_string(),
    })?;
    CipherKey::try_from(bytes.as_slice())
        .map(Some)
        .map_err(|e| ConfigError::InvalidKey {
            slot,
            reason: e.to_string(),
        })
}

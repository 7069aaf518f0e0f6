//! Base-parameter persistence.
//!
//! The device only ever loads its parameters at start-up and saves them after
//! an administrative change (admission, key rotation, channel change,
//! removal). [`FileStore`] writes JSON atomically (write to `.tmp`, then
//! rename) so a crash mid-save leaves the previous parameters intact.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use wavemesh_core::{Channel, DataRate, Did, Nid};
use wavemesh_crypto::{CipherKey, KeySet, KeySlot};

/// Errors from settings store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),
}

/// A device admitted by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmittedDevice {
    pub did: Did,
    pub serial: u32,
}

/// Everything a device needs to rejoin its network after a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseParams {
    pub nid: Nid,
    pub did: Did,
    pub serial: u32,
    pub channel: Channel,
    pub data_rate: DataRate,
    pub network_key: Option<CipherKey>,
    pub stream_key: Option<CipherKey>,
    pub access_key: Option<CipherKey>,
    /// Forward multi-hop frames addressed to others.
    pub relay: bool,
    /// Coordinator only: admitted devices.
    pub registry: Vec<AdmittedDevice>,
}

impl BaseParams {
    /// Parameters of a device that has not been admitted anywhere.
    pub fn unjoined(serial: u32) -> Self {
        Self {
            nid: Nid(0),
            did: Did::UNASSIGNED,
            serial,
            channel: Channel(0),
            data_rate: DataRate(0),
            network_key: None,
            stream_key: None,
            access_key: None,
            relay: false,
            registry: Vec::new(),
        }
    }

    pub fn key_set(&self) -> KeySet {
        let mut keys = KeySet::new();
        for (slot, key) in [
            (KeySlot::Network, &self.network_key),
            (KeySlot::Stream, &self.stream_key),
            (KeySlot::Access, &self.access_key),
        ] {
            if let Some(key) = key {
                keys.set(slot, key.clone());
            }
        }
        keys
    }

    pub fn key(&self, slot: KeySlot) -> Option<&CipherKey> {
        match slot {
            KeySlot::Network => self.network_key.as_ref(),
            KeySlot::Stream => self.stream_key.as_ref(),
            KeySlot::Access => self.access_key.as_ref(),
        }
    }

    pub fn set_key(&mut self, slot: KeySlot, key: Option<CipherKey>) {
        match slot {
            KeySlot::Network => self.network_key = key,
            KeySlot::Stream => self.stream_key = key,
            KeySlot::Access => self.access_key = key,
        }
    }

    pub fn serial_of(&self, did: Did) -> Option<u32> {
        self.registry.iter().find(|d| d.did == did).map(|d| d.serial)
    }
}

/// The load/save contract of the platform's settings storage.
pub trait SettingsStore {
    fn load_base_params(&mut self) -> Result<Option<BaseParams>, StoreError>;
    fn save_base_params(&mut self, params: &BaseParams) -> Result<(), StoreError>;
}

impl<S: SettingsStore + ?Sized> SettingsStore for &mut S {
    fn load_base_params(&mut self) -> Result<Option<BaseParams>, StoreError> {
        (**self).load_base_params()
    }

    fn save_base_params(&mut self, params: &BaseParams) -> Result<(), StoreError> {
        (**self).save_base_params(params)
    }
}

/// In-memory store that counts saves.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    params: Option<BaseParams>,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: BaseParams) -> Self {
        Self {
            params: Some(params),
            saves: 0,
        }
    }

    pub fn saves(&self) -> usize {
        self.saves
    }

    pub fn params(&self) -> Option<&BaseParams> {
        self.params.as_ref()
    }
}

impl SettingsStore for MemoryStore {
    fn load_base_params(&mut self) -> Result<Option<BaseParams>, StoreError> {
        Ok(self.params.clone())
    }

    fn save_base_params(&mut self, params: &BaseParams) -> Result<(), StoreError> {
        self.params = Some(params.clone());
        self.saves += 1;
        Ok(())
    }
}

/// JSON file store.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store at `path`, creating the parent directory if needed.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn atomic_write(&self, data: &[u8]) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SettingsStore for FileStore {
    fn load_base_params(&mut self) -> Result<Option<BaseParams>, StoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => {
                let stored: StoredParams = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Deserialize(e.to_string()))?;
                Ok(Some(stored.try_into()?))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn save_base_params(&mut self, params: &BaseParams) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(&StoredParams::from(params))
            .map_err(|e| StoreError::Serialize(e.to_string()))?;
        self.atomic_write(&bytes)?;
        tracing::debug!(path = %self.path.display(), "settings: base parameters saved");
        Ok(())
    }
}

// ------------------------------------------------------------------ //
// On-disk representation
// ------------------------------------------------------------------ //

#[derive(Debug, Serialize, Deserialize)]
struct StoredParams {
    nid: u16,
    did: u8,
    serial: u32,
    channel: u8,
    data_rate: u8,
    network_key: Option<String>,
    stream_key: Option<String>,
    access_key: Option<String>,
    relay: bool,
    #[serde(default)]
    registry: Vec<StoredDevice>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredDevice {
    did: u8,
    serial: u32,
}

fn key_to_hex(key: &Option<CipherKey>) -> Option<String> {
    key.as_ref().map(|k| hex::encode(k.as_bytes()))
}

fn key_from_hex(s: &Option<String>) -> Result<Option<CipherKey>, StoreError> {
    let Some(s) = s else { return Ok(None) };
    let bytes = hex::decode(s).map_err(|e| StoreError::Deserialize(format!("key hex: {e}")))?;
    CipherKey::try_from(bytes.as_slice())
        .map(Some)
        .map_err(|e| StoreError::Deserialize(e.to_string()))
}

impl From<&BaseParams> for StoredParams {
    fn from(p: &BaseParams) -> Self {
        Self {
            nid: p.nid.0,
            did: p.did.0,
            serial: p.serial,
            channel: p.channel.0,
            data_rate: p.data_rate.0,
            network_key: key_to_hex(&p.network_key),
            stream_key: key_to_hex(&p.stream_key),
            access_key: key_to_hex(&p.access_key),
            relay: p.relay,
            registry: p
                .registry
                .iter()
                .map(|d| StoredDevice {
                    did: d.did.0,
                    serial: d.serial,
                })
                .collect(),
        }
    }
}

impl TryFrom<StoredParams> for BaseParams {
    type Error = StoreError;

    fn try_from(s: StoredParams) -> Result<Self, Self::Error> {
        Ok(Self {
            nid: Nid(s.nid),
            did: Did(s.did),
            serial: s.serial,
            channel: Channel(s.channel),
            data_rate: DataRate(s.data_rate),
            network_key: key_from_hex(&s.network_key)?,
            stream_key: key_from_hex(&s.stream_key)?,
            access_key: key_from_hex(&s.access_key)?,
            relay: s.relay,
            registry: s
                .registry
                .iter()
                .map(|d| AdmittedDevice {
                    did: Did(d.did),
                    serial: d.serial,
                })
                .collect(),
        })
    }
}

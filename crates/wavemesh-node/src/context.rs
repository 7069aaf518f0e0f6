//! Per-device state passed into every entry point.
//!
//! A [`DeviceContext`] owns the radio, the base parameters, the derived key
//! set, the peer directory, the transaction engine and the receipt cache.
//! Nothing here is global, so any number of simulated devices can share one
//! process.

use wavemesh_core::{Channel, DataRate, Did, FrameError, Nid};
use wavemesh_crypto::KeySet;
use wavemesh_interfaces::Radio;
use wavemesh_protocol::{EngineConfig, ReceiptCache, Tick, TransactionEngine};

use crate::config::NodeConfig;
use crate::directory::Directory;
use crate::error::ConfigError;
use crate::settings::BaseParams;

/// Why a received frame was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    Malformed,
    InvalidSymbol,
    CorruptCrc,
    /// Our own transmission heard back through a relay.
    OwnFrame,
    ForeignNetwork,
    NotAddressed,
    Undecryptable,
}

impl DropReason {
    pub fn from_frame_error(e: &FrameError) -> Self {
        match e {
            FrameError::Malformed(_) => DropReason::Malformed,
            FrameError::InvalidSymbol { .. } => DropReason::InvalidSymbol,
            FrameError::CorruptCrc { .. } => DropReason::CorruptCrc,
            FrameError::Crypto(_) => DropReason::Undecryptable,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            DropReason::Malformed => "malformed",
            DropReason::InvalidSymbol => "invalid_symbol",
            DropReason::CorruptCrc => "corrupt_crc",
            DropReason::OwnFrame => "own_frame",
            DropReason::ForeignNetwork => "foreign_network",
            DropReason::NotAddressed => "not_addressed",
            DropReason::Undecryptable => "undecryptable",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub frames_received: u64,
    pub dropped_malformed: u64,
    pub dropped_invalid_symbol: u64,
    pub dropped_corrupt_crc: u64,
    pub dropped_own: u64,
    pub dropped_foreign: u64,
    pub dropped_not_addressed: u64,
    pub dropped_undecryptable: u64,
    pub relayed: u64,
    pub delivered: u64,
    pub duplicates: u64,
    pub responses_queued: u64,
    /// Frames put on the air, responses included.
    pub transmissions: u64,
}

impl DeviceStats {
    pub fn record_drop(&mut self, reason: DropReason) {
        let counter = match reason {
            DropReason::Malformed => &mut self.dropped_malformed,
            DropReason::InvalidSymbol => &mut self.dropped_invalid_symbol,
            DropReason::CorruptCrc => &mut self.dropped_corrupt_crc,
            DropReason::OwnFrame => &mut self.dropped_own,
            DropReason::ForeignNetwork => &mut self.dropped_foreign,
            DropReason::NotAddressed => &mut self.dropped_not_addressed,
            DropReason::Undecryptable => &mut self.dropped_undecryptable,
        };
        *counter += 1;
    }

    pub fn dropped(&self) -> u64 {
        self.dropped_malformed
            + self.dropped_invalid_symbol
            + self.dropped_corrupt_crc
            + self.dropped_own
            + self.dropped_foreign
            + self.dropped_not_addressed
            + self.dropped_undecryptable
    }
}

#[derive(Debug)]
pub struct DeviceContext<R> {
    pub radio: R,
    pub params: BaseParams,
    pub keys: KeySet,
    pub directory: Directory,
    pub engine: TransactionEngine,
    pub receipts: ReceiptCache,
    pub stats: DeviceStats,
    pub now: Tick,
}

impl<R: Radio> DeviceContext<R> {
    /// Build a context and tune the radio to the parameters' channel and
    /// data rate.
    pub fn new(
        mut radio: R,
        params: BaseParams,
        directory: Directory,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate().map_err(ConfigError::Engine)?;
        radio.set_channel(params.channel);
        radio.set_data_rate(params.data_rate);
        let keys = params.key_set();
        let receipts = ReceiptCache::new(config.receipt_capacity, config.freshness_window_ms);
        Ok(Self {
            radio,
            params,
            keys,
            directory,
            engine: TransactionEngine::new(config),
            receipts,
            stats: DeviceStats::default(),
            now: Tick::ZERO,
        })
    }

    /// Build from a loaded configuration. Parameters from the settings store
    /// take precedence over the provisioned ones.
    pub fn from_config(
        radio: R,
        config: &NodeConfig,
        stored: Option<BaseParams>,
    ) -> Result<Self, ConfigError> {
        let params = match stored {
            Some(params) => params,
            None => config.base_params()?,
        };
        let mut directory = config.directory()?;
        for device in &params.registry {
            if directory.lookup_peer(device.did).is_some() {
                continue;
            }
            directory
                .upsert_peer(crate::directory::PeerInfo::new(device.did))
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Self::new(radio, params, directory, config.engine.clone())
    }

    pub fn did(&self) -> Did {
        self.params.did
    }

    pub fn nid(&self) -> Nid {
        self.params.nid
    }

    pub fn config(&self) -> &EngineConfig {
        self.engine.config()
    }

    pub fn is_joined(&self) -> bool {
        !self.params.did.is_unassigned()
    }

    /// Re-derive the key set after the parameters changed.
    pub fn refresh_keys(&mut self) {
        self.keys = self.params.key_set();
    }

    /// Tune the radio to the parameters' channel and data rate.
    pub fn retune(&mut self) {
        self.tune(self.params.channel, self.params.data_rate);
    }

    pub fn tune(&mut self, channel: Channel, data_rate: DataRate) {
        if self.radio.channel() != channel || self.radio.data_rate() != data_rate {
            tracing::debug!(
                did = %self.params.did,
                channel = %channel,
                data_rate = %data_rate,
                "context: retuning radio"
            );
        }
        self.radio.set_channel(channel);
        self.radio.set_data_rate(data_rate);
    }

    /// Fold the engine's transmit counters into the device statistics.
    pub(crate) fn sync_stats(&mut self) {
        let engine = self.engine.stats();
        self.stats.transmissions = engine.transmissions + engine.responses_sent;
    }
}

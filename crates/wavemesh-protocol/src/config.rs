//! Engine sizing and timing configuration.
//!
//! Every field has a default, so an empty `[engine]` table (or none at all)
//! yields a working configuration.

use serde::Deserialize;

use crate::transaction::constants::*;
use wavemesh_core::NackReason;
use wavemesh_core::constants::is_valid_chunk_len;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,
    #[serde(default = "default_max_assignments")]
    pub max_assignments: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_true")]
    pub supports_block: bool,
    #[serde(default = "default_true")]
    pub supports_stream: bool,
    #[serde(default = "default_max_hops")]
    pub max_hops: u8,
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u32,
    #[serde(default = "default_backoff_min_ms")]
    pub backoff_min_ms: u32,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u32,
    #[serde(default = "default_freshness_window_ms")]
    pub freshness_window_ms: u32,
    #[serde(default = "default_receipt_capacity")]
    pub receipt_capacity: usize,
    #[serde(default)]
    pub accept_duplicates: bool,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    #[serde(default = "default_max_block_len")]
    pub max_block_len: usize,
    #[serde(default = "default_max_adjustments")]
    pub max_adjustments: u8,
    #[serde(default = "default_transfer_idle_timeout_ms")]
    pub transfer_idle_timeout_ms: u32,
    #[serde(default = "default_channel_count")]
    pub channel_count: u8,
    #[serde(default = "default_data_rate_count")]
    pub data_rate_count: u8,
    #[serde(default = "default_rng_seed")]
    pub rng_seed: u64,
}

fn default_max_peers() -> usize {
    DEFAULT_MAX_PEERS
}
fn default_max_assignments() -> usize {
    DEFAULT_MAX_ASSIGNMENTS
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_true() -> bool {
    true
}
fn default_max_hops() -> u8 {
    DEFAULT_MAX_HOPS
}
fn default_max_retries() -> u8 {
    DEFAULT_MAX_RETRIES
}
fn default_ack_timeout_ms() -> u32 {
    DEFAULT_ACK_TIMEOUT_MS
}
fn default_backoff_min_ms() -> u32 {
    DEFAULT_BACKOFF_MIN_MS
}
fn default_backoff_max_ms() -> u32 {
    DEFAULT_BACKOFF_MAX_MS
}
fn default_retry_backoff_ms() -> u32 {
    DEFAULT_RETRY_BACKOFF_MS
}
fn default_freshness_window_ms() -> u32 {
    DEFAULT_FRESHNESS_WINDOW_MS
}
fn default_receipt_capacity() -> usize {
    DEFAULT_RECEIPT_CAPACITY
}
fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_min_chunk_size() -> usize {
    DEFAULT_MIN_CHUNK_SIZE
}
fn default_max_chunk_size() -> usize {
    DEFAULT_MAX_CHUNK_SIZE
}
fn default_max_block_len() -> usize {
    DEFAULT_MAX_BLOCK_LEN
}
fn default_max_adjustments() -> u8 {
    DEFAULT_MAX_ADJUSTMENTS
}
fn default_transfer_idle_timeout_ms() -> u32 {
    DEFAULT_TRANSFER_IDLE_TIMEOUT_MS
}
fn default_channel_count() -> u8 {
    DEFAULT_CHANNEL_COUNT
}
fn default_data_rate_count() -> u8 {
    DEFAULT_DATA_RATE_COUNT
}
fn default_rng_seed() -> u64 {
    DEFAULT_RNG_SEED
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_peers: DEFAULT_MAX_PEERS,
            max_assignments: DEFAULT_MAX_ASSIGNMENTS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            supports_block: true,
            supports_stream: true,
            max_hops: DEFAULT_MAX_HOPS,
            max_retries: DEFAULT_MAX_RETRIES,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
            backoff_min_ms: DEFAULT_BACKOFF_MIN_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            freshness_window_ms: DEFAULT_FRESHNESS_WINDOW_MS,
            receipt_capacity: DEFAULT_RECEIPT_CAPACITY,
            accept_duplicates: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            max_block_len: DEFAULT_MAX_BLOCK_LEN,
            max_adjustments: DEFAULT_MAX_ADJUSTMENTS,
            transfer_idle_timeout_ms: DEFAULT_TRANSFER_IDLE_TIMEOUT_MS,
            channel_count: DEFAULT_CHANNEL_COUNT,
            data_rate_count: DEFAULT_DATA_RATE_COUNT,
            rng_seed: DEFAULT_RNG_SEED,
        }
    }
}

impl EngineConfig {
    /// Reject combinations the engine cannot honor.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.queue_capacity == 0 || self.queue_capacity > usize::from(u16::MAX) {
            return Err("queue_capacity must be between 1 and 65535");
        }
        if self.max_peers == 0 {
            return Err("max_peers must be at least 1");
        }
        if self.backoff_min_ms > self.backoff_max_ms {
            return Err("backoff_min_ms exceeds backoff_max_ms");
        }
        if self.ack_timeout_ms == 0 {
            return Err("ack_timeout_ms must be positive");
        }
        if !is_valid_chunk_len(self.min_chunk_size) || !is_valid_chunk_len(self.max_chunk_size) {
            return Err("chunk size bounds must be multiples of 8 in 8..=64");
        }
        if self.min_chunk_size > self.max_chunk_size {
            return Err("min_chunk_size exceeds max_chunk_size");
        }
        if !self.chunk_size_in_bounds(self.chunk_size) {
            return Err("chunk_size outside the configured bounds");
        }
        if self.channel_count == 0 || self.data_rate_count == 0 {
            return Err("channel_count and data_rate_count must be positive");
        }
        Ok(())
    }

    /// Whether `len` is a chunk size this device will use or accept.
    pub fn chunk_size_in_bounds(&self, len: usize) -> bool {
        is_valid_chunk_len(len) && len >= self.min_chunk_size && len <= self.max_chunk_size
    }

    /// Whether an adjustment request with `value` names something this
    /// device supports. Non-adjustment reasons are never in bounds.
    pub fn adjustment_in_bounds(&self, reason: NackReason, value: u16) -> bool {
        match reason {
            NackReason::InvalidChunkSize => self.chunk_size_in_bounds(usize::from(value)),
            NackReason::ChannelChange => value < u16::from(self.channel_count),
            NackReason::DataRateChange => value < u16::from(self.data_rate_count),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_empty_table_matches_default() {
        let parsed: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, EngineConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let parsed: EngineConfig =
            serde_json::from_str(r#"{"max_retries": 5, "supports_stream": false}"#).unwrap();
        assert_eq!(parsed.max_retries, 5);
        assert!(!parsed.supports_stream);
        assert_eq!(parsed.ack_timeout_ms, DEFAULT_ACK_TIMEOUT_MS);
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(serde_json::from_str::<EngineConfig>(r#"{"max_retires": 5}"#).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            EngineConfig {
                queue_capacity: 0,
                ..EngineConfig::default()
            },
            EngineConfig {
                backoff_min_ms: 30,
                backoff_max_ms: 10,
                ..EngineConfig::default()
            },
            EngineConfig {
                min_chunk_size: 12,
                ..EngineConfig::default()
            },
            EngineConfig {
                chunk_size: 72,
                ..EngineConfig::default()
            },
            EngineConfig {
                min_chunk_size: 48,
                max_chunk_size: 16,
                chunk_size: 16,
                ..EngineConfig::default()
            },
        ];
        for cfg in &cases {
            assert!(cfg.validate().is_err(), "{cfg:?}");
        }
    }

    #[test]
    fn test_chunk_size_in_bounds() {
        let cfg = EngineConfig {
            min_chunk_size: 16,
            max_chunk_size: 48,
            ..EngineConfig::default()
        };
        assert!(cfg.chunk_size_in_bounds(16));
        assert!(cfg.chunk_size_in_bounds(48));
        assert!(!cfg.chunk_size_in_bounds(8));
        assert!(!cfg.chunk_size_in_bounds(56));
        assert!(!cfg.chunk_size_in_bounds(20));
    }

    #[test]
    fn test_adjustment_bounds() {
        let config = EngineConfig::default();
        assert!(config.adjustment_in_bounds(NackReason::InvalidChunkSize, 16));
        assert!(!config.adjustment_in_bounds(NackReason::InvalidChunkSize, 12));
        assert!(!config.adjustment_in_bounds(NackReason::InvalidChunkSize, 72));
        assert!(config.adjustment_in_bounds(NackReason::ChannelChange, 15));
        assert!(!config.adjustment_in_bounds(NackReason::ChannelChange, 16));
        assert!(!config.adjustment_in_bounds(NackReason::ChannelChange, 256 + 3));
        assert!(config.adjustment_in_bounds(NackReason::DataRateChange, 3));
        assert!(!config.adjustment_in_bounds(NackReason::DataRateChange, 4));
        assert!(!config.adjustment_in_bounds(NackReason::Busy, 0));
    }
}

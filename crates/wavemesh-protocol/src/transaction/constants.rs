//! Engine timing and sizing defaults.
//!
//! Every value here is only a default for the matching `EngineConfig` field.

pub const DEFAULT_MAX_PEERS: usize = 32;
pub const DEFAULT_MAX_ASSIGNMENTS: usize = 32;
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;
pub const DEFAULT_MAX_HOPS: u8 = 3;
pub const DEFAULT_MAX_RETRIES: u8 = 3;

/// Wait for an ACK per hop before the attempt counts as lost.
pub const DEFAULT_ACK_TIMEOUT_MS: u32 = 50;
/// Busy-channel backoff is drawn uniformly from `[MIN, MAX]`.
pub const DEFAULT_BACKOFF_MIN_MS: u32 = 2;
pub const DEFAULT_BACKOFF_MAX_MS: u32 = 20;
/// Minimum pause before a failed attempt is retried.
pub const DEFAULT_RETRY_BACKOFF_MS: u32 = 10;
/// How long a (sender, message id) pair is remembered for duplicate
/// suppression.
pub const DEFAULT_FRESHNESS_WINDOW_MS: u32 = 2_000;
/// Receipts remembered at once.
pub const DEFAULT_RECEIPT_CAPACITY: usize = 64;

pub const DEFAULT_CHUNK_SIZE: usize = 32;
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 8;
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 64;
/// Largest block accepted at enqueue or on receive.
pub const DEFAULT_MAX_BLOCK_LEN: usize = 4_096;
/// Inbound transfers with no traffic for this long are dropped.
pub const DEFAULT_TRANSFER_IDLE_TIMEOUT_MS: u32 = 5_000;
/// Consecutive adjustment requests a single chunk may receive.
pub const DEFAULT_MAX_ADJUSTMENTS: u8 = 4;

pub const DEFAULT_CHANNEL_COUNT: u8 = 16;
pub const DEFAULT_DATA_RATE_COUNT: u8 = 4;
pub const DEFAULT_RNG_SEED: u64 = 0x5EED_0F3E;

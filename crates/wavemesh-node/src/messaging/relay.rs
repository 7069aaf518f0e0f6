//! Relay loop suppression.
//!
//! Keeps a current and a previous set of relayed frame keys. When the
//! current set reaches the rotation threshold it becomes the previous set
//! and a new empty set starts. An entry also lapses once its hold time has
//! passed, so a sender's retransmission of the same frame is forwarded again
//! while echoes arriving right after the first copy are not.

use std::collections::HashMap;

use wavemesh_protocol::Tick;

/// Relayed keys remembered per set before rotation.
pub const RELAY_ROTATION_THRESHOLD: usize = 256;

#[derive(Debug, Clone)]
pub struct RelayCache {
    /// Key to the tick until which it suppresses.
    current: HashMap<u32, Tick>,
    prev: HashMap<u32, Tick>,
    threshold: usize,
}

impl Default for RelayCache {
    fn default() -> Self {
        Self::new(RELAY_ROTATION_THRESHOLD)
    }
}

impl RelayCache {
    pub fn new(threshold: usize) -> Self {
        Self {
            current: HashMap::new(),
            prev: HashMap::new(),
            threshold: threshold.max(1),
        }
    }

    pub fn contains(&self, key: u32, now: Tick) -> bool {
        [&self.current, &self.prev]
            .into_iter()
            .any(|set| set.get(&key).is_some_and(|until| now.is_before(*until)))
    }

    /// Remember `key` for `hold_ms`. Returns `true` if it was not being
    /// suppressed.
    pub fn insert(&mut self, key: u32, now: Tick, hold_ms: u32) -> bool {
        if self.contains(key, now) {
            return false;
        }
        self.prev.remove(&key);
        self.current.insert(key, now + hold_ms);
        if self.current.len() >= self.threshold {
            self.prev = std::mem::take(&mut self.current);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.current.len() + self.prev.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

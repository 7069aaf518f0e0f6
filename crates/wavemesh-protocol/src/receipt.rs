//! Receipt cache for idempotent delivery.
//!
//! Every frame a device answers is remembered as (sender, message id) with the
//! response it got. A retransmission inside the freshness window is answered
//! with the same response and not delivered again.

use wavemesh_core::{AckDescriptor, Did, MessageId};

use crate::time::Tick;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub from: Did,
    pub message_id: MessageId,
    pub at: Tick,
    pub response: AckDescriptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptCheck {
    Fresh,
    /// Seen inside the window; re-send this response.
    Duplicate(AckDescriptor),
}

/// Fixed-capacity receipt cache. When full, the oldest receipt is evicted.
#[derive(Debug, Clone)]
pub struct ReceiptCache {
    entries: Vec<Receipt>,
    capacity: usize,
    window_ms: u32,
}

impl ReceiptCache {
    pub fn new(capacity: usize, window_ms: u32) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            window_ms,
        }
    }

    pub fn check(&self, from: Did, message_id: MessageId, now: Tick) -> ReceiptCheck {
        self.entries
            .iter()
            .find(|r| r.from == from && r.message_id == message_id && self.is_fresh(r, now))
            .map_or(ReceiptCheck::Fresh, |r| ReceiptCheck::Duplicate(r.response))
    }

    /// Remember the response given to a frame, replacing any older receipt
    /// for the same pair.
    pub fn record(&mut self, from: Did, message_id: MessageId, now: Tick, response: AckDescriptor) {
        if self.capacity == 0 {
            return;
        }
        self.entries
            .retain(|r| !(r.from == from && r.message_id == message_id));
        if self.entries.len() >= self.capacity
            && let Some(oldest) = self
                .entries
                .iter()
                .enumerate()
                .max_by_key(|(_, r)| now.elapsed_since(r.at))
                .map(|(i, _)| i)
        {
            self.entries.swap_remove(oldest);
        }
        self.entries.push(Receipt {
            from,
            message_id,
            at: now,
            response,
        });
    }

    /// Drop receipts older than the window. Returns how many were removed.
    pub fn expire(&mut self, now: Tick) -> usize {
        let before = self.entries.len();
        let window = self.window_ms;
        self.entries
            .retain(|r| now.elapsed_since(r.at) < window);
        before - self.entries.len()
    }

    /// Forget everything from one sender, e.g. after it was removed.
    pub fn forget(&mut self, from: Did) {
        self.entries.retain(|r| r.from != from);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_fresh(&self, receipt: &Receipt, now: Tick) -> bool {
        now.elapsed_since(receipt.at) < self.window_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wavemesh_core::NackReason;

    #[test]
    fn test_unknown_pair_is_fresh() {
        let cache = ReceiptCache::new(4, 1_000);
        assert_eq!(cache.check(Did(1), MessageId(1), Tick(0)), ReceiptCheck::Fresh);
    }

    #[test]
    fn test_duplicate_returns_cached_response() {
        let mut cache = ReceiptCache::new(4, 1_000);
        let nack = AckDescriptor::nack(NackReason::Busy);
        cache.record(Did(1), MessageId(7), Tick(100), nack);
        assert_eq!(
            cache.check(Did(1), MessageId(7), Tick(500)),
            ReceiptCheck::Duplicate(nack)
        );
        assert_eq!(cache.check(Did(2), MessageId(7), Tick(500)), ReceiptCheck::Fresh);
        assert_eq!(cache.check(Did(1), MessageId(8), Tick(500)), ReceiptCheck::Fresh);
    }

    #[test]
    fn test_window_expiry() {
        let mut cache = ReceiptCache::new(4, 1_000);
        cache.record(Did(1), MessageId(7), Tick(100), AckDescriptor::ack());
        assert_eq!(cache.check(Did(1), MessageId(7), Tick(1_100)), ReceiptCheck::Fresh);
        assert_eq!(cache.expire(Tick(1_100)), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_window_across_rollover() {
        let mut cache = ReceiptCache::new(4, 1_000);
        cache.record(Did(1), MessageId(7), Tick(u32::MAX - 10), AckDescriptor::ack());
        assert!(matches!(
            cache.check(Did(1), MessageId(7), Tick(100)),
            ReceiptCheck::Duplicate(_)
        ));
    }

    #[test]
    fn test_full_cache_evicts_oldest() {
        let mut cache = ReceiptCache::new(2, 10_000);
        cache.record(Did(1), MessageId(1), Tick(0), AckDescriptor::ack());
        cache.record(Did(2), MessageId(1), Tick(10), AckDescriptor::ack());
        cache.record(Did(3), MessageId(1), Tick(20), AckDescriptor::ack());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.check(Did(1), MessageId(1), Tick(30)), ReceiptCheck::Fresh);
        assert!(matches!(
            cache.check(Did(3), MessageId(1), Tick(30)),
            ReceiptCheck::Duplicate(_)
        ));
    }

    #[test]
    fn test_record_replaces_same_pair() {
        let mut cache = ReceiptCache::new(4, 10_000);
        cache.record(Did(1), MessageId(1), Tick(0), AckDescriptor::ack());
        cache.record(Did(1), MessageId(1), Tick(5), AckDescriptor::ack_with(3));
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.check(Did(1), MessageId(1), Tick(6)),
            ReceiptCheck::Duplicate(AckDescriptor::ack_with(3))
        );
        cache.forget(Did(1));
        assert!(cache.is_empty());
    }
}

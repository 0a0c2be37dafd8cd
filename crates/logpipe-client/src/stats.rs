//! Delivery counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time snapshot of a client's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClientStats {
    /// Events accepted into the buffer.
    pub enqueued: u64,
    /// Events dropped because the buffer was full.
    pub dropped: u64,
    /// Batches accepted by at least one transport.
    pub delivered_batches: u64,
    /// Events in those batches.
    pub delivered_events: u64,
    /// Individual transport sends that failed.
    pub failed_sends: u64,
    /// Malformed resource identifiers replaced with generated ones.
    pub substituted_resource_ids: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    delivered_batches: AtomicU64,
    delivered_events: AtomicU64,
    failed_sends: AtomicU64,
    substituted_resource_ids: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, events: usize) {
        self.delivered_batches.fetch_add(1, Ordering::Relaxed);
        self.delivered_events.fetch_add(events as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failed_send(&self) {
        self.failed_sends.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_substitution(&self) {
        self.substituted_resource_ids.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ClientStats {
        ClientStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered_batches: self.delivered_batches.load(Ordering::Relaxed),
            delivered_events: self.delivered_events.load(Ordering::Relaxed),
            failed_sends: self.failed_sends.load(Ordering::Relaxed),
            substituted_resource_ids: self.substituted_resource_ids.load(Ordering::Relaxed),
        }
    }
}

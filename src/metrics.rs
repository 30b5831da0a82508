//! In-process counters for bets received, batches rejected, and active
//! connections. Supplementary to the protocol itself: nothing here is on
//! the wire, and a process restart loses all of it.
//!
//! Modeled on the `AtomicU64` counter struct the pack's `NetworkMetrics`
//! (IPPAN) keeps next to its connection layer: a handful of relaxed-ordering
//! counters behind shared references, no locking.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Process-lifetime counters, cheap to share via `Arc` and update from any
/// connection task.
#[derive(Debug, Default)]
pub struct Metrics {
    bets_received: AtomicU64,
    batches_rejected: AtomicU64,
    connections_active: AtomicI64,
    connections_total: AtomicU64,
}

/// A point-in-time read of every counter, for logging or a status dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub bets_received: u64,
    pub batches_rejected: u64,
    pub connections_active: i64,
    pub connections_total: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_bets_received(&self, count: u64) {
        self.bets_received.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_batch_rejected(&self) {
        self.batches_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bets_received: self.bets_received.load(Ordering::Relaxed),
            batches_rejected: self.batches_rejected.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
        }
    }
}

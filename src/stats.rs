//! Atomic counters for the relay's steady-state behavior.
//!
//! Same shape as the teacher's `stats.rs` (plain atomics, a
//! snapshot-and-reset accessor) but tracks relay-specific outcomes instead
//! of cache/blocklist hits.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic statistics for tracking relay performance.
pub struct Stats {
    pub queries_received: AtomicU64,
    pub forwarded: AtomicU64,
    pub replies_delivered: AtomicU64,
    pub dropped_malformed: AtomicU64,
    pub dropped_unsupported_qtype: AtomicU64,
    pub dropped_id_exhausted: AtomicU64,
    pub dropped_queue_full: AtomicU64,
    pub stale_responses: AtomicU64,
    pub resolver_cooldowns: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            queries_received: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            replies_delivered: AtomicU64::new(0),
            dropped_malformed: AtomicU64::new(0),
            dropped_unsupported_qtype: AtomicU64::new(0),
            dropped_id_exhausted: AtomicU64::new(0),
            dropped_queue_full: AtomicU64::new(0),
            stale_responses: AtomicU64::new(0),
            resolver_cooldowns: AtomicU64::new(0),
        }
    }

    pub fn record_received(&self) {
        self.queries_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reply_delivered(&self) {
        self.replies_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_malformed(&self) {
        self.dropped_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_unsupported_qtype(&self) {
        self.dropped_unsupported_qtype.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_id_exhausted(&self) {
        self.dropped_id_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_queue_full(&self) {
        self.dropped_queue_full.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_response(&self) {
        self.stale_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resolver_cooldown(&self) {
        self.resolver_cooldowns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        StatsSnapshot {
            queries_received: self.queries_received.swap(0, Ordering::Relaxed),
            forwarded: self.forwarded.swap(0, Ordering::Relaxed),
            replies_delivered: self.replies_delivered.swap(0, Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.swap(0, Ordering::Relaxed),
            dropped_unsupported_qtype: self.dropped_unsupported_qtype.swap(0, Ordering::Relaxed),
            dropped_id_exhausted: self.dropped_id_exhausted.swap(0, Ordering::Relaxed),
            dropped_queue_full: self.dropped_queue_full.swap(0, Ordering::Relaxed),
            stale_responses: self.stale_responses.swap(0, Ordering::Relaxed),
            resolver_cooldowns: self.resolver_cooldowns.swap(0, Ordering::Relaxed),
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSnapshot {
    pub queries_received: u64,
    pub forwarded: u64,
    pub replies_delivered: u64,
    pub dropped_malformed: u64,
    pub dropped_unsupported_qtype: u64,
    pub dropped_id_exhausted: u64,
    pub dropped_queue_full: u64,
    pub stale_responses: u64,
    pub resolver_cooldowns: u64,
}

//! Forwarding counters.
//!
//! Lock-free counters and gauges updated by the forwarding engine and read
//! by whoever holds the shared [`ForwarderMetrics`].

use std::sync::atomic::{AtomicU64, Ordering};

/* ---------------------------------------------------------------- *
 * Simple Counter
 * ---------------------------------------------------------------- */

#[derive(Debug)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

/* ---------------------------------------------------------------- *
 * Gauge
 * ---------------------------------------------------------------- */

#[derive(Debug)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

/* ---------------------------------------------------------------- *
 * Aggregate metrics for one forwarder
 * ---------------------------------------------------------------- */

#[derive(Debug, Default)]
pub struct ForwarderMetrics {
    // Interest path
    pub interests_from_lower: Counter,
    pub interests_from_higher: Counter,
    pub cs_hits: Counter,
    pub pit_aggregations: Counter,
    /// Interests handed to a network face, failovers included
    pub interests_forwarded: Counter,
    pub interests_to_app: Counter,
    pub retransmissions: Counter,

    // Content path
    pub contents_delivered: Counter,
    pub contents_unsolicited: Counter,

    // Nack path
    pub nacks_received: Counter,
    pub nacks_sent: Counter,
    pub failovers: Counter,
    pub pit_timeouts: Counter,

    pub malformed_frames: Counter,
    pub pit_size: Gauge,
}

impl ForwarderMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name/value pairs in a stable order, for reporting.
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("interests_from_lower", self.interests_from_lower.value()),
            ("interests_from_higher", self.interests_from_higher.value()),
            ("cs_hits", self.cs_hits.value()),
            ("pit_aggregations", self.pit_aggregations.value()),
            ("interests_forwarded", self.interests_forwarded.value()),
            ("interests_to_app", self.interests_to_app.value()),
            ("retransmissions", self.retransmissions.value()),
            ("contents_delivered", self.contents_delivered.value()),
            ("contents_unsolicited", self.contents_unsolicited.value()),
            ("nacks_received", self.nacks_received.value()),
            ("nacks_sent", self.nacks_sent.value()),
            ("failovers", self.failovers.value()),
            ("pit_timeouts", self.pit_timeouts.value()),
            ("malformed_frames", self.malformed_frames.value()),
            ("pit_size", self.pit_size.value()),
        ]
    }
}

//! Observability and Metrics
//!
//! This module provides metrics collection for monitoring wire-layer
//! health: datagram volume, malformed-input drops, duplicate suppression,
//! and reliability outcomes.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Global metrics collector for wire-layer operations
#[derive(Debug)]
pub struct WireMetrics {
    /// Total datagrams received
    pub datagrams_received: AtomicU64,
    /// Total datagrams sent
    pub datagrams_sent: AtomicU64,
    /// Total bytes received
    pub bytes_received: AtomicU64,
    /// Total bytes sent
    pub bytes_sent: AtomicU64,
    /// Datagrams dropped for truncated headers
    pub truncated_headers: AtomicU64,
    /// Datagrams dropped as corrupt (zero-expansion, trailer, flag state)
    pub corrupt_packets: AtomicU64,
    /// Packets routed to the unknown-type catch-all
    pub unknown_types: AtomicU64,
    /// Inbound duplicates suppressed before dispatch
    pub duplicates_dropped: AtomicU64,
    /// Reliable packets entered into the pending-send table
    pub reliable_tracked: AtomicU64,
    /// Retransmissions performed
    pub retransmits: AtomicU64,
    /// Reliable sends that exhausted their retry budget
    pub send_timeouts: AtomicU64,
    /// Acks piggybacked onto outbound packets
    pub acks_piggybacked: AtomicU64,
    /// Acks received from the peer
    pub acks_received: AtomicU64,
    /// Dedicated ack-only packets flushed
    pub ack_only_packets: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl WireMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            datagrams_received: AtomicU64::new(0),
            datagrams_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            truncated_headers: AtomicU64::new(0),
            corrupt_packets: AtomicU64::new(0),
            unknown_types: AtomicU64::new(0),
            duplicates_dropped: AtomicU64::new(0),
            reliable_tracked: AtomicU64::new(0),
            retransmits: AtomicU64::new(0),
            send_timeouts: AtomicU64::new(0),
            acks_piggybacked: AtomicU64::new(0),
            acks_received: AtomicU64::new(0),
            ack_only_packets: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a datagram received
    pub fn datagram_received(&self, byte_count: u64) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a datagram sent
    pub fn datagram_sent(&self, byte_count: u64) {
        self.datagrams_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a datagram dropped for a truncated header
    pub fn truncated_header(&self) {
        self.truncated_headers.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a datagram dropped as corrupt
    pub fn corrupt_packet(&self) {
        self.corrupt_packets.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a packet routed to the unknown-type catch-all
    pub fn unknown_type(&self) {
        self.unknown_types.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a duplicate suppressed before dispatch
    pub fn duplicate_dropped(&self) {
        self.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a reliable packet entering the pending-send table
    pub fn reliable_tracked(&self) {
        self.reliable_tracked.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a retransmission
    pub fn retransmit(&self) {
        self.retransmits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a reliable send exhausting its retry budget
    pub fn send_timeout(&self) {
        self.send_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record acks piggybacked onto an outbound packet
    pub fn acks_piggybacked(&self, count: u64) {
        self.acks_piggybacked.fetch_add(count, Ordering::Relaxed);
    }

    /// Record an ack received from the peer
    pub fn ack_received(&self) {
        self.acks_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dedicated ack-only flush packet
    pub fn ack_only_packet(&self) {
        self.ack_only_packets.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            truncated_headers: self.truncated_headers.load(Ordering::Relaxed),
            corrupt_packets: self.corrupt_packets.load(Ordering::Relaxed),
            unknown_types: self.unknown_types.load(Ordering::Relaxed),
            duplicates_dropped: self.duplicates_dropped.load(Ordering::Relaxed),
            reliable_tracked: self.reliable_tracked.load(Ordering::Relaxed),
            retransmits: self.retransmits.load(Ordering::Relaxed),
            send_timeouts: self.send_timeouts.load(Ordering::Relaxed),
            acks_piggybacked: self.acks_piggybacked.load(Ordering::Relaxed),
            acks_received: self.acks_received.load(Ordering::Relaxed),
            ack_only_packets: self.ack_only_packets.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            datagrams_received = snapshot.datagrams_received,
            datagrams_sent = snapshot.datagrams_sent,
            bytes_received = snapshot.bytes_received,
            bytes_sent = snapshot.bytes_sent,
            truncated_headers = snapshot.truncated_headers,
            corrupt_packets = snapshot.corrupt_packets,
            unknown_types = snapshot.unknown_types,
            duplicates_dropped = snapshot.duplicates_dropped,
            reliable_tracked = snapshot.reliable_tracked,
            retransmits = snapshot.retransmits,
            send_timeouts = snapshot.send_timeouts,
            acks_piggybacked = snapshot.acks_piggybacked,
            acks_received = snapshot.acks_received,
            ack_only_packets = snapshot.ack_only_packets,
            uptime_seconds = snapshot.uptime_seconds,
            "Wire metrics snapshot"
        );
    }
}

impl Default for WireMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub datagrams_received: u64,
    pub datagrams_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub truncated_headers: u64,
    pub corrupt_packets: u64,
    pub unknown_types: u64,
    pub duplicates_dropped: u64,
    pub reliable_tracked: u64,
    pub retransmits: u64,
    pub send_timeouts: u64,
    pub acks_piggybacked: u64,
    pub acks_received: u64,
    pub ack_only_packets: u64,
    pub uptime_seconds: u64,
}

/// Global metrics instance (lazy static for simplicity)
static METRICS: once_cell::sync::Lazy<WireMetrics> = once_cell::sync::Lazy::new(WireMetrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static WireMetrics {
    &METRICS
}

/// Initialize metrics collection (call once at startup)
pub fn init_metrics() {
    // Force initialization
    let _ = global_metrics();
    debug!("Metrics collection initialized");
}

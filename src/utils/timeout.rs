//! Canonical timing constants for the wire layer.
//!
//! Config defaults pull from here so that the retransmission and ack
//! coalescing cadence is defined in exactly one place.

use std::time::Duration;

/// Interval between retransmission sweeps of the pending-send table.
pub const RETRANSMIT_INTERVAL: Duration = Duration::from_millis(500);

/// How long queued acks may wait for a piggyback ride before a dedicated
/// ack-only packet flushes them.
pub const ACK_COALESCE_WINDOW: Duration = Duration::from_millis(100);

/// Wall-clock horizon after which dedup-window entries expire.
pub const DEDUP_HORIZON: Duration = Duration::from_secs(30);

/// Timeout for a circuit to drain its timers on shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

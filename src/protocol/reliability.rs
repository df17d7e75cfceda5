//! # Reliability Engine
//!
//! Per-circuit reliability state: the outbound pending-send table, the
//! inbound dedup window, the pending-ack queue, and the retransmission
//! timer.
//!
//! Each reliable send moves through `Sent -> (Resent)* -> Acked | Failed`.
//! Retransmission reuses the stored payload byte-for-byte with only the
//! wire resent bit forced on; the sequence number never changes. An ack
//! removes the entry and resolves the sender's delivery channel; exhausting
//! the retry budget resolves it with `SendTimeout` exactly once.
//!
//! All three shared structures live behind one mutex per circuit, taken for
//! the shortest section that mutates them. Delivery channels are resolved
//! outside the lock. Sequence numbers come from an atomic counter so
//! concurrent senders never collide.

use crate::config::CircuitConfig;
use crate::core::header::set_resent_flag;
use crate::error::{Result, WireError};
use crate::utils::metrics::global_metrics;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Resolution of a reliable send: `Ok(())` on ack, `SendTimeout` after the
/// retry budget, `CircuitClosed` on shutdown.
pub type DeliveryResult = Result<()>;

/// Sender half handed to [`ReliabilityEngine::track`]; resolved exactly once.
pub type DeliverySender = oneshot::Sender<DeliveryResult>;

/// Bounded memory of recently seen inbound sequence numbers.
///
/// Entries age out on three conditions: wall-clock horizon, falling more
/// than the window span behind the highest sequence number seen, or FIFO
/// eviction at capacity. Insertion order rides in a `VecDeque` for O(1)
/// eviction of the oldest entry.
#[derive(Debug)]
pub struct DedupWindow {
    /// Sequence number to the instant it was first seen
    entries: HashMap<u32, Instant>,
    /// Insertion order for FIFO eviction
    insertion_order: VecDeque<u32>,
    /// Maximum number of remembered sequence numbers
    capacity: usize,
    /// Wall-clock age limit for entries
    horizon: Duration,
    /// Highest sequence number observed so far
    highest_seen: u32,
}

impl DedupWindow {
    pub fn new(capacity: usize, horizon: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
            capacity,
            horizon,
            highest_seen: 0,
        }
    }

    /// Record a sequence number; returns true if it was already present.
    pub fn observe(&mut self, sequence: u32) -> bool {
        self.cleanup_expired();

        if self.entries.contains_key(&sequence) {
            return true;
        }

        if self.entries.len() >= self.capacity {
            let to_remove = self.entries.len() - self.capacity + 1;
            self.remove_oldest_entries(to_remove);
        }

        self.entries.insert(sequence, Instant::now());
        self.insertion_order.push_back(sequence);
        self.highest_seen = self.highest_seen.max(sequence);
        false
    }

    /// Number of sequence numbers currently remembered.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries past the age horizon or too far behind the highest
    /// sequence number.
    fn cleanup_expired(&mut self) {
        let now = Instant::now();
        let horizon = self.horizon;
        let span = self.capacity as u32;
        let highest = self.highest_seen;

        self.entries.retain(|&sequence, &mut added_at| {
            now.duration_since(added_at) < horizon && highest.saturating_sub(sequence) <= span
        });

        // Keep the eviction queue in step with the map
        while let Some(sequence) = self.insertion_order.front() {
            if !self.entries.contains_key(sequence) {
                self.insertion_order.pop_front();
            } else {
                break;
            }
        }
    }

    /// Evict the oldest entries when the window is full.
    #[inline]
    fn remove_oldest_entries(&mut self, count: usize) {
        for _ in 0..count {
            if let Some(sequence) = self.insertion_order.pop_front() {
                self.entries.remove(&sequence);
            }
        }
    }
}

/// A reliable packet awaiting acknowledgement, resend-ready.
#[derive(Debug)]
struct PendingSend {
    /// The fully encoded datagram, header included
    payload: Vec<u8>,
    /// When the packet was first handed to the socket
    first_sent_at: Instant,
    /// When the packet was last (re)transmitted
    last_sent_at: Instant,
    /// Retransmissions so far
    retry_count: u32,
    /// Retries allowed before the send fails
    max_retries: u32,
    /// Resolved once with the delivery outcome
    delivery: Option<DeliverySender>,
}

/// Shared mutable circuit state; one lock guards all three structures.
#[derive(Debug)]
struct CircuitState {
    pending: HashMap<u32, PendingSend>,
    dedup: DedupWindow,
    pending_acks: BTreeSet<u32>,
    shut_down: bool,
}

/// Per-circuit reliability engine.
#[derive(Debug)]
pub struct ReliabilityEngine {
    /// Outbound sequence counter; atomic so concurrent senders never collide
    sequence: AtomicU32,
    state: Mutex<CircuitState>,
    config: CircuitConfig,
}

impl ReliabilityEngine {
    pub fn new(config: CircuitConfig) -> Self {
        let state = CircuitState {
            pending: HashMap::new(),
            dedup: DedupWindow::new(config.dedup_capacity, config.dedup_horizon),
            pending_acks: BTreeSet::new(),
            shut_down: false,
        };
        Self {
            sequence: AtomicU32::new(0),
            state: Mutex::new(state),
            config,
        }
    }

    fn state(&self) -> MutexGuard<'_, CircuitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Assign the next outbound sequence number. Numbering starts at 1.
    pub fn next_sequence(&self) -> u32 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Register a reliable packet for retransmission until acked.
    ///
    /// `payload` must be the exact datagram handed to the socket; resends
    /// reuse it unchanged apart from the resent bit. After shutdown the
    /// delivery resolves immediately with `CircuitClosed`.
    pub fn track(&self, sequence: u32, payload: Vec<u8>, delivery: Option<DeliverySender>) {
        let rejected = {
            let mut state = self.state();
            if state.shut_down {
                delivery
            } else {
                let now = Instant::now();
                state.pending.insert(
                    sequence,
                    PendingSend {
                        payload,
                        first_sent_at: now,
                        last_sent_at: now,
                        retry_count: 0,
                        max_retries: self.config.max_retries,
                        delivery,
                    },
                );
                global_metrics().reliable_tracked();
                debug!(sequence, "Tracking reliable packet");
                None
            }
        };

        if let Some(sender) = rejected {
            let _ = sender.send(Err(WireError::CircuitClosed));
        }
    }

    /// Apply acknowledgements from the peer. Returns how many pending sends
    /// they resolved.
    pub fn acknowledge(&self, acks: &[u32]) -> usize {
        let mut resolved = Vec::new();
        {
            let mut state = self.state();
            for &ack in acks {
                if let Some(entry) = state.pending.remove(&ack) {
                    resolved.push((ack, entry));
                }
            }
        }

        let count = resolved.len();
        for (sequence, entry) in resolved {
            global_metrics().ack_received();
            debug!(
                sequence,
                retries = entry.retry_count,
                elapsed_ms = entry.first_sent_at.elapsed().as_millis() as u64,
                "Reliable packet acknowledged"
            );
            if let Some(sender) = entry.delivery {
                let _ = sender.send(Ok(()));
            }
        }
        count
    }

    /// Record an inbound sequence number. Returns true if it is a duplicate
    /// that must not reach dispatch.
    ///
    /// Reliable packets enqueue their ack regardless of the dedup verdict: a
    /// peer that never sees its resend acked keeps resending.
    pub fn observe_inbound(&self, sequence: u32, reliable: bool) -> bool {
        let mut state = self.state();
        let duplicate = state.dedup.observe(sequence);
        if reliable {
            state.pending_acks.insert(sequence);
        }
        duplicate
    }

    /// Drain up to `max` queued acks for piggybacking or a dedicated flush.
    pub fn take_acks(&self, max: usize) -> Vec<u32> {
        let mut state = self.state();
        let mut acks = Vec::with_capacity(max.min(state.pending_acks.len()));
        while acks.len() < max {
            match state.pending_acks.pop_first() {
                Some(sequence) => acks.push(sequence),
                None => break,
            }
        }
        acks
    }

    /// Whether any acks are waiting to go out.
    pub fn has_pending_acks(&self) -> bool {
        !self.state().pending_acks.is_empty()
    }

    /// Number of reliable packets awaiting acknowledgement.
    pub fn pending_send_count(&self) -> usize {
        self.state().pending.len()
    }

    /// Sweep the pending table: collect payloads due for retransmission and
    /// fail entries that exhausted their retry budget.
    ///
    /// Returned payloads already carry the resent bit and an unchanged
    /// sequence number; the caller hands them to the socket.
    pub fn collect_retransmits(&self) -> Vec<Vec<u8>> {
        let now = Instant::now();
        let mut resends = Vec::new();
        let mut failed = Vec::new();

        {
            let mut state = self.state();
            let interval = self.config.retransmit_interval;

            let expired: Vec<u32> = state
                .pending
                .iter_mut()
                .filter_map(|(&sequence, entry)| {
                    if now.duration_since(entry.last_sent_at) < interval {
                        return None;
                    }
                    if entry.retry_count >= entry.max_retries {
                        return Some(sequence);
                    }
                    entry.retry_count += 1;
                    entry.last_sent_at = now;
                    set_resent_flag(&mut entry.payload);
                    resends.push(entry.payload.clone());
                    None
                })
                .collect();

            for sequence in expired {
                if let Some(entry) = state.pending.remove(&sequence) {
                    failed.push((sequence, entry));
                }
            }
        }

        for (sequence, entry) in failed {
            global_metrics().send_timeout();
            warn!(
                sequence,
                retries = entry.retry_count,
                "Reliable packet exceeded max retries"
            );
            if let Some(sender) = entry.delivery {
                let _ = sender.send(Err(WireError::SendTimeout));
            }
        }

        if !resends.is_empty() {
            debug!(count = resends.len(), "Retransmitting unacked packets");
        }
        resends
    }

    /// Shut the circuit down: cancel every pending send with `CircuitClosed`
    /// and drop queued acks. Idempotent; no delivery fires twice.
    pub fn shutdown(&self) {
        let drained: Vec<PendingSend> = {
            let mut state = self.state();
            state.shut_down = true;
            state.pending_acks.clear();
            state.pending.drain().map(|(_, entry)| entry).collect()
        };

        if !drained.is_empty() {
            debug!(cancelled = drained.len(), "Circuit shutdown cancelled pending sends");
        }
        for entry in drained {
            if let Some(sender) = entry.delivery {
                let _ = sender.send(Err(WireError::CircuitClosed));
            }
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.state().shut_down
    }

    /// Periodic retransmission sweep, running until shutdown.
    ///
    /// Due payloads go to `outbound`, the socket collaborator's queue. The
    /// loop exits when the shutdown channel fires, the engine is shut down,
    /// or the outbound side is gone.
    pub async fn run_retransmit_timer(
        self: Arc<Self>,
        outbound: mpsc::Sender<Vec<u8>>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(self.config.retransmit_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Retransmit timer stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if self.is_shut_down() {
                        debug!("Retransmit timer observed shutdown");
                        return;
                    }
                    for payload in self.collect_retransmits() {
                        global_metrics().retransmit();
                        if outbound.send(payload).await.is_err() {
                            warn!("Outbound channel closed; retransmit timer stopping");
                            return;
                        }
                    }
                }
            }
        }
    }
}

//! # Packet Pipeline
//!
//! Composes the header codec, zero-run coding, the type registry, and the
//! reliability engine into the two operations the session layer sees:
//! datagram in, `(header, type, body bytes)` out - and the reverse.
//!
//! The pipeline owns no socket. Inbound datagrams arrive from the socket
//! collaborator one at a time; outbound datagrams and timer-driven
//! retransmissions leave through an `mpsc` channel the collaborator drains.
//!
//! Decode order: split the ack trailer off the tail, decode the header from
//! the front, consume acks and dedup via the reliability engine, then
//! expand the body and resolve the type. Duplicates are dropped after their
//! acks are honored. An unrecognized wire id is delivered through the
//! catch-all [`TypeDispatch::Unknown`] path, never an error.

use crate::config::{TransportConfig, WireConfig};
use crate::core::header::{self, Frequency, PacketHeader, FLAG_ACK_APPENDED, MIN_HEADER_LEN};
use crate::core::registry::{TypeRegistry, TypeTag};
use crate::core::zerocode;
use crate::error::{constants, Result, WireError};
use crate::protocol::reliability::{DeliverySender, ReliabilityEngine};
use crate::utils::metrics::global_metrics;
use crate::utils::timeout::SHUTDOWN_TIMEOUT;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How a decoded packet's type resolved against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeDispatch {
    /// A registered message type.
    Known(TypeTag),
    /// Forward-compatibility catch-all: the wire id is not registered, the
    /// raw header and body still reach the caller.
    Unknown { frequency: Frequency, id: u32 },
}

/// A datagram decoded down to the bytes the external body codec consumes.
#[derive(Debug)]
pub struct DecodedPacket {
    pub header: PacketHeader,
    pub dispatch: TypeDispatch,
    pub body: Vec<u8>,
}

impl DecodedPacket {
    /// Compact one-line description for diagnostics and logs.
    pub fn describe(&self) -> String {
        let name = match self.dispatch {
            TypeDispatch::Known(tag) => tag.0.to_string(),
            TypeDispatch::Unknown { frequency, id } => {
                format!("unknown({}/{id})", frequency.name())
            }
        };
        format!(
            "{name} seq={}{}{} body={}B",
            self.header.sequence,
            if self.header.reliable { " reliable" } else { "" },
            if self.header.resent { " resent" } else { "" },
            self.body.len()
        )
    }
}

/// Handles to a circuit's background timers; shut down exactly once.
pub struct CircuitTasks {
    reliability: Arc<ReliabilityEngine>,
    retransmit_shutdown: mpsc::Sender<()>,
    ack_shutdown: mpsc::Sender<()>,
    retransmit_task: JoinHandle<()>,
    ack_task: JoinHandle<()>,
}

impl CircuitTasks {
    /// Stop both timers and drain the engine: every pending send resolves
    /// with `CircuitClosed`, and nothing fires afterwards.
    pub async fn shutdown(self) {
        self.reliability.shutdown();
        let _ = self.retransmit_shutdown.send(()).await;
        let _ = self.ack_shutdown.send(()).await;

        for task in [self.retransmit_task, self.ack_task] {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await.is_err() {
                warn!("Circuit timer did not stop within the shutdown timeout");
            }
        }
    }
}

/// The wire layer's composition root; the only component the session layer
/// talks to.
pub struct PacketPipeline {
    registry: Arc<TypeRegistry>,
    reliability: Arc<ReliabilityEngine>,
    transport: TransportConfig,
    ack_coalesce_window: Duration,
    /// Type used for dedicated ack-only flush packets; registered by the
    /// session layer like any other message type.
    ack_tag: TypeTag,
}

impl PacketPipeline {
    pub fn new(config: &WireConfig, registry: Arc<TypeRegistry>, ack_tag: TypeTag) -> Self {
        Self {
            registry,
            reliability: Arc::new(ReliabilityEngine::new(config.circuit.clone())),
            transport: config.transport.clone(),
            ack_coalesce_window: config.circuit.ack_coalesce_window,
            ack_tag,
        }
    }

    /// The circuit's reliability engine.
    pub fn reliability(&self) -> &Arc<ReliabilityEngine> {
        &self.reliability
    }

    /// The shared type registry.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Decode one inbound datagram.
    ///
    /// Returns `Ok(None)` for duplicates, which are dropped after their
    /// acks and ack-queue bookkeeping are applied.
    ///
    /// # Errors
    /// `TruncatedHeader` and `CorruptPacket` mean the datagram was dropped;
    /// both are counted and neither affects circuit liveness.
    pub fn decode_datagram(&self, datagram: &[u8]) -> Result<Option<DecodedPacket>> {
        global_metrics().datagram_received(datagram.len() as u64);

        match self.decode_inner(datagram) {
            Ok(packet) => Ok(packet),
            Err(err) => {
                match err {
                    WireError::TruncatedHeader => global_metrics().truncated_header(),
                    WireError::CorruptPacket(_) => global_metrics().corrupt_packet(),
                    _ => {}
                }
                warn!(error = %err, len = datagram.len(), "Dropping malformed datagram");
                Err(err)
            }
        }
    }

    fn decode_inner(&self, datagram: &[u8]) -> Result<Option<DecodedPacket>> {
        let flags = *datagram.first().ok_or(WireError::TruncatedHeader)?;

        // The trailer is split off before anything else; its count is the
        // datagram's final byte, so the tail is self-delimiting.
        let (framed, acks) = if flags & FLAG_ACK_APPENDED != 0 {
            let count = *datagram
                .last()
                .ok_or_else(|| WireError::CorruptPacket(constants::ERR_ACK_TRAILER_TRUNCATED.into()))?
                as usize;
            let trailer_len = count * 4 + 1;
            // The trailer must leave room for at least a minimal header
            if datagram.len() < trailer_len + MIN_HEADER_LEN + 1 {
                return Err(WireError::CorruptPacket(
                    constants::ERR_ACK_TRAILER_TRUNCATED.into(),
                ));
            }
            let boundary = datagram.len() - trailer_len;
            (
                &datagram[..boundary],
                header::decode_acks(&datagram[boundary..])?,
            )
        } else {
            (datagram, Vec::new())
        };

        let (packet_header, header_len) = PacketHeader::from_bytes(framed)?;

        // Acks are consumed even when the packet itself is a duplicate
        if !acks.is_empty() {
            self.reliability.acknowledge(&acks);
        }

        let duplicate = self
            .reliability
            .observe_inbound(packet_header.sequence, packet_header.reliable);
        if duplicate {
            global_metrics().duplicate_dropped();
            debug!(
                sequence = packet_header.sequence,
                resent = packet_header.resent,
                "Dropping duplicate datagram"
            );
            return Ok(None);
        }

        let raw_body = &framed[header_len..];
        let body = if packet_header.zerocoded {
            zerocode::expand(raw_body, self.transport.max_expanded_size)?
        } else {
            raw_body.to_vec()
        };

        let dispatch = match self
            .registry
            .tag_for(packet_header.frequency, packet_header.id)
        {
            Some(tag) => TypeDispatch::Known(tag),
            None => {
                global_metrics().unknown_type();
                debug!(
                    frequency = packet_header.frequency.name(),
                    id = packet_header.id,
                    "Unrecognized message type routed to catch-all"
                );
                TypeDispatch::Unknown {
                    frequency: packet_header.frequency,
                    id: packet_header.id,
                }
            }
        };

        Ok(Some(DecodedPacket {
            header: packet_header,
            dispatch,
            body,
        }))
    }

    /// Encode an outbound packet.
    pub fn encode_packet(&self, tag: TypeTag, body: &[u8], reliable: bool) -> Result<Vec<u8>> {
        self.encode_packet_with_delivery(tag, body, reliable, None)
    }

    /// Encode an outbound packet, resolving `delivery` when the send is
    /// acked, times out, or the circuit closes. For unreliable packets the
    /// delivery resolves immediately: there is nothing to wait for.
    pub fn encode_packet_with_delivery(
        &self,
        tag: TypeTag,
        body: &[u8],
        reliable: bool,
        delivery: Option<DeliverySender>,
    ) -> Result<Vec<u8>> {
        let (frequency, id) = self
            .registry
            .wire_id(tag)
            .ok_or(WireError::UnregisteredType(tag.0))?;

        let mut packet_header = PacketHeader::new(frequency, id, self.reliability.next_sequence());
        packet_header.reliable = reliable;

        let (body_bytes, coded) = if self.transport.zerocode_enabled {
            zerocode::maybe_compress(body)
        } else {
            (body.to_vec(), false)
        };
        packet_header.zerocoded = coded;

        // Reserve the trailer decision until the base size is known, so an
        // oversized packet never swallows queued acks.
        let mut packet_header_no_acks = packet_header.clone();
        packet_header_no_acks.ack_appended = false;
        let base_len = packet_header_no_acks.to_bytes()?.len() + body_bytes.len();
        if base_len > self.transport.max_datagram_size {
            return Err(WireError::OversizedPacket(base_len));
        }

        let spare = self.transport.max_datagram_size - base_len;
        let ack_room = if spare >= 5 { (spare - 1) / 4 } else { 0 };
        let acks = if ack_room > 0 {
            self.reliability
                .take_acks(ack_room.min(header::MAX_APPENDED_ACKS))
        } else {
            Vec::new()
        };
        packet_header.ack_appended = !acks.is_empty();

        let mut datagram = packet_header.to_bytes()?;
        datagram.extend_from_slice(&body_bytes);
        if packet_header.ack_appended {
            datagram.extend_from_slice(&header::encode_acks(&acks)?);
            global_metrics().acks_piggybacked(acks.len() as u64);
        }

        if reliable {
            self.reliability
                .track(packet_header.sequence, datagram.clone(), delivery);
        } else if let Some(sender) = delivery {
            let _ = sender.send(Ok(()));
        }

        global_metrics().datagram_sent(datagram.len() as u64);
        Ok(datagram)
    }

    /// Emit a dedicated ack-only packet if any acks are queued.
    ///
    /// Returns `Ok(None)` when the queue is empty.
    pub fn flush_acks(&self) -> Result<Option<Vec<u8>>> {
        if !self.reliability.has_pending_acks() {
            return Ok(None);
        }

        let datagram = self.encode_packet(self.ack_tag, &[], false)?;
        global_metrics().ack_only_packet();
        debug!(len = datagram.len(), "Flushing queued acks");
        Ok(Some(datagram))
    }

    /// Ack coalescing loop: if queued acks survive a full window with no
    /// outbound traffic to piggyback on, flush them in a dedicated packet.
    pub async fn run_ack_timer(
        self: Arc<Self>,
        outbound: mpsc::Sender<Vec<u8>>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(self.ack_coalesce_window);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Ack flush timer stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if self.reliability.is_shut_down() {
                        debug!("Ack flush timer observed shutdown");
                        return;
                    }
                    match self.flush_acks() {
                        Ok(Some(datagram)) => {
                            if outbound.send(datagram).await.is_err() {
                                warn!("Outbound channel closed; ack flush timer stopping");
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(err) => warn!(error = %err, "Failed to build ack-only packet"),
                    }
                }
            }
        }
    }

    /// Start the circuit's retransmission and ack-flush timers.
    ///
    /// Outbound datagrams from both timers go to `outbound`, the socket
    /// collaborator's queue.
    pub fn spawn_circuit_tasks(self: Arc<Self>, outbound: mpsc::Sender<Vec<u8>>) -> CircuitTasks {
        let (retransmit_shutdown, retransmit_rx) = mpsc::channel(1);
        let (ack_shutdown, ack_rx) = mpsc::channel(1);

        let reliability = self.reliability.clone();
        let retransmit_task = tokio::spawn(
            reliability
                .clone()
                .run_retransmit_timer(outbound.clone(), retransmit_rx),
        );
        let ack_task = tokio::spawn(self.run_ack_timer(outbound, ack_rx));

        CircuitTasks {
            reliability,
            retransmit_shutdown,
            ack_shutdown,
            retransmit_task,
            ack_task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::{MessageBody, TypeRegistration};

    #[derive(Debug)]
    struct RawBody(Vec<u8>);

    impl MessageBody for RawBody {
        fn type_tag(&self) -> TypeTag {
            TypeTag("Raw")
        }

        fn to_bytes(&self) -> Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    fn raw_decoder(bytes: &[u8]) -> Result<Box<dyn MessageBody>> {
        Ok(Box::new(RawBody(bytes.to_vec())))
    }

    fn test_registry() -> Arc<TypeRegistry> {
        Arc::new(
            TypeRegistry::from_table(&[
                TypeRegistration {
                    frequency: Frequency::Low,
                    id: 9,
                    tag: TypeTag("ChatFromViewer"),
                    decoder: raw_decoder,
                },
                TypeRegistration {
                    frequency: Frequency::Fixed,
                    id: 0xFFFF_FFFB,
                    tag: TypeTag("PacketAck"),
                    decoder: raw_decoder,
                },
            ])
            .unwrap(),
        )
    }

    fn test_pipeline() -> PacketPipeline {
        PacketPipeline::new(
            &WireConfig::default(),
            test_registry(),
            TypeTag("PacketAck"),
        )
    }

    #[test]
    fn encode_then_decode_round_trip() {
        let sender = test_pipeline();
        let receiver = test_pipeline();

        let body = [0x01, 0x02, 0x03];
        let datagram = sender
            .encode_packet(TypeTag("ChatFromViewer"), &body, true)
            .unwrap();

        let packet = receiver.decode_datagram(&datagram).unwrap().unwrap();
        assert_eq!(packet.dispatch, TypeDispatch::Known(TypeTag("ChatFromViewer")));
        assert_eq!(packet.body, body);
        assert!(packet.header.reliable);
        assert_eq!(packet.header.sequence, 1);
    }

    #[test]
    fn unknown_wire_id_reaches_catch_all() {
        let receiver = test_pipeline();

        // High-frequency id 0x33 is not registered
        let datagram = [0x00, 0, 0, 0, 1, 0x00, 0x33, 0xAA, 0xBB];
        let packet = receiver.decode_datagram(&datagram).unwrap().unwrap();
        assert_eq!(
            packet.dispatch,
            TypeDispatch::Unknown {
                frequency: Frequency::High,
                id: 0x33
            }
        );
        assert_eq!(packet.body, vec![0xAA, 0xBB]);
    }

    #[test]
    fn duplicate_is_dropped_but_acks_are_consumed() {
        let sender = test_pipeline();
        let receiver = test_pipeline();

        // The sender has a reliable packet pending with sequence 1
        sender
            .encode_packet(TypeTag("ChatFromViewer"), b"hi", true)
            .unwrap();
        assert_eq!(sender.reliability().pending_send_count(), 1);

        // The receiver saw the packet and owes the ack; craft the peer's
        // next datagram twice with the same sequence and the ack appended
        receiver.reliability().observe_inbound(1, false);
        let mut datagram = receiver
            .encode_packet(TypeTag("ChatFromViewer"), b"reply", true)
            .unwrap();
        // (no acks were queued on the receiver; append one by hand)
        datagram[0] |= FLAG_ACK_APPENDED;
        datagram.extend_from_slice(&header::encode_acks(&[1]).unwrap());

        let first = sender.decode_datagram(&datagram).unwrap();
        assert!(first.is_some());
        assert_eq!(sender.reliability().pending_send_count(), 0);

        // Same sequence again: dropped, no second delivery
        let second = sender.decode_datagram(&datagram).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn piggybacked_acks_clear_the_queue() {
        let pipeline = test_pipeline();
        pipeline.reliability().observe_inbound(7, true);
        pipeline.reliability().observe_inbound(8, true);

        let datagram = pipeline
            .encode_packet(TypeTag("ChatFromViewer"), b"x", true)
            .unwrap();

        assert!(!pipeline.reliability().has_pending_acks());
        let trailer = &datagram[datagram.len() - 9..];
        assert_eq!(trailer, &[0, 0, 0, 7, 0, 0, 0, 8, 0x02]);

        let (decoded, _) = PacketHeader::from_bytes(&datagram).unwrap();
        assert!(decoded.ack_appended);
    }

    #[test]
    fn flush_acks_builds_ack_only_packet() {
        let pipeline = test_pipeline();
        assert!(pipeline.flush_acks().unwrap().is_none());

        pipeline.reliability().observe_inbound(42, true);
        let datagram = pipeline.flush_acks().unwrap().unwrap();

        let (decoded, _) = PacketHeader::from_bytes(&datagram).unwrap();
        assert!(!decoded.reliable);
        assert!(decoded.ack_appended);
        assert_eq!(
            header::decode_acks(&datagram[datagram.len() - 5..]).unwrap(),
            vec![42]
        );
    }

    #[test]
    fn zerocoded_bodies_round_trip_through_the_pipeline() {
        let sender = test_pipeline();
        let receiver = test_pipeline();

        let body = vec![0u8; 256];
        let datagram = sender
            .encode_packet(TypeTag("ChatFromViewer"), &body, false)
            .unwrap();
        assert!(datagram.len() < body.len());

        let packet = receiver.decode_datagram(&datagram).unwrap().unwrap();
        assert!(packet.header.zerocoded);
        assert_eq!(packet.body, body);
    }

    #[test]
    fn truncated_and_corrupt_datagrams_are_errors_not_panics() {
        let pipeline = test_pipeline();

        assert!(matches!(
            pipeline.decode_datagram(&[]),
            Err(WireError::TruncatedHeader)
        ));
        assert!(matches!(
            pipeline.decode_datagram(&[0x40, 0, 0]),
            Err(WireError::TruncatedHeader)
        ));
        // Ack-appended flag with an impossible trailer
        assert!(matches!(
            pipeline.decode_datagram(&[FLAG_ACK_APPENDED, 0, 0, 0, 1, 0, 5, 0xFF]),
            Err(WireError::CorruptPacket(_))
        ));
    }

    #[test]
    fn oversized_body_is_rejected_without_losing_acks() {
        let pipeline = test_pipeline();
        pipeline.reliability().observe_inbound(3, true);

        let body = vec![0xAB; 4096];
        let result = pipeline.encode_packet(TypeTag("ChatFromViewer"), &body, false);
        assert!(matches!(result, Err(WireError::OversizedPacket(_))));
        assert!(pipeline.reliability().has_pending_acks());
    }

    #[test]
    fn describe_names_the_type_and_flags() {
        let sender = test_pipeline();
        let receiver = test_pipeline();

        let datagram = sender
            .encode_packet(TypeTag("ChatFromViewer"), b"hello", true)
            .unwrap();
        let packet = receiver.decode_datagram(&datagram).unwrap().unwrap();

        let line = packet.describe();
        assert!(line.contains("ChatFromViewer"));
        assert!(line.contains("seq=1"));
        assert!(line.contains("reliable"));
    }
}

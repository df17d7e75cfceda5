#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Reliability behavior end-to-end: retransmission with the resent flag,
//! retry exhaustion, ack-driven resolution, coalesced ack flushes, duplicate
//! suppression, and circuit shutdown.

use gridwire::core::header::{self, Frequency, PacketHeader};
use gridwire::core::registry::{MessageBody, TypeRegistry, TypeTag};
use gridwire::error::WireError;
use gridwire::protocol::pipeline::PacketPipeline;
use gridwire::WireConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

#[derive(Debug)]
struct RawBody(Vec<u8>);

impl MessageBody for RawBody {
    fn type_tag(&self) -> TypeTag {
        TypeTag("Raw")
    }

    fn to_bytes(&self) -> gridwire::Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

fn raw_decoder(bytes: &[u8]) -> gridwire::Result<Box<dyn MessageBody>> {
    Ok(Box::new(RawBody(bytes.to_vec())))
}

fn fast_pipeline(max_retries: u32) -> Arc<PacketPipeline> {
    let config = WireConfig::default_with_overrides(|c| {
        c.circuit.retransmit_interval = Duration::from_millis(30);
        c.circuit.ack_coalesce_window = Duration::from_millis(30);
        c.circuit.max_retries = max_retries;
    });

    let mut builder = TypeRegistry::builder();
    builder
        .register(Frequency::Low, 9, TypeTag("ChatFromViewer"), raw_decoder)
        .unwrap();
    builder
        .register(
            Frequency::Fixed,
            0xFFFF_FFFB,
            TypeTag("PacketAck"),
            raw_decoder,
        )
        .unwrap();

    Arc::new(PacketPipeline::new(
        &config,
        Arc::new(builder.build()),
        TypeTag("PacketAck"),
    ))
}

async fn recv_within(rx: &mut mpsc::Receiver<Vec<u8>>, ms: u64) -> Option<Vec<u8>> {
    timeout(Duration::from_millis(ms), rx.recv()).await.ok()?
}

#[tokio::test]
async fn unacked_packet_retransmits_with_resent_flag_and_same_sequence() {
    let pipeline = fast_pipeline(3);
    let (outbound_tx, mut outbound_rx) = mpsc::channel(64);
    let tasks = pipeline.clone().spawn_circuit_tasks(outbound_tx);

    let original = pipeline
        .encode_packet(TypeTag("ChatFromViewer"), b"hello", true)
        .unwrap();
    let (original_header, _) = PacketHeader::from_bytes(&original).unwrap();
    assert!(!original_header.resent);

    let resend = recv_within(&mut outbound_rx, 500)
        .await
        .expect("retransmission should arrive");
    let (resend_header, _) = PacketHeader::from_bytes(&resend).unwrap();

    assert!(resend_header.resent);
    assert!(resend_header.reliable);
    assert_eq!(resend_header.sequence, original_header.sequence);
    // Identical payload apart from the flag bit
    assert_eq!(&resend[1..], &original[1..]);

    tasks.shutdown().await;
}

#[tokio::test]
async fn retry_exhaustion_reports_send_timeout_exactly_once() {
    let pipeline = fast_pipeline(1);
    let (outbound_tx, mut outbound_rx) = mpsc::channel(64);
    let tasks = pipeline.clone().spawn_circuit_tasks(outbound_tx);

    let (delivery_tx, delivery_rx) = oneshot::channel();
    pipeline
        .encode_packet_with_delivery(TypeTag("ChatFromViewer"), b"doomed", true, Some(delivery_tx))
        .unwrap();

    // One retry is allowed, then the send must fail
    assert!(recv_within(&mut outbound_rx, 500).await.is_some());

    let outcome = timeout(Duration::from_millis(500), delivery_rx)
        .await
        .expect("delivery should resolve")
        .expect("sender half must not be dropped silently");
    assert!(matches!(outcome, Err(WireError::SendTimeout)));

    assert_eq!(pipeline.reliability().pending_send_count(), 0);

    // No further retransmissions for the dead sequence number
    assert!(recv_within(&mut outbound_rx, 120).await.is_none());

    tasks.shutdown().await;
}

#[tokio::test]
async fn ack_resolves_delivery_and_stops_retransmission() {
    let pipeline = fast_pipeline(5);
    let (outbound_tx, mut outbound_rx) = mpsc::channel(64);
    let tasks = pipeline.clone().spawn_circuit_tasks(outbound_tx);

    let (delivery_tx, delivery_rx) = oneshot::channel();
    let datagram = pipeline
        .encode_packet_with_delivery(TypeTag("ChatFromViewer"), b"wanted", true, Some(delivery_tx))
        .unwrap();
    let (sent_header, _) = PacketHeader::from_bytes(&datagram).unwrap();

    pipeline.reliability().acknowledge(&[sent_header.sequence]);

    let outcome = timeout(Duration::from_millis(200), delivery_rx)
        .await
        .expect("delivery should resolve")
        .expect("sender half must not be dropped");
    assert!(outcome.is_ok());

    // Acked packets never retransmit; drain any sweep that raced the ack
    while outbound_rx.try_recv().is_ok() {}
    assert!(recv_within(&mut outbound_rx, 120).await.is_none());

    tasks.shutdown().await;
}

#[tokio::test]
async fn queued_acks_flush_in_dedicated_packet_when_idle() {
    let pipeline = fast_pipeline(3);
    let (outbound_tx, mut outbound_rx) = mpsc::channel(64);
    let tasks = pipeline.clone().spawn_circuit_tasks(outbound_tx);

    // Two reliable inbound packets owe acks; no outbound traffic follows
    pipeline.reliability().observe_inbound(7, true);
    pipeline.reliability().observe_inbound(8, true);

    let flushed = recv_within(&mut outbound_rx, 500)
        .await
        .expect("ack-only packet should flush after the coalescing window");

    let (flushed_header, _) = PacketHeader::from_bytes(&flushed).unwrap();
    assert!(!flushed_header.reliable);
    assert!(flushed_header.ack_appended);
    assert_eq!(
        header::decode_acks(&flushed[flushed.len() - 9..]).unwrap(),
        vec![7, 8]
    );
    assert!(!pipeline.reliability().has_pending_acks());

    tasks.shutdown().await;
}

#[tokio::test]
async fn duplicate_sequence_is_delivered_exactly_once() {
    let sender = fast_pipeline(3);
    let receiver = fast_pipeline(3);

    let datagram = sender
        .encode_packet(TypeTag("ChatFromViewer"), b"once", true)
        .unwrap();

    let first = receiver.decode_datagram(&datagram).unwrap();
    assert!(first.is_some());

    // The peer resends: identical bytes, resent flag forced
    let mut resend = datagram.clone();
    header::set_resent_flag(&mut resend);
    let second = receiver.decode_datagram(&resend).unwrap();
    assert!(second.is_none(), "duplicate must not reach dispatch");

    // An unflagged duplicate under reordering is dropped too
    let third = receiver.decode_datagram(&datagram).unwrap();
    assert!(third.is_none());

    // All three copies still owe exactly one ack entry
    assert_eq!(receiver.reliability().take_acks(16).len(), 1);
}

#[tokio::test]
async fn shutdown_fails_pending_sends_and_silences_timers() {
    let pipeline = fast_pipeline(50);
    let (outbound_tx, mut outbound_rx) = mpsc::channel(64);
    let tasks = pipeline.clone().spawn_circuit_tasks(outbound_tx);

    let (delivery_tx, delivery_rx) = oneshot::channel();
    pipeline
        .encode_packet_with_delivery(
            TypeTag("ChatFromViewer"),
            b"abandoned",
            true,
            Some(delivery_tx),
        )
        .unwrap();
    pipeline.reliability().observe_inbound(99, true);

    tasks.shutdown().await;

    let outcome = delivery_rx.await.expect("delivery resolves on shutdown");
    assert!(matches!(outcome, Err(WireError::CircuitClosed)));
    assert_eq!(pipeline.reliability().pending_send_count(), 0);

    // Drain anything the timers sent before stopping, then confirm silence
    while outbound_rx.try_recv().is_ok() {}
    assert!(recv_within(&mut outbound_rx, 120).await.is_none());

    // Reliable sends after shutdown fail immediately
    let (late_tx, late_rx) = oneshot::channel();
    pipeline
        .encode_packet_with_delivery(TypeTag("ChatFromViewer"), b"late", true, Some(late_tx))
        .unwrap();
    assert!(matches!(
        late_rx.await,
        Ok(Err(WireError::CircuitClosed))
    ));
}

//! # gridwire
//!
//! Reliable UDP wire layer for virtual-world clients.
//!
//! This crate turns raw UDP datagrams into typed, reliably-delivered
//! application messages and back. It is the shared core beneath the
//! generated per-message body codecs: the packet header codec, the zero-run
//! body coding, the message type registry, and the reliability engine that
//! makes best-effort UDP loss-tolerant (duplicate suppression,
//! retransmission with a retry budget, ack coalescing).
//!
//! ## Architecture
//! - [`core`] - stateless wire-format leaves: header, zerocode, registry
//! - [`protocol`] - reliability engine and the packet pipeline
//! - [`config`] - circuit, transport, and logging configuration
//! - [`utils`] - logging, metrics, timing constants
//!
//! Socket I/O lives outside this crate: the session layer feeds inbound
//! datagrams to [`protocol::pipeline::PacketPipeline::decode_datagram`] and
//! drains outbound bytes from [`protocol::pipeline::PacketPipeline::encode_packet`]
//! and the circuit timer tasks.
//!
//! ## Example
//! ```rust
//! use gridwire::core::header::Frequency;
//! use gridwire::core::registry::{TypeRegistry, TypeTag};
//! use gridwire::protocol::pipeline::PacketPipeline;
//! use gridwire::config::WireConfig;
//! use std::sync::Arc;
//!
//! # fn main() -> gridwire::error::Result<()> {
//! let mut registry = TypeRegistry::builder();
//! registry.register(Frequency::Fixed, 0xFFFF_FFFB, TypeTag("PacketAck"), |bytes| {
//!     unimplemented!("the generated PacketAck codec decodes {bytes:?}")
//! })?;
//! let pipeline = PacketPipeline::new(
//!     &WireConfig::default(),
//!     Arc::new(registry.build()),
//!     TypeTag("PacketAck"),
//! );
//!
//! let datagram = pipeline.encode_packet(TypeTag("PacketAck"), &[], false)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod utils;

pub use crate::config::WireConfig;
pub use crate::core::header::{Frequency, PacketHeader};
pub use crate::core::registry::{TypeRegistry, TypeTag};
pub use crate::error::{Result, WireError};
pub use crate::protocol::pipeline::{DecodedPacket, PacketPipeline, TypeDispatch};
pub use crate::protocol::reliability::ReliabilityEngine;

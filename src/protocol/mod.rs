//! # Protocol Layer
//!
//! The stateful half of the wire layer: reliability bookkeeping and the
//! pipeline that composes it with the wire-format codecs.
//!
//! ## Components
//! - **Reliability**: Pending-send table, dedup window, ack queue, retransmit timer
//! - **Pipeline**: Datagram decode/encode exposed to the session layer

pub mod pipeline;
pub mod reliability;

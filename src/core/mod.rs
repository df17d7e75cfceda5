//! # Core Wire-Format Components
//!
//! The stateless leaves of the wire layer: header codec, zero-run coding,
//! and the message type registry.
//!
//! ## Components
//! - **Header**: Flags, sequence numbers, frequency-class message ids, ack trailers
//! - **Zerocode**: Run-length transform for zero-heavy message bodies
//! - **Registry**: `(frequency, id)` to type-tag resolution for dispatch
//!
//! ## Wire Format
//! ```text
//! [Flags(1)] [Sequence(4 BE)] [ExtraLen(1)] [Extra(N)] [MessageId(1..4)] [Body(M)] [AckTrailer?]
//! ```
//!
//! ## Security
//! - Bounded zero-expansion (prevents memory exhaustion)
//! - Truncation-safe decoding of every field
//! - Length validation before allocation

pub mod header;
pub mod registry;
pub mod zerocode;

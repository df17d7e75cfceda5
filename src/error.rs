//! # Error Types
//!
//! Error handling for the wire layer.
//!
//! This module defines all error variants that can occur while turning raw
//! datagrams into typed messages and back, from malformed untrusted input to
//! reliability failures surfaced to senders.
//!
//! ## Error Categories
//! - **Decode Errors**: Truncated headers, corrupt zero-coded bodies, malformed ack trailers
//! - **Encode Errors**: Field and id range violations
//! - **Reliability Errors**: Send timeouts, circuit shutdown
//! - **Configuration Errors**: Invalid or unreadable configuration
//!
//! Every malformed-input path returns an error instead of panicking; this
//! layer processes hostile network data.

use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
/// Static strings are borrowed, avoiding heap allocations for common error cases.
pub mod constants {
    /// Zero-expansion errors
    pub const ERR_ZERO_EXPAND_OVERFLOW: &str = "Zero-expansion exceeds maximum output length";
    pub const ERR_UNTERMINATED_ZERO: &str = "Zero byte at end of stream with no count byte";
    pub const ERR_ZERO_COUNT: &str = "Zero-run count byte of zero";

    /// Ack trailer errors
    pub const ERR_ACK_TRAILER_SHORT: &str = "Appended-ack trailer shorter than its count claims";
    pub const ERR_ACK_TRAILER_TRUNCATED: &str =
        "Ack-appended flag set on datagram too short for a trailer";

    /// Registry errors
    pub const ERR_DUPLICATE_WIRE_ID: &str = "Wire id already registered";
    pub const ERR_DUPLICATE_TAG: &str = "Type tag already registered";
}

/// WireError is the primary error type for all wire-layer operations.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("Truncated packet header")]
    TruncatedHeader,

    #[error("Corrupt packet: {0}")]
    CorruptPacket(String),

    #[error("Reliable send timed out after max retries")]
    SendTimeout,

    #[error("Circuit closed")]
    CircuitClosed,

    #[error("Field exceeds maximum length of {max} bytes")]
    FieldTooLong { max: usize },

    #[error("Message id {id} out of range (maximum {max})")]
    IdOutOfRange { id: u32, max: u32 },

    #[error("Duplicate registration: {0}")]
    DuplicateRegistration(String),

    #[error("Type tag not registered: {0}")]
    UnregisteredType(&'static str),

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Type alias for Results using WireError
pub type Result<T> = std::result::Result<T, WireError>;

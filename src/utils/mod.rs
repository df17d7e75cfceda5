//! # Utility Modules
//!
//! Supporting utilities for logging, metrics, and timing.
//!
//! ## Components
//! - **Logging**: Structured logging configuration
//! - **Metrics**: Thread-safe observability counters
//! - **Timeout**: Canonical timing constants for retransmission and ack coalescing

pub mod logging;
pub mod metrics;
pub mod timeout;

// Re-export public types for advanced users
pub use metrics::{global_metrics, WireMetrics};

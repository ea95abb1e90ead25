//! Observability for RentHub.
//!
//! This crate provides:
//! - `init_logging` - installs the process-wide `tracing` subscriber
//! - `RatingMetrics` - monitoring counters for rating synchronization

mod logging;
mod metrics;

pub use logging::*;
pub use metrics::*;

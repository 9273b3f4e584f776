//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → structured tracing events (message id, replica id, outcome)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - There is no caller waiting on a response; failures surface only as
//!   logs, queue depth growth, and dead-letter accumulation
//! - Message ids flow through every log line of a dispatch

pub mod metrics;

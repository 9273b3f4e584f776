//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! central queue → engine.rs (one logical consumer, prefetch-bounded)
//!     → routing key extracted (missing → dead-letter)
//!     → strategy picks replica (reads registry snapshot)
//!     → publish to replica ingest queue, confirm awaited
//!     → ack original, or requeue / dead-letter per outcome.rs
//! ```
//!
//! # Design Decisions
//! - Ack strictly after the downstream publish confirm; a partial failure
//!   never silently drops a message
//! - Retry bound is the transport-maintained delivery count, so it
//!   survives the nack/redeliver round-trip
//! - Strategy errors degrade to a requeue decision; connection-level
//!   consume errors back off and retry, only structural ones stop the loop

pub mod engine;
pub mod outcome;

pub use engine::DispatchEngine;
pub use outcome::{DispatchError, DispatchOutcome};

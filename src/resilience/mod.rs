//! Resilience utilities.
//!
//! # Design Decisions
//! - Jittered exponential backoff prevents thundering herd on reconnect
//! - The retry bound itself lives with the dispatch engine; this module
//!   only shapes the delays

pub mod backoff;

//! Dispatch outcomes and errors.

use thiserror::Error;

use crate::transport::TransportError;

/// The result of processing one delivery. Drives acknowledgment behavior;
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Published downstream, confirm received, original acknowledged.
    Delivered,
    /// Transient failure; the message was requeued (or dead-lettered if
    /// the retry bound was exhausted).
    RetryableFailure,
    /// Structural failure (missing routing key); dead-lettered, never
    /// retried.
    FatalFailure,
}

impl DispatchOutcome {
    /// Label for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Delivered => "delivered",
            DispatchOutcome::RetryableFailure => "retryable_failure",
            DispatchOutcome::FatalFailure => "fatal_failure",
        }
    }
}

/// Errors that stop the dispatch loop.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The transport failed at connection level and did not recover.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

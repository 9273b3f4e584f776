//! Broker transport abstraction.
//!
//! # Data Flow
//! ```text
//! producers → central queue ─ receive ─→ dispatch engine
//!                                           │ publish (confirm awaited)
//!                                           ▼
//!                exchange ── binding key ──→ replica ingest queue
//!
//! ack / nack-with-requeue flow back to the consumed queue
//! ```
//!
//! # Design Decisions
//! - The broker is an external collaborator; the engine only depends on
//!   this trait (durable queues, exchange routing, confirms, ack/nack)
//! - `publish` returns only after the broker confirms the message was
//!   accepted; there is no fire-and-forget path
//! - The transport maintains the per-delivery redelivery count across
//!   nack-requeues, so the retry bound survives the round-trip
//! - `memory.rs` implements the trait in-process for tests and local runs

pub mod link;
pub mod memory;
pub mod message;

use async_trait::async_trait;
use thiserror::Error;

pub use link::BrokerLink;
pub use memory::MemoryTransport;
pub use message::TelemetryMessage;

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The broker connection is closed.
    #[error("transport connection closed")]
    Closed,

    /// The named queue does not exist.
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    /// The named exchange does not exist.
    #[error("exchange not found: {0}")]
    ExchangeNotFound(String),

    /// The broker refused or failed the publish.
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// The publish confirm did not arrive in time.
    #[error("publish confirm timed out")]
    ConfirmTimeout,
}

impl TransportError {
    /// Connection-level failures are worth a reconnect-and-retry; the rest
    /// are per-message outcomes.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, TransportError::Closed | TransportError::ConfirmTimeout)
    }
}

/// Exchange routing modes supported by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Deliver to queues whose binding key equals the routing key.
    Direct,
    /// Deliver to every bound queue, ignoring the routing key.
    Fanout,
}

impl ExchangeKind {
    /// Parse a configured exchange type. Validation rejects other values
    /// before this is reached.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "direct" => Some(ExchangeKind::Direct),
            "fanout" => Some(ExchangeKind::Fanout),
            _ => None,
        }
    }
}

/// A message delivered from a queue, awaiting ack or requeue.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Queue the message was consumed from.
    pub queue: String,
    /// The message itself.
    pub message: TelemetryMessage,
    /// Number of times this message was delivered before (0 on first
    /// delivery); incremented by the transport on each nack-requeue.
    pub delivery_count: u32,
}

/// An external broker offering durable queues, exchange routing, publish
/// confirms, and ack/nack-with-requeue semantics.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Declare a durable queue; idempotent.
    async fn declare_queue(&self, queue: &str) -> Result<(), TransportError>;

    /// Declare an exchange; idempotent.
    async fn declare_exchange(&self, exchange: &str, kind: ExchangeKind)
        -> Result<(), TransportError>;

    /// Bind a queue to an exchange under a binding key.
    async fn bind_queue(
        &self,
        exchange: &str,
        binding_key: &str,
        queue: &str,
    ) -> Result<(), TransportError>;

    /// Publish through an exchange and wait for the broker's confirm.
    /// An empty exchange name addresses the queue named by the routing key
    /// directly.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &TelemetryMessage,
    ) -> Result<(), TransportError>;

    /// Wait for the next delivery on a queue. `None` means the transport
    /// was closed and no further deliveries will arrive.
    async fn receive(&self, queue: &str) -> Result<Option<Delivery>, TransportError>;

    /// Acknowledge a delivery, removing it from its queue.
    async fn ack(&self, delivery: &Delivery) -> Result<(), TransportError>;

    /// Negatively acknowledge and requeue; the redelivered message carries
    /// an incremented delivery count.
    async fn nack_requeue(&self, delivery: &Delivery) -> Result<(), TransportError>;

    /// Number of messages currently waiting in a queue.
    async fn queue_depth(&self, queue: &str) -> Result<u64, TransportError>;
}

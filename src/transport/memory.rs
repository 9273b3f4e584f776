//! In-memory broker.
//!
//! # Responsibilities
//! - Implement the Transport trait in-process (tests, local runs)
//! - Model durable queues, direct/fanout exchanges, confirms, requeue
//! - Inject publish failures on demand for failure testing
//!
//! Depth accounting is explicit (an atomic per queue) because the consumer
//! side of a tokio mpsc channel does not expose its backlog.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};

use super::{Delivery, ExchangeKind, TelemetryMessage, Transport, TransportError};

struct Queue {
    tx: mpsc::UnboundedSender<Delivery>,
    rx: Mutex<mpsc::UnboundedReceiver<Delivery>>,
    depth: AtomicU64,
}

impl Queue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            depth: AtomicU64::new(0),
        }
    }
}

struct Exchange {
    kind: ExchangeKind,
    /// (binding key, queue name) pairs.
    bindings: Mutex<Vec<(String, String)>>,
}

/// In-process broker with AMQP-shaped semantics.
pub struct MemoryTransport {
    queues: DashMap<String, Arc<Queue>>,
    exchanges: DashMap<String, Arc<Exchange>>,
    closed: AtomicBool,
    /// Number of upcoming publishes to fail (failure injection).
    publish_failures: AtomicU32,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
            exchanges: DashMap::new(),
            closed: AtomicBool::new(false),
            publish_failures: AtomicU32::new(0),
        }
    }

    /// Fail the next `n` publishes with a confirm timeout.
    pub fn fail_next_publishes(&self, n: u32) {
        self.publish_failures.store(n, Ordering::SeqCst);
    }

    /// Close the transport: receives drain to `None`, publishes fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Wake blocked receivers by dropping every sender's channel peer:
        // senders stay alive inside Queue, so push a sentinel instead.
        for entry in self.queues.iter() {
            let _ = entry.value().tx.send(Delivery {
                queue: String::new(),
                message: TelemetryMessage::new("", ""),
                delivery_count: u32::MAX,
            });
        }
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    fn queue(&self, name: &str) -> Result<Arc<Queue>, TransportError> {
        self.queues
            .get(name)
            .map(|q| q.value().clone())
            .ok_or_else(|| TransportError::QueueNotFound(name.to_string()))
    }

    fn enqueue(&self, queue_name: &str, delivery: Delivery) -> Result<(), TransportError> {
        let queue = self.queue(queue_name)?;
        queue.depth.fetch_add(1, Ordering::SeqCst);
        queue
            .tx
            .send(delivery)
            .map_err(|_| TransportError::Closed)
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn declare_queue(&self, queue: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.queues
            .entry(queue.to_string())
            .or_insert_with(|| Arc::new(Queue::new()));
        Ok(())
    }

    async fn declare_exchange(
        &self,
        exchange: &str,
        kind: ExchangeKind,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.exchanges
            .entry(exchange.to_string())
            .or_insert_with(|| {
                Arc::new(Exchange {
                    kind,
                    bindings: Mutex::new(Vec::new()),
                })
            });
        Ok(())
    }

    async fn bind_queue(
        &self,
        exchange: &str,
        binding_key: &str,
        queue: &str,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.queue(queue)?;
        let exchange = self
            .exchanges
            .get(exchange)
            .map(|e| e.value().clone())
            .ok_or_else(|| TransportError::ExchangeNotFound(exchange.to_string()))?;

        let mut bindings = exchange.bindings.lock().await;
        let binding = (binding_key.to_string(), queue.to_string());
        if !bindings.contains(&binding) {
            bindings.push(binding);
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &TelemetryMessage,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;

        let remaining = self
            .publish_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if remaining {
            return Err(TransportError::ConfirmTimeout);
        }

        // Default exchange: the routing key names the queue directly.
        if exchange.is_empty() {
            return self.enqueue(
                routing_key,
                Delivery {
                    queue: routing_key.to_string(),
                    message: message.clone(),
                    delivery_count: 0,
                },
            );
        }

        let exchange = self
            .exchanges
            .get(exchange)
            .map(|e| e.value().clone())
            .ok_or_else(|| TransportError::ExchangeNotFound(exchange.to_string()))?;

        let targets: Vec<String> = {
            let bindings = exchange.bindings.lock().await;
            match exchange.kind {
                ExchangeKind::Direct => bindings
                    .iter()
                    .filter(|(key, _)| key == routing_key)
                    .map(|(_, queue)| queue.clone())
                    .collect(),
                ExchangeKind::Fanout => {
                    bindings.iter().map(|(_, queue)| queue.clone()).collect()
                }
            }
        };

        if targets.is_empty() {
            return Err(TransportError::PublishFailed(format!(
                "no queue bound for routing key '{}'",
                routing_key
            )));
        }

        for target in targets {
            self.enqueue(
                &target,
                Delivery {
                    queue: target.clone(),
                    message: message.clone(),
                    delivery_count: 0,
                },
            )?;
        }
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<Option<Delivery>, TransportError> {
        let queue = self.queue(queue)?;
        let mut rx = queue.rx.lock().await;
        match rx.recv().await {
            Some(delivery) => {
                if delivery.delivery_count == u32::MAX {
                    // close() sentinel
                    return Ok(None);
                }
                queue.depth.fetch_sub(1, Ordering::SeqCst);
                Ok(Some(delivery))
            }
            None => Ok(None),
        }
    }

    async fn ack(&self, _delivery: &Delivery) -> Result<(), TransportError> {
        // Delivery was already removed from the channel on receive; ack is
        // the point of no return, nothing to do in-process.
        Ok(())
    }

    async fn nack_requeue(&self, delivery: &Delivery) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut redelivery = delivery.clone();
        redelivery.delivery_count = delivery.delivery_count + 1;
        self.enqueue(&delivery.queue, redelivery)
    }

    async fn queue_depth(&self, queue: &str) -> Result<u64, TransportError> {
        Ok(self.queue(queue)?.depth.load(Ordering::SeqCst))
    }
}

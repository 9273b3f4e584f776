//! The dispatch loop.
//!
//! Consumes the central queue and republishes each message to the replica
//! the active strategy selects.
//!
//! ```text
//! AwaitingMessage → Processing → (Acking | Requeuing) → AwaitingMessage
//!                      │
//!                      └─ Stopped on cancellation or fatal transport error
//! ```
//!
//! One logical consumer loop; deliveries are processed concurrently up to
//! the prefetch limit via a semaphore. The original message is never
//! acknowledged before the downstream publish confirms, and cancellation
//! drains in-flight dispatches before the loop returns.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, Semaphore};

use crate::config::{DispatchConfig, RetryConfig};
use crate::dispatch::outcome::{DispatchError, DispatchOutcome};
use crate::observability::metrics;
use crate::registry::ReplicaRegistry;
use crate::resilience::backoff::calculate_backoff;
use crate::strategy::{SelectError, SelectionStrategy};
use crate::transport::{BrokerLink, Delivery};

/// The central-queue consumer.
///
/// Cheap to clone; all state is shared behind `Arc`.
#[derive(Clone)]
pub struct DispatchEngine {
    link: Arc<BrokerLink>,
    registry: Arc<ReplicaRegistry>,
    strategy: Arc<dyn SelectionStrategy>,
    dispatch: Arc<DispatchConfig>,
    retry: RetryConfig,
    inflight: Arc<Semaphore>,
    prefetch: usize,
}

impl DispatchEngine {
    pub fn new(
        link: Arc<BrokerLink>,
        registry: Arc<ReplicaRegistry>,
        strategy: Arc<dyn SelectionStrategy>,
        dispatch: DispatchConfig,
        retry: RetryConfig,
        prefetch: usize,
    ) -> Self {
        // Bounded above so the drain's permit count fits in u32 and the
        // semaphore's permit limit is never exceeded.
        let prefetch = prefetch.clamp(1, u32::MAX as usize);
        Self {
            link,
            registry,
            strategy,
            dispatch: Arc::new(dispatch),
            retry,
            inflight: Arc::new(Semaphore::new(prefetch)),
            prefetch,
        }
    }

    /// Run the consumer loop until the shutdown signal fires or the
    /// transport closes. In-flight dispatches are drained before
    /// returning: each completes its confirm/fail round-trip and its
    /// ack/requeue decision.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<(), DispatchError> {
        tracing::info!(
            queue = %self.dispatch.central_queue,
            strategy = self.strategy.name(),
            prefetch = self.prefetch,
            "Dispatch loop starting"
        );

        let mut consume_failures: u32 = 0;
        let result = loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Dispatch loop received shutdown signal");
                    break Ok(());
                }
                received = self.link.receive(&self.dispatch.central_queue) => {
                    match received {
                        Ok(Some(delivery)) => {
                            consume_failures = 0;
                            let permit = self
                                .inflight
                                .clone()
                                .acquire_owned()
                                .await
                                .expect("inflight semaphore closed");
                            let engine = self.clone();
                            tokio::spawn(async move {
                                engine.process(delivery).await;
                                drop(permit);
                            });
                        }
                        Ok(None) => {
                            tracing::warn!("Transport closed, stopping dispatch loop");
                            break Ok(());
                        }
                        Err(e) if e.is_connection_error() => {
                            consume_failures += 1;
                            let backoff = calculate_backoff(
                                consume_failures,
                                self.retry.base_delay_ms,
                                self.retry.max_delay_ms,
                            );
                            tracing::warn!(
                                error = %e,
                                attempt = consume_failures,
                                delay = ?backoff,
                                "Consume failed, backing off before retry"
                            );
                            tokio::time::sleep(backoff).await;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Fatal consume error");
                            break Err(DispatchError::Transport(e));
                        }
                    }
                }
            }
        };

        // Drain: every in-flight dispatch holds a permit until its
        // ack/requeue completed.
        let _drained = self
            .inflight
            .acquire_many(self.prefetch as u32)
            .await
            .expect("inflight semaphore closed");

        tracing::info!("Dispatch loop stopped");
        result
    }

    /// Process one delivery end to end.
    pub async fn process(&self, delivery: Delivery) -> DispatchOutcome {
        let started = Instant::now();
        metrics::inflight_delta(1);
        let outcome = self.process_inner(&delivery).await;
        metrics::inflight_delta(-1);
        metrics::record_dispatch(outcome.as_str(), started);
        outcome
    }

    async fn process_inner(&self, delivery: &Delivery) -> DispatchOutcome {
        let message = &delivery.message;

        let Some(routing_key) = message.routing_key() else {
            tracing::warn!(
                message_id = %message.id,
                "Message carries no routing key, dead-lettering"
            );
            return self.dead_letter(delivery).await;
        };
        let routing_key = routing_key.to_string();

        let snapshot = self.registry.snapshot();
        let replica = match self.strategy.select(&snapshot, &routing_key) {
            Ok(replica) => replica,
            Err(SelectError::NoAvailableReplica) => {
                tracing::warn!(
                    message_id = %message.id,
                    routing_key = %routing_key,
                    "No replica available, requeueing with backoff"
                );
                let backoff = calculate_backoff(
                    delivery.delivery_count + 1,
                    self.retry.base_delay_ms,
                    self.retry.max_delay_ms,
                );
                tokio::time::sleep(backoff).await;
                return self.requeue_or_dead_letter(delivery).await;
            }
        };

        tracing::debug!(
            message_id = %message.id,
            routing_key = %routing_key,
            replica_id = %replica.id,
            queue = %replica.queue_name,
            "Dispatching message"
        );

        match self
            .link
            .publish_confirmed(&self.dispatch.exchange_name, &replica.queue_name, message)
            .await
        {
            Ok(()) => {
                // Confirm received; only now is the original removed from
                // the central queue.
                if let Err(e) = self.link.ack(delivery).await {
                    tracing::error!(
                        message_id = %message.id,
                        error = %e,
                        "Ack failed after confirmed publish; message may be redelivered"
                    );
                    return DispatchOutcome::RetryableFailure;
                }
                DispatchOutcome::Delivered
            }
            Err(e) => {
                tracing::warn!(
                    message_id = %message.id,
                    replica_id = %replica.id,
                    error = %e,
                    "Publish not confirmed"
                );
                self.requeue_or_dead_letter(delivery).await
            }
        }
    }

    /// Requeue a transiently-failed delivery, or dead-letter it once the
    /// retry bound is exhausted.
    async fn requeue_or_dead_letter(&self, delivery: &Delivery) -> DispatchOutcome {
        let attempts_made = delivery.delivery_count + 1;
        if attempts_made >= self.retry.max_attempts {
            tracing::warn!(
                message_id = %delivery.message.id,
                attempts = attempts_made,
                max_attempts = self.retry.max_attempts,
                "Retry bound exhausted, dead-lettering"
            );
            return self.dead_letter(delivery).await;
        }

        match self.link.nack_requeue(delivery).await {
            Ok(()) => DispatchOutcome::RetryableFailure,
            Err(e) => {
                tracing::error!(
                    message_id = %delivery.message.id,
                    error = %e,
                    "Requeue failed; message remains unacknowledged"
                );
                DispatchOutcome::RetryableFailure
            }
        }
    }

    /// Route a message to the dead-letter queue and acknowledge the
    /// original. If the dead-letter publish itself fails, the message is
    /// requeued instead of being dropped.
    async fn dead_letter(&self, delivery: &Delivery) -> DispatchOutcome {
        match self
            .link
            .dead_letter(&self.dispatch.dead_letter_queue, &delivery.message)
            .await
        {
            Ok(()) => {
                metrics::record_dead_letter();
                if let Err(e) = self.link.ack(delivery).await {
                    tracing::error!(
                        message_id = %delivery.message.id,
                        error = %e,
                        "Ack failed after dead-letter publish"
                    );
                }
                DispatchOutcome::FatalFailure
            }
            Err(e) => {
                tracing::error!(
                    message_id = %delivery.message.id,
                    error = %e,
                    "Dead-letter publish failed, requeueing instead"
                );
                match self.link.nack_requeue(delivery).await {
                    Ok(()) => DispatchOutcome::RetryableFailure,
                    Err(e) => {
                        tracing::error!(
                            message_id = %delivery.message.id,
                            error = %e,
                            "Requeue after failed dead-letter also failed"
                        );
                        DispatchOutcome::RetryableFailure
                    }
                }
            }
        }
    }
}

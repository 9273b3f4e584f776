//! Broker link with connection-level resilience.
//!
//! # Responsibilities
//! - Own the transport handle used by the dispatch engine
//! - Retry connection-level publish failures with bounded backoff
//! - Declare the dispatch topology (exchange, queues, bindings)
//!
//! Per-message failures are not retried here; the engine classifies them
//! into dispatch outcomes and drives ack/requeue on the central queue.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{BrokerConfig, DispatchConfig, RetryConfig};
use crate::registry::ReplicaSet;
use crate::resilience::backoff::calculate_backoff;
use crate::transport::{
    Delivery, ExchangeKind, TelemetryMessage, Transport, TransportError,
};

/// The engine's handle to the broker.
pub struct BrokerLink {
    transport: Arc<dyn Transport>,
    confirm_timeout: Duration,
    retry: RetryConfig,
}

impl BrokerLink {
    pub fn new(transport: Arc<dyn Transport>, broker: &BrokerConfig, retry: RetryConfig) -> Self {
        Self {
            transport,
            confirm_timeout: Duration::from_millis(broker.confirm_timeout_ms),
            retry,
        }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Declare the exchange, central queue, dead-letter queue, and one
    /// ingest queue per replica, bound under its queue name. Idempotent;
    /// called at startup and after every registry update.
    pub async fn declare_topology(
        &self,
        dispatch: &DispatchConfig,
        set: &ReplicaSet,
    ) -> Result<(), TransportError> {
        let kind = ExchangeKind::parse(&dispatch.exchange_type)
            .unwrap_or(ExchangeKind::Direct);

        self.transport.declare_queue(&dispatch.central_queue).await?;
        self.transport
            .declare_queue(&dispatch.dead_letter_queue)
            .await?;
        self.transport
            .declare_exchange(&dispatch.exchange_name, kind)
            .await?;

        for replica in set.replicas() {
            self.transport.declare_queue(&replica.queue_name).await?;
            self.transport
                .bind_queue(&dispatch.exchange_name, &replica.queue_name, &replica.queue_name)
                .await?;
        }

        tracing::debug!(
            exchange = %dispatch.exchange_name,
            replicas = set.len(),
            "Dispatch topology declared"
        );
        Ok(())
    }

    /// Publish and wait for the confirm, retrying connection-level
    /// failures with exponential backoff. The confirm wait per attempt is
    /// bounded by `broker.confirm_timeout_ms`; a hung confirm counts as a
    /// timeout. Per-message failures surface immediately.
    pub async fn publish_confirmed(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &TelemetryMessage,
    ) -> Result<(), TransportError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let published = match tokio::time::timeout(
                self.confirm_timeout,
                self.transport.publish(exchange, routing_key, message),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::ConfirmTimeout),
            };
            match published {
                Ok(()) => return Ok(()),
                Err(e) if e.is_connection_error() && attempt < self.retry.max_attempts => {
                    let backoff = calculate_backoff(
                        attempt,
                        self.retry.base_delay_ms,
                        self.retry.max_delay_ms,
                    );
                    tracing::warn!(
                        routing_key = %routing_key,
                        attempt,
                        delay = ?backoff,
                        error = %e,
                        "Publish failed at connection level, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Publish directly to the dead-letter queue via the default exchange.
    pub async fn dead_letter(
        &self,
        dead_letter_queue: &str,
        message: &TelemetryMessage,
    ) -> Result<(), TransportError> {
        self.publish_confirmed("", dead_letter_queue, message).await
    }

    pub async fn receive(&self, queue: &str) -> Result<Option<Delivery>, TransportError> {
        self.transport.receive(queue).await
    }

    pub async fn ack(&self, delivery: &Delivery) -> Result<(), TransportError> {
        self.transport.ack(delivery).await
    }

    pub async fn nack_requeue(&self, delivery: &Delivery) -> Result<(), TransportError> {
        self.transport.nack_requeue(delivery).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use async_trait::async_trait;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        }
    }

    #[tokio::test]
    async fn test_publish_retries_connection_failures() {
        let transport = Arc::new(MemoryTransport::new());
        transport.declare_queue("ingress").await.unwrap();
        transport.fail_next_publishes(2);

        let link = BrokerLink::new(transport.clone(), &BrokerConfig::default(), fast_retry());

        let msg = TelemetryMessage::new("device-1", "payload");
        link.publish_confirmed("", "ingress", &msg).await.unwrap();
        assert_eq!(transport.queue_depth("ingress").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_publish_gives_up_after_max_attempts() {
        let transport = Arc::new(MemoryTransport::new());
        transport.declare_queue("ingress").await.unwrap();
        transport.fail_next_publishes(10);

        let link = BrokerLink::new(transport, &BrokerConfig::default(), fast_retry());

        let msg = TelemetryMessage::new("device-1", "payload");
        let result = link.publish_confirmed("", "ingress", &msg).await;
        assert!(matches!(result, Err(TransportError::ConfirmTimeout)));
    }

    /// A broker whose publish confirm never arrives.
    struct StallingTransport;

    #[async_trait]
    impl Transport for StallingTransport {
        async fn declare_queue(&self, _queue: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn declare_exchange(
            &self,
            _exchange: &str,
            _kind: ExchangeKind,
        ) -> Result<(), TransportError> {
            Ok(())
        }

        async fn bind_queue(
            &self,
            _exchange: &str,
            _binding_key: &str,
            _queue: &str,
        ) -> Result<(), TransportError> {
            Ok(())
        }

        async fn publish(
            &self,
            _exchange: &str,
            _routing_key: &str,
            _message: &TelemetryMessage,
        ) -> Result<(), TransportError> {
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn receive(&self, _queue: &str) -> Result<Option<Delivery>, TransportError> {
            Ok(None)
        }

        async fn ack(&self, _delivery: &Delivery) -> Result<(), TransportError> {
            Ok(())
        }

        async fn nack_requeue(&self, _delivery: &Delivery) -> Result<(), TransportError> {
            Ok(())
        }

        async fn queue_depth(&self, _queue: &str) -> Result<u64, TransportError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_hung_confirm_is_bounded_by_timeout() {
        let broker = BrokerConfig {
            confirm_timeout_ms: 20,
            ..BrokerConfig::default()
        };
        let link = BrokerLink::new(Arc::new(StallingTransport), &broker, fast_retry());

        let msg = TelemetryMessage::new("device-1", "payload");
        let result = link.publish_confirmed("", "ingress", &msg).await;
        assert!(matches!(result, Err(TransportError::ConfirmTimeout)));
    }
}

//! Shared utilities for integration testing.

use std::sync::Arc;

use telemetry_dispatcher::config::{DispatcherConfig, ReplicaConfig};
use telemetry_dispatcher::dispatch::DispatchEngine;
use telemetry_dispatcher::registry::ReplicaRegistry;
use telemetry_dispatcher::strategy::build_strategy;
use telemetry_dispatcher::transport::{
    BrokerLink, MemoryTransport, TelemetryMessage, Transport,
};

/// Build a config with the given (id, weight) replicas and fast retries.
pub fn test_config(replicas: &[(&str, u32)]) -> DispatcherConfig {
    let mut config = DispatcherConfig::default();
    config.replicas = replicas
        .iter()
        .map(|(id, weight)| ReplicaConfig {
            id: id.to_string(),
            weight: *weight,
        })
        .collect();
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config
}

/// Everything a dispatch test needs, wired over an in-memory broker.
pub struct TestHarness {
    pub transport: Arc<MemoryTransport>,
    pub registry: Arc<ReplicaRegistry>,
    pub engine: DispatchEngine,
    pub config: DispatcherConfig,
}

/// Build registry, strategy, link, and engine from a config, and declare
/// the dispatch topology on a fresh in-memory broker.
pub async fn harness(config: DispatcherConfig) -> TestHarness {
    let transport = Arc::new(MemoryTransport::new());
    let registry =
        Arc::new(ReplicaRegistry::new(&config.replicas, &config.dispatch).unwrap());
    let strategy = Arc::from(build_strategy(
        config.dispatch.strategy,
        &config.consistent_hash,
    ));
    let link = Arc::new(BrokerLink::new(
        transport.clone() as Arc<dyn Transport>,
        &config.broker,
        config.retry.clone(),
    ));
    link.declare_topology(&config.dispatch, &registry.snapshot())
        .await
        .unwrap();

    let engine = DispatchEngine::new(
        link,
        registry.clone(),
        strategy,
        config.dispatch.clone(),
        config.retry.clone(),
        config.broker.prefetch,
    );

    TestHarness {
        transport,
        registry,
        engine,
        config,
    }
}

/// Publish a telemetry message straight onto the central queue.
pub async fn publish_telemetry(
    transport: &MemoryTransport,
    central_queue: &str,
    device_id: &str,
) -> TelemetryMessage {
    let message = TelemetryMessage::new(device_id, format!("reading from {}", device_id));
    transport
        .publish("", central_queue, &message)
        .await
        .unwrap();
    message
}

/// Drain every message currently waiting in a queue.
#[allow(dead_code)]
pub async fn drain_queue(transport: &MemoryTransport, queue: &str) -> Vec<TelemetryMessage> {
    let mut drained = Vec::new();
    while transport.queue_depth(queue).await.unwrap() > 0 {
        match transport.receive(queue).await.unwrap() {
            Some(delivery) => drained.push(delivery.message),
            None => break,
        }
    }
    drained
}

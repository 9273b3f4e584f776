//! End-to-end dispatch tests over the in-memory broker.

use std::collections::HashMap;
use std::sync::Arc;

use telemetry_dispatcher::config::StrategyKind;
use telemetry_dispatcher::dispatch::DispatchOutcome;
use telemetry_dispatcher::strategy::build_strategy;
use telemetry_dispatcher::transport::Transport;

mod common;

use common::{harness, publish_telemetry, test_config};

#[tokio::test]
async fn test_consistent_hash_preserves_device_affinity() {
    let mut config = test_config(&[("a", 1), ("b", 1), ("c", 1)]);
    config.dispatch.strategy = StrategyKind::ConsistentHashing;
    let h = harness(config).await;
    let central = h.config.dispatch.central_queue.clone();

    // Three messages from each of ten devices.
    for _round in 0..3 {
        for device in 0..10 {
            publish_telemetry(&h.transport, &central, &format!("device-{}", device)).await;
        }
    }

    while h.transport.queue_depth(&central).await.unwrap() > 0 {
        let delivery = h.transport.receive(&central).await.unwrap().unwrap();
        assert_eq!(h.engine.process(delivery).await, DispatchOutcome::Delivered);
    }

    // Every device's messages landed in exactly one ingest queue.
    let mut device_queue: HashMap<String, String> = HashMap::new();
    let mut total = 0;
    for replica in ["a", "b", "c"] {
        let queue = h.config.dispatch.ingest_queue_for(replica);
        for message in common::drain_queue(&h.transport, &queue).await {
            total += 1;
            let previous = device_queue
                .insert(message.device_id.clone(), queue.clone());
            if let Some(previous) = previous {
                assert_eq!(previous, queue, "device {} split across queues", message.device_id);
            }
        }
    }
    assert_eq!(total, 30);
}

#[tokio::test]
async fn test_weighted_round_robin_matches_weights() {
    let mut config = test_config(&[("a", 2), ("b", 1)]);
    config.dispatch.strategy = StrategyKind::WeightedRoundRobin;
    let h = harness(config).await;
    let central = h.config.dispatch.central_queue.clone();

    for i in 0..12 {
        publish_telemetry(&h.transport, &central, &format!("device-{}", i)).await;
    }

    while h.transport.queue_depth(&central).await.unwrap() > 0 {
        let delivery = h.transport.receive(&central).await.unwrap().unwrap();
        assert_eq!(h.engine.process(delivery).await, DispatchOutcome::Delivered);
    }

    let queue_a = h.config.dispatch.ingest_queue_for("a");
    let queue_b = h.config.dispatch.ingest_queue_for("b");
    assert_eq!(h.transport.queue_depth(&queue_a).await.unwrap(), 8);
    assert_eq!(h.transport.queue_depth(&queue_b).await.unwrap(), 4);
}

#[tokio::test]
async fn test_load_based_follows_reported_load() {
    let mut config = test_config(&[("a", 1), ("b", 1), ("c", 1)]);
    config.dispatch.strategy = StrategyKind::LoadBased;
    let h = harness(config).await;
    let central = h.config.dispatch.central_queue.clone();

    h.registry.report_load("a", 5.0);
    h.registry.report_load("b", 1.0);
    h.registry.report_load("c", 3.0);

    publish_telemetry(&h.transport, &central, "device-1").await;
    let delivery = h.transport.receive(&central).await.unwrap().unwrap();
    h.engine.process(delivery).await;

    let queue_b = h.config.dispatch.ingest_queue_for("b");
    assert_eq!(h.transport.queue_depth(&queue_b).await.unwrap(), 1);

    // B becomes the busiest; the next message goes to C.
    h.registry.report_load("b", 10.0);

    publish_telemetry(&h.transport, &central, "device-2").await;
    let delivery = h.transport.receive(&central).await.unwrap().unwrap();
    h.engine.process(delivery).await;

    let queue_c = h.config.dispatch.ingest_queue_for("c");
    assert_eq!(h.transport.queue_depth(&queue_c).await.unwrap(), 1);
}

#[tokio::test]
async fn test_missing_routing_key_is_dead_lettered() {
    let config = test_config(&[("a", 1)]);
    let h = harness(config).await;
    let central = h.config.dispatch.central_queue.clone();

    publish_telemetry(&h.transport, &central, "").await;
    let delivery = h.transport.receive(&central).await.unwrap().unwrap();

    assert_eq!(
        h.engine.process(delivery).await,
        DispatchOutcome::FatalFailure
    );

    let dlq = &h.config.dispatch.dead_letter_queue;
    assert_eq!(h.transport.queue_depth(dlq).await.unwrap(), 1);
    assert_eq!(h.transport.queue_depth(&central).await.unwrap(), 0);
    assert_eq!(
        h.transport
            .queue_depth(&h.config.dispatch.ingest_queue_for("a"))
            .await
            .unwrap(),
        0
    );
}

#[test]
fn test_registry_updates_never_expose_empty_set_to_strategies() {
    let config = test_config(&[("a", 1), ("b", 1)]);
    let registry = Arc::new(
        telemetry_dispatcher::registry::ReplicaRegistry::new(
            &config.replicas,
            &config.dispatch,
        )
        .unwrap(),
    );
    let strategy: Arc<dyn telemetry_dispatcher::strategy::SelectionStrategy> = Arc::from(
        build_strategy(StrategyKind::ConsistentHashing, &config.consistent_hash),
    );

    let mut readers = Vec::new();
    for worker in 0..4 {
        let registry = registry.clone();
        let strategy = strategy.clone();
        readers.push(std::thread::spawn(move || {
            for i in 0..2000 {
                let snapshot = registry.snapshot();
                assert!(!snapshot.is_empty(), "observed empty replica set");
                let key = format!("device-{}-{}", worker, i);
                strategy
                    .select(&snapshot, &key)
                    .expect("selection failed against non-empty set");
            }
        }));
    }

    let writer = {
        let registry = registry.clone();
        let first = common::test_config(&[("a", 1), ("b", 1)]);
        let second = common::test_config(&[("a", 1), ("c", 2)]);
        std::thread::spawn(move || {
            for i in 0..500 {
                let next = if i % 2 == 0 { &second } else { &first };
                registry.update(&next.replicas, &next.dispatch).unwrap();
            }
        })
    };

    for reader in readers {
        reader.join().unwrap();
    }
    writer.join().unwrap();
}

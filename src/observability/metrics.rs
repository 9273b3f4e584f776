//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dispatcher_messages_total` (counter): dispatches by outcome
//! - `dispatcher_dispatch_duration_seconds` (histogram): per-message latency
//! - `dispatcher_inflight` (gauge): dispatches currently processing
//! - `dispatcher_replica_load` (gauge): last reported load per replica
//! - `dispatcher_dead_lettered_total` (counter): terminally failed messages
//!
//! # Design Decisions
//! - Low-overhead updates (atomic operations in the recorder)
//! - Prometheus exposition via the exporter's own HTTP listener

use std::net::SocketAddr;
use std::time::Instant;

/// Initialize the Prometheus exporter on the given address.
pub fn init_metrics(addr: SocketAddr) {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr);

    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one completed dispatch.
pub fn record_dispatch(outcome: &'static str, started: Instant) {
    metrics::counter!("dispatcher_messages_total", "outcome" => outcome).increment(1);
    metrics::histogram!("dispatcher_dispatch_duration_seconds")
        .record(started.elapsed().as_secs_f64());
}

/// Adjust the in-flight dispatch gauge.
pub fn inflight_delta(delta: i64) {
    if delta >= 0 {
        metrics::gauge!("dispatcher_inflight").increment(delta as f64);
    } else {
        metrics::gauge!("dispatcher_inflight").decrement((-delta) as f64);
    }
}

/// Record the latest load report for a replica.
pub fn record_replica_load(replica_id: &str, load: f64) {
    metrics::gauge!("dispatcher_replica_load", "replica" => replica_id.to_string()).set(load);
}

/// Count a dead-lettered message.
pub fn record_dead_letter() {
    metrics::counter!("dispatcher_dead_lettered_total").increment(1);
}

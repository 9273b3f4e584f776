//! Periodic load reporting.
//!
//! # Responsibilities
//! - Periodically poll each replica's ingest-queue depth
//! - Feed the depth into the registry as the replica's load metric
//!
//! Load is pulled from the transport on a fixed interval rather than pushed
//! by replicas, so the load-based strategy sees values stale by at most one
//! interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::config::schema::LoadReportConfig;
use crate::observability::metrics;
use crate::registry::ReplicaRegistry;
use crate::transport::Transport;

pub struct LoadMonitor {
    registry: Arc<ReplicaRegistry>,
    transport: Arc<dyn Transport>,
    config: LoadReportConfig,
}

impl LoadMonitor {
    pub fn new(
        registry: Arc<ReplicaRegistry>,
        transport: Arc<dyn Transport>,
        config: LoadReportConfig,
    ) -> Self {
        Self {
            registry,
            transport,
            config,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Load reporting disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            "Load monitor starting"
        );

        let interval = Duration::from_secs(self.config.interval_secs);
        let mut ticker = time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Load monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn poll_all(&self) {
        let snapshot = self.registry.snapshot();

        for replica in snapshot.replicas() {
            match self.transport.queue_depth(&replica.queue_name).await {
                Ok(depth) => {
                    let load = depth as f64;
                    self.registry.report_load(&replica.id, load);
                    metrics::record_replica_load(&replica.id, load);
                    tracing::trace!(
                        replica_id = %replica.id,
                        queue = %replica.queue_name,
                        depth,
                        "Load report"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        replica_id = %replica.id,
                        queue = %replica.queue_name,
                        error = %e,
                        "Failed to poll queue depth"
                    );
                }
            }
        }
    }
}

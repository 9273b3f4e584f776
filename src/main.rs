//! Telemetry dispatcher daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────┐
//!                    │              TELEMETRY DISPATCHER                 │
//!                    │                                                   │
//!  producers ────────┼─▶ central queue ──▶ ┌────────────────┐            │
//!                    │                     │ dispatch engine │            │
//!                    │                     └───────┬────────┘            │
//!                    │                             │ select              │
//!                    │                     ┌───────▼────────┐            │
//!                    │                     │   strategy      │──reads──┐ │
//!                    │                     │ (hash/load/wrr) │         │ │
//!                    │                     └───────┬────────┘  ┌───────▼─┴──┐
//!                    │                             │           │  replica   │
//!                    │                      publish+confirm    │  registry  │
//!                    │                             │           └───────▲────┘
//!  replica consumers ◀──── ingest queues ◀─────────┘                   │
//!                    │                                        load monitor
//!                    │  ┌─────────────────────────────────────────────┐ │
//!                    │  │ config reload │ lifecycle │ metrics │ logs  │ │
//!                    │  └─────────────────────────────────────────────┘ │
//!                    └──────────────────────────────────────────────────┘
//! ```
//!
//! The broker is an external collaborator behind the `Transport` trait;
//! this binary wires the in-process implementation, which doubles as the
//! integration seam for a real broker client.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use telemetry_dispatcher::config::loader::load_config;
use telemetry_dispatcher::config::watcher::ConfigWatcher;
use telemetry_dispatcher::config::DispatcherConfig;
use telemetry_dispatcher::dispatch::DispatchEngine;
use telemetry_dispatcher::lifecycle::{signals, Shutdown};
use telemetry_dispatcher::observability::metrics;
use telemetry_dispatcher::registry::{LoadMonitor, ReplicaRegistry};
use telemetry_dispatcher::strategy::{build_strategy, SelectionStrategy};
use telemetry_dispatcher::transport::{BrokerLink, MemoryTransport, Transport};

#[derive(Parser, Debug)]
#[command(name = "telemetry-dispatcher", about = "Routes device telemetry to worker replicas")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(&args.config)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("telemetry_dispatcher={}", config.observability.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("telemetry-dispatcher v0.1.0 starting");
    tracing::info!(
        strategy = ?config.dispatch.strategy,
        central_queue = %config.dispatch.central_queue,
        replicas = config.replicas.len(),
        prefetch = config.broker.prefetch,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => {
                tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    "Failed to parse metrics address"
                );
            }
        }
    }

    let registry = Arc::new(ReplicaRegistry::new(&config.replicas, &config.dispatch)?);
    let strategy: Arc<dyn SelectionStrategy> =
        Arc::from(build_strategy(config.dispatch.strategy, &config.consistent_hash));

    let transport: Arc<dyn Transport> = Arc::new(MemoryTransport::new());
    let link = Arc::new(BrokerLink::new(
        transport.clone(),
        &config.broker,
        config.retry.clone(),
    ));
    link.declare_topology(&config.dispatch, &registry.snapshot())
        .await?;

    let shutdown = Shutdown::new();

    // Config hot reload: file watcher and SIGHUP both feed the same channel.
    let (reload_tx, mut reload_rx) = tokio::sync::mpsc::unbounded_channel::<DispatcherConfig>();
    let (watcher, mut watch_rx) = ConfigWatcher::new(&args.config);
    let _watcher_handle = watcher.run()?;
    {
        let reload_tx = reload_tx.clone();
        tokio::spawn(async move {
            while let Some(new_config) = watch_rx.recv().await {
                let _ = reload_tx.send(new_config);
            }
        });
    }

    // Apply replica reloads: registry update plus topology declarations for
    // new queues. Topology names stay fixed for the process lifetime.
    {
        let registry = registry.clone();
        let link = link.clone();
        let dispatch = config.dispatch.clone();
        tokio::spawn(async move {
            while let Some(new_config) = reload_rx.recv().await {
                match registry.update(&new_config.replicas, &dispatch) {
                    Ok(()) => {
                        if let Err(e) = link.declare_topology(&dispatch, &registry.snapshot()).await
                        {
                            tracing::error!(error = %e, "Failed to declare topology after reload");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Rejected replica reload");
                    }
                }
            }
        });
    }

    let monitor = LoadMonitor::new(registry.clone(), transport.clone(), config.load_report.clone());
    let monitor_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        monitor.run(monitor_shutdown).await;
    });

    let engine = DispatchEngine::new(
        link,
        registry,
        strategy,
        config.dispatch.clone(),
        config.retry.clone(),
        config.broker.prefetch,
    );

    let engine_shutdown = shutdown.subscribe();
    let engine_task = tokio::spawn(async move { engine.run(engine_shutdown).await });

    signals::handle_signals(&shutdown, Some(args.config.clone()), reload_tx).await;

    engine_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}

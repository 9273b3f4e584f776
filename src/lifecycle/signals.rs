//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//! - Trigger appropriate actions (shutdown, reload)
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers config reload, not shutdown

use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::DispatcherConfig;
use crate::lifecycle::Shutdown;

/// Wait for SIGTERM/SIGINT and trigger shutdown; on SIGHUP, reload the
/// config file and forward it on the update channel.
pub async fn handle_signals(
    shutdown: &Shutdown,
    config_path: Option<PathBuf>,
    reload_tx: mpsc::UnboundedSender<DispatcherConfig>,
) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                return;
            }
        };
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGHUP handler");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("SIGINT received, shutting down");
                    shutdown.trigger();
                    return;
                }
                _ = sigterm.recv() => {
                    tracing::info!("SIGTERM received, shutting down");
                    shutdown.trigger();
                    return;
                }
                _ = sighup.recv() => {
                    match &config_path {
                        Some(path) => {
                            tracing::info!(path = ?path, "SIGHUP received, reloading config");
                            match load_config(path) {
                                Ok(config) => {
                                    let _ = reload_tx.send(config);
                                }
                                Err(e) => {
                                    tracing::error!(
                                        "Reload failed: {}. Keeping current configuration.",
                                        e
                                    );
                                }
                            }
                        }
                        None => {
                            tracing::warn!("SIGHUP received but no config file to reload");
                        }
                    }
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (config_path, reload_tx);
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received, shutting down");
            shutdown.trigger();
        }
    }
}

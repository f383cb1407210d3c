//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//! - Trigger appropriate actions (shutdown, reload)
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGTERM/SIGINT trigger the shutdown coordinator once and stop listening
//! - SIGHUP triggers config reload, not shutdown

use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::loader::load_config;
use crate::config::schema::ServiceConfig;
use crate::lifecycle::shutdown::Shutdown;

/// Where a SIGHUP reload reads from and delivers to.
#[derive(Debug, Clone)]
pub struct ReloadSource {
    pub path: PathBuf,
    pub updates: mpsc::UnboundedSender<ServiceConfig>,
}

impl ReloadSource {
    fn reload(&self) {
        match load_config(&self.path) {
            Ok(config) => {
                tracing::info!(path = ?self.path, "Configuration reloaded on SIGHUP");
                let _ = self.updates.send(config);
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGHUP reload failed, keeping current configuration");
            }
        }
    }
}

/// Spawn the signal listener.
pub fn spawn_signal_handler(shutdown: Shutdown, reload: Option<ReloadSource>) -> JoinHandle<()> {
    tokio::spawn(listen(shutdown, reload))
}

/// Wait for a termination signal, handling reloads meanwhile, then trigger shutdown.
pub async fn listen(shutdown: Shutdown, reload: Option<ReloadSource>) {
    wait_for_termination(reload.as_ref()).await;
    shutdown.trigger();
}

#[cfg(unix)]
async fn wait_for_termination(reload: Option<&ReloadSource>) {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut term, mut hup) = match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
        (Ok(term), Ok(hup)) => (term, hup),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Failed to install unix signal handlers, falling back to Ctrl+C");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("SIGINT received");
                return;
            }
            _ = term.recv() => {
                tracing::info!("SIGTERM received");
                return;
            }
            _ = hup.recv() => match reload {
                Some(source) => source.reload(),
                None => tracing::info!("SIGHUP received without a config file, ignoring"),
            },
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination(_reload: Option<&ReloadSource>) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Ctrl+C received");
}

//! Service host.
//!
//! ```text
//!   config file ──▶ loader ──▶ ServiceInstance
//!        │                         │
//!   watcher/SIGHUP ── updates ──▶  ├─ net: resolve + bind wildcard endpoint
//!                                  ├─ http: /api votes (counted), /admin
//!                                  └─ health: reporter ──▶ health + load sinks
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;

use service_host::config::loader::load_config;
use service_host::config::watcher::ConfigWatcher;
use service_host::lifecycle::signals::{spawn_signal_handler, ReloadSource};
use service_host::lifecycle::{ServiceInstance, Shutdown};
use service_host::observability::{logging, metrics};
use service_host::ServiceConfig;

#[derive(Parser)]
#[command(name = "service-host")]
#[command(about = "Self-registering service instance with health reporting", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not watch the configuration file for changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "service-host starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    // Keeps the file watcher alive for the life of the process.
    let mut _watcher = None;
    let (reload, updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            let reload = ReloadSource {
                path: path.clone(),
                updates: watcher.updates(),
            };
            if !args.no_watch {
                _watcher = Some(watcher.run()?);
            }
            (Some(reload), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let shutdown = Shutdown::new();
    let signals = spawn_signal_handler(shutdown.clone(), reload);

    let mut instance = ServiceInstance::new(config);
    let publish_address = instance.open().await?;
    tracing::info!(
        publish_address = %publish_address,
        interval_secs = instance.report_interval().as_secs(),
        "Instance running"
    );

    instance.run(shutdown.subscribe(), updates).await;
    signals.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}

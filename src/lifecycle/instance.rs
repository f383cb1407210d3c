//! Service instance lifecycle.
//!
//! # States
//! ```text
//! Created → Starting → Running → Stopping → Stopped
//!              │                                ▲
//!              └──── configuration / bind error ┘
//! ```
//!
//! # Responsibilities
//! - open: resolve the endpoint, bind, start serving and reporting
//! - run: suspend on cancellation, applying configuration changes meanwhile
//! - close: stop the reporter and the server, release the listener
//!
//! # Design Decisions
//! - One-shot: a stopped instance is never reopened
//! - The reporter is only spawned after a successful bind
//! - close is idempotent

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::schema::ServiceConfig;
use crate::health::counter::RequestCounter;
use crate::health::policy::{RollbackPolicy, UpgradeDomainRollback};
use crate::health::reporter::{HealthReporter, ReportInterval, ReportSettings, ReportSinks};
use crate::health::sink::{HealthSink, HealthStore, LoadSink, LoadStore};
use crate::http::server::{AppState, HttpServer};
use crate::http::votes::VoteStore;
use crate::lifecycle::shutdown::{Shutdown, ShutdownSignal};
use crate::net::address::{resolve_from_config, ConfigurationError, Endpoint, InstanceIdentity, Protocol};
use crate::net::listener::{BindError, BoundListener};
use crate::net::tls::load_tls_config;
use crate::observability::metrics;

/// How long close waits for each background task before aborting it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Lifecycle state of a service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Created => "created",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Error type for opening an instance.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("bind error: {0}")]
    Bind(#[from] BindError),
    #[error("instance cannot be opened from state {0}")]
    InvalidState(LifecycleState),
}

/// Read-only view of a running instance, shared with request handlers.
#[derive(Debug, Clone)]
pub struct InstanceView {
    pub identity: InstanceIdentity,
    pub bind_address: String,
    pub publish_address: String,
    state: watch::Receiver<LifecycleState>,
    interval: watch::Receiver<ReportInterval>,
}

impl InstanceView {
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn report_interval(&self) -> ReportInterval {
        *self.interval.borrow()
    }
}

/// A self-registering service instance.
pub struct ServiceInstance {
    config: Arc<ArcSwap<ServiceConfig>>,
    identity: InstanceIdentity,
    counter: RequestCounter,
    votes: Arc<VoteStore>,
    sinks: ReportSinks,
    policy: Option<Arc<dyn RollbackPolicy>>,
    state: watch::Sender<LifecycleState>,
    interval: watch::Sender<ReportInterval>,
    endpoint: Option<Endpoint>,
    local_addr: Option<SocketAddr>,
    shutdown: Shutdown,
    tasks: Vec<JoinHandle<()>>,
}

impl ServiceInstance {
    /// Create an instance in the `Created` state with in-process sinks.
    pub fn new(config: ServiceConfig) -> Self {
        let identity = InstanceIdentity::from_config(&config.instance);
        let policy = UpgradeDomainRollback::from_config(&config.node, &config.rollback)
            .map(|policy| Arc::new(policy) as Arc<dyn RollbackPolicy>);
        let (state, _) = watch::channel(LifecycleState::Created);
        let (interval, _) = watch::channel(ReportInterval::from_secs(config.health.interval_secs));

        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            identity,
            counter: RequestCounter::new(),
            votes: Arc::new(VoteStore::new()),
            sinks: ReportSinks {
                health: Arc::new(HealthStore::new()),
                load: Arc::new(LoadStore::new()),
            },
            policy,
            state,
            interval,
            endpoint: None,
            local_addr: None,
            shutdown: Shutdown::new(),
            tasks: Vec::new(),
        }
    }

    pub fn with_health_sink(mut self, sink: Arc<dyn HealthSink>) -> Self {
        self.sinks.health = sink;
        self
    }

    pub fn with_load_sink(mut self, sink: Arc<dyn LoadSink>) -> Self {
        self.sinks.load = sink;
        self
    }

    /// Replace the rollback policy derived from configuration.
    pub fn with_rollback_policy(mut self, policy: Option<Arc<dyn RollbackPolicy>>) -> Self {
        self.policy = policy;
        self
    }

    pub fn identity(&self) -> InstanceIdentity {
        self.identity
    }

    pub fn counter(&self) -> RequestCounter {
        self.counter.clone()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn report_interval(&self) -> ReportInterval {
        *self.interval.borrow()
    }

    pub fn watch_report_interval(&self) -> watch::Receiver<ReportInterval> {
        self.interval.subscribe()
    }

    /// Resolved endpoint, once opened.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Socket address actually bound, once opened.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn config(&self) -> Arc<ServiceConfig> {
        self.config.load_full()
    }

    /// Read-only view for request handlers.
    ///
    /// Addresses are empty until the endpoint is resolved.
    pub fn view(&self) -> InstanceView {
        InstanceView {
            identity: self.identity,
            bind_address: self.endpoint.as_ref().map(Endpoint::bind_address).unwrap_or_default(),
            publish_address: self
                .endpoint
                .as_ref()
                .map(Endpoint::publish_address)
                .unwrap_or_default(),
            state: self.state.subscribe(),
            interval: self.interval.subscribe(),
        }
    }

    /// Start the instance and return the published address.
    pub async fn open(&mut self) -> Result<String, StartupError> {
        let current = self.state();
        if current != LifecycleState::Created {
            return Err(StartupError::InvalidState(current));
        }

        self.transition(LifecycleState::Starting);
        match self.start().await {
            Ok(publish_address) => {
                self.transition(LifecycleState::Running);
                Ok(publish_address)
            }
            Err(e) => {
                tracing::error!(instance = %self.identity, error = %e, "Startup failed");
                self.transition(LifecycleState::Stopped);
                Err(e)
            }
        }
    }

    async fn start(&mut self) -> Result<String, StartupError> {
        let config = self.config.load_full();

        let endpoint = resolve_from_config(&config.endpoint, &config.node, &self.identity)?;
        let tls = match endpoint.protocol() {
            Protocol::Http => None,
            Protocol::Https => {
                let tls = config.endpoint.tls.as_ref().ok_or(ConfigurationError::MissingTls)?;
                Some(load_tls_config(&tls.cert_path, &tls.key_path).await?)
            }
        };

        let listener = BoundListener::bind(&endpoint).await?;
        self.local_addr = Some(listener.local_addr());
        let bind_address = endpoint.bind_address();
        let publish_address = endpoint.publish_address();
        self.endpoint = Some(endpoint);

        let app_state = AppState {
            counter: self.counter.clone(),
            votes: self.votes.clone(),
            config: self.config.clone(),
            instance: self.view(),
            sinks: self.sinks.clone(),
        };
        let mut server = HttpServer::new(app_state, &config.http);
        if let Some(tls) = tls {
            server = server.with_tls(tls);
        }
        let server_shutdown = self.shutdown.subscribe();
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = server.run(listener, server_shutdown).await {
                tracing::error!(error = %e, "HTTP server failed");
            }
        }));

        let reporter = HealthReporter::new(
            self.identity,
            ReportSettings::from(&config.health),
            self.counter.clone(),
            self.sinks.clone(),
            self.interval.subscribe(),
        )
        .with_policy(self.policy.clone());
        self.tasks.push(tokio::spawn(reporter.run(self.shutdown.subscribe())));
        metrics::record_report_interval(self.report_interval());

        tracing::info!(
            instance = %self.identity,
            node = %config.node.name,
            endpoint = %config.endpoint.name,
            bind_address = %bind_address,
            publish_address = %publish_address,
            "Endpoint published"
        );
        Ok(publish_address)
    }

    /// Change the reporting interval of the running timer.
    ///
    /// Values below the floor are raised to it. Returns the effective interval.
    pub fn reconfigure(&self, interval_secs: u64) -> ReportInterval {
        let next = ReportInterval::from_secs(interval_secs);
        let changed = self.interval.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });

        let config = self.config.load();
        if changed {
            tracing::info!(
                source_id = %config.health.source_id,
                partition_id = %self.identity.partition_id,
                replica_id = self.identity.replica_id,
                interval_secs = next.as_secs(),
                requested_secs = interval_secs,
                "Health report interval changed"
            );
            metrics::record_report_interval(next);
        } else {
            tracing::debug!(
                source_id = %config.health.source_id,
                partition_id = %self.identity.partition_id,
                replica_id = self.identity.replica_id,
                interval_secs = next.as_secs(),
                requested_secs = interval_secs,
                "Health report interval unchanged"
            );
        }
        next
    }

    /// Apply a reloaded configuration.
    ///
    /// The running instance ids are kept; a file without `[instance]` would
    /// otherwise carry freshly generated ones.
    pub fn apply_config(&self, mut config: ServiceConfig) {
        {
            let current = self.config.load();
            if current.endpoint != config.endpoint || current.node != config.node {
                tracing::warn!("Endpoint and node changes take effect after restart");
            }
            if current.instance != config.instance {
                tracing::debug!(
                    partition_id = %self.identity.partition_id,
                    replica_id = self.identity.replica_id,
                    "Reloaded instance ids ignored, keeping running identity"
                );
                config.instance = current.instance.clone();
            }
        }
        self.reconfigure(config.health.interval_secs);
        self.config.store(Arc::new(config));
    }

    /// Keep the instance alive until `cancel` fires, then close it.
    pub async fn run(
        &mut self,
        mut cancel: ShutdownSignal,
        mut config_updates: mpsc::UnboundedReceiver<ServiceConfig>,
    ) {
        if self.state() == LifecycleState::Running {
            let mut updates_open = true;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.recv() => {
                        tracing::info!(instance = %self.identity, "Cancellation requested");
                        break;
                    }
                    update = config_updates.recv(), if updates_open => match update {
                        Some(config) => self.apply_config(config),
                        None => updates_open = false,
                    },
                }
            }
        }
        self.close().await;
    }

    /// Stop reporting and serving. Idempotent.
    pub async fn close(&mut self) {
        if matches!(self.state(), LifecycleState::Stopping | LifecycleState::Stopped) {
            return;
        }

        self.transition(LifecycleState::Stopping);
        self.shutdown.trigger();

        for mut task in self.tasks.drain(..) {
            match time::timeout(SHUTDOWN_GRACE, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Background task ended abnormally"),
                Err(_) => {
                    tracing::warn!("Background task did not stop in time, aborting");
                    task.abort();
                }
            }
        }

        self.transition(LifecycleState::Stopped);
    }

    fn transition(&self, to: LifecycleState) {
        let from = self.state.send_replace(to);
        tracing::info!(instance = %self.identity, from = %from, to = %to, "Lifecycle transition");
    }
}

impl Drop for ServiceInstance {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::InstanceConfig;

    fn config() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.endpoint.bind_ip = Some("127.0.0.1".parse().unwrap());
        config.observability.metrics_enabled = false;
        config
    }

    #[test]
    fn new_instance_is_created_with_configured_interval() {
        let mut config = config();
        config.health.interval_secs = 90;
        let instance = ServiceInstance::new(config);

        assert_eq!(instance.state(), LifecycleState::Created);
        assert_eq!(instance.report_interval().as_secs(), 90);
        assert!(instance.endpoint().is_none());
        assert_eq!(instance.counter().snapshot(), 0);
    }

    #[test]
    fn reconfigure_applies_floor() {
        let instance = ServiceInstance::new(config());
        assert_eq!(instance.reconfigure(5).as_secs(), 30);
        assert_eq!(instance.reconfigure(60).as_secs(), 60);
        assert_eq!(instance.report_interval().as_secs(), 60);
    }

    #[test]
    fn apply_config_updates_interval_and_shared_config() {
        let instance = ServiceInstance::new(config());
        let mut next = instance.config().as_ref().clone();
        next.health.interval_secs = 75;
        next.http.content_dir = "/srv/www".into();

        instance.apply_config(next);

        assert_eq!(instance.report_interval().as_secs(), 75);
        assert_eq!(instance.config().http.content_dir, std::path::PathBuf::from("/srv/www"));
    }

    #[test]
    fn apply_config_keeps_running_instance_ids() {
        let instance = ServiceInstance::new(config());
        let identity = instance.identity();
        let running = instance.config().instance.clone();

        let mut reloaded = instance.config().as_ref().clone();
        reloaded.instance = InstanceConfig::default();
        reloaded.health.interval_secs = 45;
        instance.apply_config(reloaded);

        assert_eq!(instance.config().instance, running);
        assert_eq!(instance.config().instance.partition_id, identity.partition_id);
        assert_eq!(instance.config().instance.replica_id, identity.replica_id);
        assert_eq!(instance.report_interval().as_secs(), 45);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn every_reconfigure_logs_interval_event() {
        let instance = ServiceInstance::new(config());
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            // default interval already 30, so the first two leave it unchanged
            instance.reconfigure(30);
            instance.reconfigure(5);
            instance.reconfigure(60);
        });

        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text.matches("Health report interval unchanged").count(), 2);
        assert_eq!(text.matches("Health report interval changed").count(), 1);
    }

    #[tokio::test]
    async fn close_before_open_stops() {
        let mut instance = ServiceInstance::new(config());
        instance.close().await;
        assert_eq!(instance.state(), LifecycleState::Stopped);

        let err = instance.open().await.unwrap_err();
        assert!(matches!(err, StartupError::InvalidState(LifecycleState::Stopped)));
    }

    #[tokio::test]
    async fn invalid_endpoint_stops_instance() {
        let mut config = config();
        config.endpoint.protocol = "gopher".into();
        let mut instance = ServiceInstance::new(config);

        let err = instance.open().await.unwrap_err();
        assert!(matches!(
            err,
            StartupError::Configuration(ConfigurationError::UnsupportedProtocol(_))
        ));
        assert_eq!(instance.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn https_without_tls_material_is_configuration_error() {
        let mut config = config();
        config.endpoint.protocol = "https".into();
        let mut instance = ServiceInstance::new(config);

        let err = instance.open().await.unwrap_err();
        assert!(matches!(err, StartupError::Configuration(ConfigurationError::MissingTls)));
        assert_eq!(instance.state(), LifecycleState::Stopped);
    }

    #[test]
    fn states_display_lowercase() {
        assert_eq!(LifecycleState::Running.to_string(), "running");
        assert_eq!(
            serde_json::to_string(&LifecycleState::Stopped).unwrap(),
            "\"stopped\""
        );
    }
}

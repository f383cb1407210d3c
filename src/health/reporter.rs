//! Periodic health and load reporting.
//!
//! # Responsibilities
//! - Sample the request counter on a timer
//! - Derive requests-per-second since the previous sample
//! - Emit one heartbeat health report and one `RPS` load metric per tick
//! - Re-arm the timer when the interval is reconfigured
//!
//! # Design Decisions
//! - Elapsed time is measured on the clock, not taken from the interval, and
//!   floored at one second; the rate truncates
//! - The interval arrives through a `watch` channel; sample state is owned by
//!   the reporter task alone and survives reconfiguration
//! - Emission failures are logged and dropped; the next tick supersedes them

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::config::schema::HealthConfig;
use crate::health::counter::RequestCounter;
use crate::health::policy::RollbackPolicy;
use crate::health::report::{HealthReport, HealthState, LoadMetric, ReportTarget};
use crate::health::sink::{HealthSink, LoadSink};
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::net::address::InstanceIdentity;
use crate::observability::metrics;

/// Smallest accepted reporting interval, in seconds.
pub const MIN_REPORT_INTERVAL_SECS: u64 = 30;

/// Interval used when nothing is configured, in seconds.
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 30;

/// Reporting cadence, never below [`MIN_REPORT_INTERVAL_SECS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReportInterval(Duration);

impl ReportInterval {
    /// Build from whole seconds, coercing values below the floor up to it.
    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs.max(MIN_REPORT_INTERVAL_SECS)))
    }

    pub fn get(self) -> Duration {
        self.0
    }

    pub fn as_secs(self) -> u64 {
        self.0.as_secs()
    }

    /// Validity window of a report emitted at this cadence.
    pub fn time_to_live(self) -> Duration {
        self.0.saturating_mul(2)
    }
}

impl Default for ReportInterval {
    fn default() -> Self {
        Self::from_secs(DEFAULT_REPORT_INTERVAL_SECS)
    }
}

/// Throughput observed over one sample window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub total: u64,
    pub delta: u64,
    pub elapsed_secs: u64,
    pub rps: u64,
}

/// Last sample taken by the reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportingState {
    last_value: u64,
    last_at: Instant,
}

impl ReportingState {
    pub fn new(last_value: u64, last_at: Instant) -> Self {
        Self { last_value, last_at }
    }

    pub fn last_value(&self) -> u64 {
        self.last_value
    }

    pub fn last_at(&self) -> Instant {
        self.last_at
    }

    /// Close the current window at `now` with counter value `total`.
    pub fn advance(&mut self, total: u64, now: Instant) -> Sample {
        let elapsed_secs = now.saturating_duration_since(self.last_at).as_secs().max(1);
        let delta = total.saturating_sub(self.last_value);
        let rps = delta / elapsed_secs;

        self.last_value = total;
        self.last_at = now;

        Sample {
            total,
            delta,
            elapsed_secs,
            rps,
        }
    }
}

/// Identifies the reports this instance emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSettings {
    pub source_id: String,
    pub property: String,
}

impl From<&HealthConfig> for ReportSettings {
    fn from(config: &HealthConfig) -> Self {
        Self {
            source_id: config.source_id.clone(),
            property: config.property.clone(),
        }
    }
}

/// Where reports go.
#[derive(Clone)]
pub struct ReportSinks {
    pub health: Arc<dyn HealthSink>,
    pub load: Arc<dyn LoadSink>,
}

/// Everything produced by one reporting cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub sample: Sample,
    pub heartbeat: HealthReport,
    pub load: LoadMetric,
    pub rollback: Option<HealthReport>,
}

/// Background task sampling the counter and emitting health and load.
pub struct HealthReporter {
    identity: InstanceIdentity,
    settings: ReportSettings,
    counter: RequestCounter,
    sinks: ReportSinks,
    policy: Option<Arc<dyn RollbackPolicy>>,
    state: ReportingState,
    interval: watch::Receiver<ReportInterval>,
}

impl HealthReporter {
    pub fn new(
        identity: InstanceIdentity,
        settings: ReportSettings,
        counter: RequestCounter,
        sinks: ReportSinks,
        interval: watch::Receiver<ReportInterval>,
    ) -> Self {
        let state = ReportingState::new(counter.snapshot(), Instant::now());
        Self {
            identity,
            settings,
            counter,
            sinks,
            policy: None,
            state,
            interval,
        }
    }

    pub fn with_policy(mut self, policy: Option<Arc<dyn RollbackPolicy>>) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> &ReportingState {
        &self.state
    }

    /// Run one sampling pass at `now` without emitting anything.
    pub fn tick(&mut self, now: Instant) -> Tick {
        let interval = *self.interval.borrow();
        let sample = self.state.advance(self.counter.snapshot(), now);

        let heartbeat = HealthReport::new(&self.settings.source_id, &self.settings.property, HealthState::Ok)
            .with_time_to_live(interval.time_to_live())
            .with_description(format!(
                "{} requests since last report. RPS: {} Total requests: {}.",
                sample.delta, sample.rps, sample.total
            ))
            .remove_when_expired(false);
        let load = LoadMetric::rps(sample.rps);
        let rollback = self
            .policy
            .as_ref()
            .and_then(|policy| policy.evaluate(&heartbeat, interval));

        Tick {
            sample,
            heartbeat,
            load,
            rollback,
        }
    }

    /// Sample and emit.
    pub fn report_once(&mut self, now: Instant) -> Tick {
        let tick = self.tick(now);
        self.emit(&tick);
        tick
    }

    fn emit(&self, tick: &Tick) {
        let target = self.identity.target();

        self.send_health(&target, &tick.heartbeat);

        if let Err(e) = self
            .sinks
            .load
            .report_load(&target, std::slice::from_ref(&tick.load))
        {
            tracing::warn!(
                partition_id = %target.partition_id,
                replica_id = target.replica_id,
                metric = %tick.load.name,
                error = %e,
                "Load report dropped"
            );
            metrics::record_report_dropped("load");
        }

        if let Some(rollback) = &tick.rollback {
            self.send_health(&target, rollback);
        }
    }

    fn send_health(&self, target: &ReportTarget, report: &HealthReport) {
        match self.sinks.health.report_health(target, report.clone()) {
            Ok(sequence_number) => {
                tracing::info!(
                    source_id = %report.source_id,
                    property = %report.property,
                    state = %report.state,
                    partition_id = %target.partition_id,
                    replica_id = target.replica_id,
                    sequence_number,
                    description = %report.description,
                    "Health report"
                );
            }
            Err(e) => {
                tracing::warn!(
                    source_id = %report.source_id,
                    partition_id = %target.partition_id,
                    replica_id = target.replica_id,
                    error = %e,
                    "Health report dropped"
                );
                metrics::record_report_dropped("health");
            }
        }
    }

    fn arm(interval: ReportInterval) -> Interval {
        let period = interval.get();
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Report on every interval until `shutdown` fires.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        let mut current = *self.interval.borrow_and_update();
        let mut ticker = Self::arm(current);
        let mut updates_open = true;

        tracing::info!(
            instance = %self.identity,
            interval_secs = current.as_secs(),
            "Health reporter starting"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Health reporter received shutdown signal, exiting loop");
                    break;
                }
                changed = self.interval.changed(), if updates_open => {
                    match changed {
                        Ok(()) => {
                            let next = *self.interval.borrow_and_update();
                            if next != current {
                                current = next;
                                ticker = Self::arm(current);
                                tracing::debug!(interval_secs = current.as_secs(), "Reporting timer re-armed");
                            }
                        }
                        Err(_) => updates_open = false,
                    }
                }
                _ = ticker.tick() => {
                    self.report_once(Instant::now());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::policy::UpgradeDomainRollback;
    use crate::health::report::RPS_METRIC;
    use crate::health::sink::{HealthStore, LoadStore, ReportEmissionError};
    use crate::lifecycle::shutdown::Shutdown;
    use uuid::Uuid;

    struct FailingLoadSink;

    impl LoadSink for FailingLoadSink {
        fn report_load(&self, _: &ReportTarget, _: &[LoadMetric]) -> Result<(), ReportEmissionError> {
            Err(ReportEmissionError::Unavailable("load balancer offline".into()))
        }
    }

    #[derive(Default)]
    struct FailingHealthSink {
        attempts: std::sync::atomic::AtomicU64,
    }

    impl HealthSink for FailingHealthSink {
        fn report_health(&self, _: &ReportTarget, _: HealthReport) -> Result<u64, ReportEmissionError> {
            self.attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(ReportEmissionError::Rejected("health store read-only".into()))
        }
    }

    fn identity() -> InstanceIdentity {
        InstanceIdentity::new(Uuid::from_u128(0xabc), 17)
    }

    fn settings() -> ReportSettings {
        ReportSettings {
            source_id: "ServiceHealth".into(),
            property: "Heartbeat".into(),
        }
    }

    struct Harness {
        counter: RequestCounter,
        health: Arc<HealthStore>,
        load: Arc<LoadStore>,
        interval: watch::Sender<ReportInterval>,
        reporter: HealthReporter,
    }

    fn harness(secs: u64) -> Harness {
        let counter = RequestCounter::new();
        let health = Arc::new(HealthStore::new());
        let load = Arc::new(LoadStore::new());
        let (interval, interval_rx) = watch::channel(ReportInterval::from_secs(secs));
        let sinks = ReportSinks {
            health: health.clone(),
            load: load.clone(),
        };
        let reporter = HealthReporter::new(identity(), settings(), counter.clone(), sinks, interval_rx);
        Harness {
            counter,
            health,
            load,
            interval,
            reporter,
        }
    }

    #[test]
    fn interval_is_floored() {
        assert_eq!(ReportInterval::from_secs(5).as_secs(), 30);
        assert_eq!(ReportInterval::from_secs(0).as_secs(), 30);
        assert_eq!(ReportInterval::from_secs(60).as_secs(), 60);
        assert_eq!(ReportInterval::default().as_secs(), DEFAULT_REPORT_INTERVAL_SECS);
        assert_eq!(ReportInterval::from_secs(45).time_to_live(), Duration::from_secs(90));
    }

    #[test]
    fn idle_window_reports_zero_rate() {
        let start = Instant::now();
        let mut state = ReportingState::new(100, start);

        let sample = state.advance(100, start + Duration::from_secs(10));

        assert_eq!(sample.delta, 0);
        assert_eq!(sample.rps, 0);
        assert_eq!(state.last_value(), 100);
        assert_eq!(state.last_at(), start + Duration::from_secs(10));
    }

    #[test]
    fn rate_over_ten_seconds() {
        let start = Instant::now();
        let mut state = ReportingState::new(100, start);

        let sample = state.advance(150, start + Duration::from_secs(10));

        assert_eq!(
            sample,
            Sample {
                total: 150,
                delta: 50,
                elapsed_secs: 10,
                rps: 5
            }
        );
        assert_eq!(state.last_value(), 150);
    }

    #[test]
    fn sub_second_window_is_floored_to_one_second() {
        let start = Instant::now();
        let mut state = ReportingState::new(0, start);

        let sample = state.advance(7, start + Duration::from_millis(400));
        assert_eq!(sample.elapsed_secs, 1);
        assert_eq!(sample.rps, 7);

        let same_instant = state.last_at();
        let sample = state.advance(7, same_instant);
        assert_eq!(sample.elapsed_secs, 1);
        assert_eq!(sample.rps, 0);
    }

    #[test]
    fn rate_truncates() {
        let start = Instant::now();
        let mut state = ReportingState::new(0, start);
        let sample = state.advance(29, start + Duration::from_secs(10));
        assert_eq!(sample.rps, 2);
    }

    #[test]
    fn tick_builds_heartbeat_and_load_from_one_sample() {
        let mut h = harness(30);
        for _ in 0..90 {
            h.counter.increment();
        }
        let now = h.reporter.state().last_at() + Duration::from_secs(30);

        let tick = h.reporter.tick(now);

        assert_eq!(tick.sample.delta, 90);
        assert_eq!(tick.sample.rps, 3);
        assert_eq!(tick.heartbeat.state, HealthState::Ok);
        assert_eq!(tick.heartbeat.time_to_live, Duration::from_secs(60));
        assert_eq!(
            tick.heartbeat.description,
            "90 requests since last report. RPS: 3 Total requests: 90."
        );
        assert_eq!(tick.heartbeat.sequence_number, None);
        assert!(!tick.heartbeat.remove_when_expired);
        assert_eq!(tick.load, LoadMetric::new(RPS_METRIC, 3));
        assert!(tick.rollback.is_none());
        assert_eq!(h.reporter.state().last_value(), 90);

        // tick alone emits nothing
        assert!(h.health.is_empty());
    }

    #[test]
    fn report_once_emits_to_both_sinks() {
        let mut h = harness(30);
        for _ in 0..60 {
            h.counter.increment();
        }
        let now = h.reporter.state().last_at() + Duration::from_secs(30);
        h.reporter.report_once(now);

        let target = identity().target();
        let entry = h.health.get(&target, "ServiceHealth", "Heartbeat").unwrap();
        assert_eq!(entry.sequence_number, 1);
        assert_eq!(entry.reported_state, HealthState::Ok);
        assert_eq!(h.load.get(&target, RPS_METRIC), Some(2));
    }

    #[test]
    fn rollback_policy_supersedes_heartbeat() {
        let h = harness(30);
        let policy: Arc<dyn RollbackPolicy> =
            Arc::new(UpgradeDomainRollback::new("4", vec!["2".into(), "3".into(), "4".into()]));
        let mut reporter = h.reporter.with_policy(Some(policy));

        let now = reporter.state().last_at() + Duration::from_secs(30);
        let tick = reporter.report_once(now);
        assert!(tick.rollback.is_some());

        let entry = h
            .health
            .get(&identity().target(), "ServiceHealth", "Heartbeat")
            .unwrap();
        assert_eq!(entry.reported_state, HealthState::Error);
        assert_eq!(entry.sequence_number, 2);
        assert!(entry.remove_when_expired);
        assert_eq!(h.health.aggregated_state(), HealthState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn reconfiguration_keeps_previous_sample() {
        let h = harness(30);
        let shutdown = Shutdown::new();
        let task = tokio::spawn(h.reporter.run(shutdown.subscribe()));
        let target = identity().target();

        for _ in 0..100 {
            h.counter.increment();
        }
        // first tick at t=30: 100 requests over 30s
        time::sleep(Duration::from_secs(31)).await;
        let entry = h.health.get(&target, "ServiceHealth", "Heartbeat").unwrap();
        assert_eq!(entry.sequence_number, 1);
        assert_eq!(entry.description, "100 requests since last report. RPS: 3 Total requests: 100.");

        // re-armed at t=31, next tick at t=91
        h.interval.send_replace(ReportInterval::from_secs(60));
        for _ in 0..122 {
            h.counter.increment();
        }
        time::sleep(Duration::from_secs(59)).await;
        assert_eq!(
            h.health.get(&target, "ServiceHealth", "Heartbeat").unwrap().sequence_number,
            1
        );

        time::sleep(Duration::from_secs(2)).await;
        let entry = h.health.get(&target, "ServiceHealth", "Heartbeat").unwrap();
        assert_eq!(entry.sequence_number, 2);
        // delta against the t=30 sample, over 61 seconds
        assert_eq!(entry.description, "122 requests since last report. RPS: 2 Total requests: 222.");
        assert_eq!(entry.ttl_secs, 120);
        assert_eq!(h.load.get(&target, RPS_METRIC), Some(2));

        shutdown.trigger();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn below_floor_reconfiguration_uses_floor() {
        let h = harness(60);
        let shutdown = Shutdown::new();
        let task = tokio::spawn(h.reporter.run(shutdown.subscribe()));
        let target = identity().target();

        h.interval.send_replace(ReportInterval::from_secs(5));
        time::sleep(Duration::from_secs(29)).await;
        assert!(h.health.is_empty());

        time::sleep(Duration::from_secs(2)).await;
        let entry = h.health.get(&target, "ServiceHealth", "Heartbeat").unwrap();
        assert_eq!(entry.sequence_number, 1);
        assert_eq!(entry.ttl_secs, 60);

        shutdown.trigger();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn no_reports_after_shutdown() {
        let h = harness(30);
        let shutdown = Shutdown::new();
        let task = tokio::spawn(h.reporter.run(shutdown.subscribe()));
        let target = identity().target();

        time::sleep(Duration::from_secs(45)).await;
        assert_eq!(
            h.health.get(&target, "ServiceHealth", "Heartbeat").unwrap().sequence_number,
            1
        );

        shutdown.trigger();
        task.await.unwrap();

        time::sleep(Duration::from_secs(300)).await;
        let entries = h.health.entries_at(Instant::now());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].sequence_number, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_sink_does_not_stop_reporting() {
        let counter = RequestCounter::new();
        let health = Arc::new(HealthStore::new());
        let (_interval, interval_rx) = watch::channel(ReportInterval::default());
        let sinks = ReportSinks {
            health: health.clone(),
            load: Arc::new(FailingLoadSink),
        };
        let reporter = HealthReporter::new(identity(), settings(), counter, sinks, interval_rx);
        let shutdown = Shutdown::new();
        let task = tokio::spawn(reporter.run(shutdown.subscribe()));

        time::sleep(Duration::from_secs(61)).await;
        let entry = health
            .get(&identity().target(), "ServiceHealth", "Heartbeat")
            .unwrap();
        assert_eq!(entry.sequence_number, 2);

        shutdown.trigger();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_health_report_still_emits_load() {
        let counter = RequestCounter::new();
        let health = Arc::new(FailingHealthSink::default());
        let load = Arc::new(LoadStore::new());
        let (_interval, interval_rx) = watch::channel(ReportInterval::default());
        let sinks = ReportSinks {
            health: health.clone(),
            load: load.clone(),
        };
        let reporter = HealthReporter::new(identity(), settings(), counter.clone(), sinks, interval_rx);
        let shutdown = Shutdown::new();
        let task = tokio::spawn(reporter.run(shutdown.subscribe()));
        let target = identity().target();

        for _ in 0..90 {
            counter.increment();
        }
        time::sleep(Duration::from_secs(31)).await;
        assert_eq!(health.attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(load.get(&target, RPS_METRIC), Some(3));

        for _ in 0..60 {
            counter.increment();
        }
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(health.attempts.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(load.get(&target, RPS_METRIC), Some(2));

        shutdown.trigger();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_interval_sender_keeps_period() {
        let h = harness(30);
        let shutdown = Shutdown::new();
        let task = tokio::spawn(h.reporter.run(shutdown.subscribe()));
        drop(h.interval);

        time::sleep(Duration::from_secs(95)).await;
        let entry = h
            .health
            .get(&identity().target(), "ServiceHealth", "Heartbeat")
            .unwrap();
        assert_eq!(entry.sequence_number, 3);

        shutdown.trigger();
        task.await.unwrap();
    }
}

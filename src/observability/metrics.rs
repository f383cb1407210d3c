//! Metrics collection and exposition.
//!
//! # Metrics
//! - `service_requests_total` (counter): counted API requests by method, status
//! - `service_request_duration_seconds` (histogram): API request latency
//! - `service_load` (gauge): last reported load value by metric, partition, replica
//! - `service_health_state` (gauge): 0=ok, 1=warning, 2=error by source, property
//! - `service_reports_dropped_total` (counter): reports a sink refused, by kind
//! - `service_report_interval_seconds` (gauge): current reporting interval
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::health::report::{HealthState, LoadMetric, ReportTarget};
use crate::health::reporter::ReportInterval;

/// Install the Prometheus recorder with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let method = method.to_string();
    let status = status.to_string();
    counter!("service_requests_total", "method" => method.clone(), "status" => status.clone())
        .increment(1);
    histogram!("service_request_duration_seconds", "method" => method, "status" => status)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_load(target: &ReportTarget, metric: &LoadMetric) {
    gauge!(
        "service_load",
        "metric" => metric.name.clone(),
        "partition" => target.partition_id.to_string(),
        "replica" => target.replica_id.to_string()
    )
    .set(metric.value as f64);
}

pub fn record_health_state(source_id: &str, property: &str, state: HealthState) {
    gauge!(
        "service_health_state",
        "source" => source_id.to_string(),
        "property" => property.to_string()
    )
    .set(state.as_gauge());
}

pub fn record_report_dropped(kind: &'static str) {
    counter!("service_reports_dropped_total", "kind" => kind).increment(1);
}

pub fn record_report_interval(interval: ReportInterval) {
    gauge!("service_report_interval_seconds").set(interval.as_secs() as f64);
}

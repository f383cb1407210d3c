//! Health and load report records.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

/// Name of the throughput load metric.
pub const RPS_METRIC: &str = "RPS";

/// Health state carried by a report. Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum HealthState {
    Ok,
    Warning,
    Error,
}

impl HealthState {
    /// Numeric encoding used by the health gauge.
    pub fn as_gauge(self) -> f64 {
        match self {
            HealthState::Ok => 0.0,
            HealthState::Warning => 1.0,
            HealthState::Error => 2.0,
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthState::Ok => "Ok",
            HealthState::Warning => "Warning",
            HealthState::Error => "Error",
        };
        f.write_str(name)
    }
}

/// The entity a report is filed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ReportTarget {
    pub partition_id: Uuid,
    pub replica_id: u64,
}

/// A single health report.
///
/// `sequence_number` is left unset by the reporter; the sink assigns one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub source_id: String,
    pub property: String,
    pub state: HealthState,
    pub time_to_live: Duration,
    pub description: String,
    pub sequence_number: Option<u64>,
    pub remove_when_expired: bool,
}

impl HealthReport {
    pub fn new(source_id: impl Into<String>, property: impl Into<String>, state: HealthState) -> Self {
        Self {
            source_id: source_id.into(),
            property: property.into(),
            state,
            time_to_live: Duration::MAX,
            description: String::new(),
            sequence_number: None,
            remove_when_expired: false,
        }
    }

    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = ttl;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_sequence_number(mut self, sequence_number: u64) -> Self {
        self.sequence_number = Some(sequence_number);
        self
    }

    pub fn remove_when_expired(mut self, remove: bool) -> Self {
        self.remove_when_expired = remove;
        self
    }
}

/// A named load value reported for placement decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadMetric {
    pub name: String,
    pub value: i64,
}

impl LoadMetric {
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Requests-per-second metric, saturating at `i64::MAX`.
    pub fn rps(value: u64) -> Self {
        Self::new(RPS_METRIC, i64::try_from(value).unwrap_or(i64::MAX))
    }
}

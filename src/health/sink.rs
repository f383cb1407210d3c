//! Health and load sinks.
//!
//! # Responsibilities
//! - Define the seams reports are emitted through (`HealthSink`, `LoadSink`)
//! - Provide in-process stores used by default and by the admin API
//!
//! # Design Decisions
//! - Health entries are keyed by target, source and property: a newer report
//!   from the same source and property overwrites the older one
//! - Sequence numbers are monotonic per source; explicit numbers that are not
//!   newer than the stored one are rejected
//! - Expired entries are dropped when `remove_when_expired`, otherwise they
//!   evaluate as `Error`
//! - Load is last-write-wins per target and metric name

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::health::report::{HealthReport, HealthState, LoadMetric, ReportTarget};
use crate::observability::metrics;

/// Error returned when a sink does not accept a report.
#[derive(Debug, thiserror::Error)]
pub enum ReportEmissionError {
    #[error("report rejected: {0}")]
    Rejected(String),
    #[error("stale sequence number {offered}, sink already holds {stored}")]
    Stale { offered: u64, stored: u64 },
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for health reports.
pub trait HealthSink: Send + Sync {
    /// Accept a report for `target`, returning the sequence number it was stored under.
    fn report_health(
        &self,
        target: &ReportTarget,
        report: HealthReport,
    ) -> Result<u64, ReportEmissionError>;

    /// Current evaluated entries, for sinks that can be queried.
    fn entries(&self) -> Vec<HealthEntry> {
        Vec::new()
    }
}

/// Destination for load metrics.
pub trait LoadSink: Send + Sync {
    fn report_load(
        &self,
        target: &ReportTarget,
        metrics: &[LoadMetric],
    ) -> Result<(), ReportEmissionError>;

    /// Latest stored metrics, for sinks that can be queried.
    fn entries(&self) -> Vec<LoadEntry> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct HealthKey {
    target: ReportTarget,
    source_id: String,
    property: String,
}

#[derive(Debug, Clone)]
struct StoredHealth {
    report: HealthReport,
    sequence_number: u64,
    received_at: Instant,
}

impl StoredHealth {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.received_at) >= self.report.time_to_live
    }
}

/// Evaluated view of a stored health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthEntry {
    pub partition_id: Uuid,
    pub replica_id: u64,
    pub source_id: String,
    pub property: String,
    /// State as reported.
    pub reported_state: HealthState,
    /// State after expiry is taken into account.
    pub effective_state: HealthState,
    pub description: String,
    pub sequence_number: u64,
    pub ttl_secs: u64,
    pub age_secs: u64,
    pub expired: bool,
    pub remove_when_expired: bool,
}

impl HealthEntry {
    fn evaluate(key: &HealthKey, stored: &StoredHealth, now: Instant) -> Self {
        let expired = stored.is_expired(now);
        Self {
            partition_id: key.target.partition_id,
            replica_id: key.target.replica_id,
            source_id: key.source_id.clone(),
            property: key.property.clone(),
            reported_state: stored.report.state,
            effective_state: if expired {
                HealthState::Error
            } else {
                stored.report.state
            },
            description: stored.report.description.clone(),
            sequence_number: stored.sequence_number,
            ttl_secs: stored.report.time_to_live.as_secs(),
            age_secs: now.saturating_duration_since(stored.received_at).as_secs(),
            expired,
            remove_when_expired: stored.report.remove_when_expired,
        }
    }
}

/// In-process health store.
#[derive(Debug, Default)]
pub struct HealthStore {
    entries: DashMap<HealthKey, StoredHealth>,
    /// Last sequence number handed out per source.
    sequences: DashMap<String, u64>,
}

impl HealthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate all entries at `now`, dropping expired ones marked for removal.
    pub fn entries_at(&self, now: Instant) -> Vec<HealthEntry> {
        self.entries
            .retain(|_, stored| !(stored.report.remove_when_expired && stored.is_expired(now)));

        let mut entries: Vec<HealthEntry> = self
            .entries
            .iter()
            .map(|e| HealthEntry::evaluate(e.key(), e.value(), now))
            .collect();
        entries.sort_by(|a, b| {
            (a.partition_id, a.replica_id, &a.source_id, &a.property)
                .cmp(&(b.partition_id, b.replica_id, &b.source_id, &b.property))
        });
        entries
    }

    /// Evaluate a single entry.
    pub fn get(&self, target: &ReportTarget, source_id: &str, property: &str) -> Option<HealthEntry> {
        let now = Instant::now();
        self.entries_at(now).into_iter().find(|e| {
            e.partition_id == target.partition_id
                && e.replica_id == target.replica_id
                && e.source_id == source_id
                && e.property == property
        })
    }

    /// Worst effective state across all entries; `Ok` when empty.
    pub fn aggregated_state(&self) -> HealthState {
        self.entries_at(Instant::now())
            .iter()
            .map(|e| e.effective_state)
            .max()
            .unwrap_or(HealthState::Ok)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Numbers are monotonic per source. An explicit number below the last
    /// one issued to the source is stale even when the property is new.
    fn next_sequence(&self, source_id: &str, offered: Option<u64>) -> Result<u64, ReportEmissionError> {
        let mut last = self.sequences.entry(source_id.to_string()).or_insert(0);
        let next = match offered {
            Some(n) if n < *last => {
                return Err(ReportEmissionError::Stale {
                    offered: n,
                    stored: *last,
                })
            }
            Some(n) => n,
            None => *last + 1,
        };
        *last = next;
        Ok(next)
    }
}

impl HealthSink for HealthStore {
    fn report_health(
        &self,
        target: &ReportTarget,
        mut report: HealthReport,
    ) -> Result<u64, ReportEmissionError> {
        if report.source_id.is_empty() || report.property.is_empty() {
            return Err(ReportEmissionError::Rejected(
                "source id and property must be set".to_string(),
            ));
        }

        let key = HealthKey {
            target: *target,
            source_id: report.source_id.clone(),
            property: report.property.clone(),
        };
        let received_at = Instant::now();

        let sequence_number = match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let stored = occupied.get().sequence_number;
                if let Some(offered) = report.sequence_number {
                    if offered <= stored {
                        return Err(ReportEmissionError::Stale { offered, stored });
                    }
                }
                let seq = self.next_sequence(&report.source_id, report.sequence_number)?;
                report.sequence_number = Some(seq);
                metrics::record_health_state(&report.source_id, &report.property, report.state);
                occupied.insert(StoredHealth {
                    report,
                    sequence_number: seq,
                    received_at,
                });
                seq
            }
            Entry::Vacant(vacant) => {
                let seq = self.next_sequence(&report.source_id, report.sequence_number)?;
                report.sequence_number = Some(seq);
                metrics::record_health_state(&report.source_id, &report.property, report.state);
                vacant.insert(StoredHealth {
                    report,
                    sequence_number: seq,
                    received_at,
                });
                seq
            }
        };

        Ok(sequence_number)
    }

    fn entries(&self) -> Vec<HealthEntry> {
        self.entries_at(Instant::now())
    }
}

/// Latest value of a load metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadEntry {
    pub partition_id: Uuid,
    pub replica_id: u64,
    pub name: String,
    pub value: i64,
    pub age_secs: u64,
}

#[derive(Debug, Clone, Copy)]
struct LoadRecord {
    value: i64,
    reported_at: Instant,
}

/// In-process load store, last-write-wins.
#[derive(Debug, Default)]
pub struct LoadStore {
    entries: DashMap<(ReportTarget, String), LoadRecord>,
}

impl LoadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest value reported for `name` on `target`.
    pub fn get(&self, target: &ReportTarget, name: &str) -> Option<i64> {
        self.entries
            .get(&(*target, name.to_string()))
            .map(|record| record.value)
    }
}

impl LoadSink for LoadStore {
    fn report_load(
        &self,
        target: &ReportTarget,
        metrics: &[LoadMetric],
    ) -> Result<(), ReportEmissionError> {
        let reported_at = Instant::now();
        for metric in metrics {
            if metric.name.is_empty() {
                return Err(ReportEmissionError::Rejected(
                    "load metric name must be set".to_string(),
                ));
            }
            self.entries.insert(
                (*target, metric.name.clone()),
                LoadRecord {
                    value: metric.value,
                    reported_at,
                },
            );
            metrics::record_load(target, metric);
        }
        Ok(())
    }

    fn entries(&self) -> Vec<LoadEntry> {
        let now = Instant::now();
        let mut entries: Vec<LoadEntry> = self
            .entries
            .iter()
            .map(|e| {
                let (target, name) = e.key();
                LoadEntry {
                    partition_id: target.partition_id,
                    replica_id: target.replica_id,
                    name: name.clone(),
                    value: e.value().value,
                    age_secs: now.saturating_duration_since(e.value().reported_at).as_secs(),
                }
            })
            .collect();
        entries.sort_by(|a, b| {
            (a.partition_id, a.replica_id, &a.name).cmp(&(b.partition_id, b.replica_id, &b.name))
        });
        entries
    }
}

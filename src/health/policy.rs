//! Rollback policy hook.
//!
//! A policy inspects the heartbeat built for a tick and may return an extra
//! report that is emitted right after it. Staged upgrades use this to force an
//! externally observed failure on selected upgrade domains.

use crate::config::schema::{NodeConfig, RollbackConfig};
use crate::health::report::{HealthReport, HealthState};
use crate::health::reporter::ReportInterval;

pub const ROLLBACK_DESCRIPTION: &str = "Injected health error to force rollback.";

/// Decides whether a tick should also emit a superseding report.
pub trait RollbackPolicy: Send + Sync {
    fn evaluate(&self, heartbeat: &HealthReport, interval: ReportInterval) -> Option<HealthReport>;
}

impl<F> RollbackPolicy for F
where
    F: Fn(&HealthReport, ReportInterval) -> Option<HealthReport> + Send + Sync,
{
    fn evaluate(&self, heartbeat: &HealthReport, interval: ReportInterval) -> Option<HealthReport> {
        self(heartbeat, interval)
    }
}

/// Fails health on nodes whose upgrade domain is in a configured set.
#[derive(Debug, Clone)]
pub struct UpgradeDomainRollback {
    node_upgrade_domain: String,
    domains: Vec<String>,
}

impl UpgradeDomainRollback {
    pub fn new(node_upgrade_domain: impl Into<String>, domains: Vec<String>) -> Self {
        Self {
            node_upgrade_domain: node_upgrade_domain.into(),
            domains,
        }
    }

    /// Build from configuration; `None` when rollback is disabled.
    pub fn from_config(node: &NodeConfig, rollback: &RollbackConfig) -> Option<Self> {
        rollback
            .enabled
            .then(|| Self::new(node.upgrade_domain.clone(), rollback.upgrade_domains.clone()))
    }

    pub fn applies(&self) -> bool {
        self.domains.iter().any(|d| *d == self.node_upgrade_domain)
    }
}

impl RollbackPolicy for UpgradeDomainRollback {
    fn evaluate(&self, heartbeat: &HealthReport, interval: ReportInterval) -> Option<HealthReport> {
        if !self.applies() {
            return None;
        }
        Some(
            HealthReport::new(&heartbeat.source_id, &heartbeat.property, HealthState::Error)
                .with_time_to_live(interval.time_to_live())
                .with_description(ROLLBACK_DESCRIPTION)
                .remove_when_expired(true),
        )
    }
}

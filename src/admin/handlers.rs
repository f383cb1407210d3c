use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::health::report::HealthState;
use crate::health::sink::{HealthEntry, LoadEntry};
use crate::http::server::AppState;
use crate::lifecycle::instance::LifecycleState;

#[derive(Debug, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub version: String,
    pub state: String,
    pub instance: String,
    pub process_id: u32,
    pub partition_id: Uuid,
    pub replica_id: u64,
    pub bind_address: String,
    pub publish_address: String,
    pub total_requests: u64,
    pub report_interval_secs: u64,
    pub health: String,
}

pub async fn get_status(State(state): State<AppState>) -> Json<InstanceStatus> {
    let view = &state.instance;
    let health = state
        .sinks
        .health
        .entries()
        .iter()
        .map(|entry| entry.effective_state)
        .max()
        .unwrap_or(HealthState::Ok);
    let lifecycle: LifecycleState = view.state();

    Json(InstanceStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        state: lifecycle.to_string(),
        instance: view.identity.to_string(),
        process_id: view.identity.process_id,
        partition_id: view.identity.partition_id,
        replica_id: view.identity.replica_id,
        bind_address: view.bind_address.clone(),
        publish_address: view.publish_address.clone(),
        total_requests: state.counter.snapshot(),
        report_interval_secs: view.report_interval().as_secs(),
        health: health.to_string(),
    })
}

pub async fn get_health(State(state): State<AppState>) -> Json<Vec<HealthEntry>> {
    Json(state.sinks.health.entries())
}

pub async fn get_load(State(state): State<AppState>) -> Json<Vec<LoadEntry>> {
    Json(state.sinks.load.entries())
}

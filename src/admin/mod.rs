//! Read-only admin API.
//!
//! Exposes the instance state and what its sinks have accepted. Requests
//! here do not feed the request counter.

pub mod handlers;

use axum::{routing::get, Router};

use crate::http::server::AppState;
use self::handlers::*;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/health", get(get_health))
        .route("/admin/load", get(get_load))
}

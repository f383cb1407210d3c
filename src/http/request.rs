//! Request accounting.
//!
//! Every request reaching an `/api` route increments the shared counter
//! before the handler runs. Admin routes are not counted.

use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::health::counter::RequestCounter;
use crate::observability::metrics;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Middleware counting a request and logging its start and stop.
pub async fn count_requests(
    State(counter): State<RequestCounter>,
    request: Request,
    next: Next,
) -> Response {
    let total = counter.increment();
    let start = Instant::now();

    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        total,
        "Request started"
    );

    let response = next.run(request).await;
    let status = response.status();

    tracing::debug!(
        request_id = %request_id,
        status = status.as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "Request finished"
    );
    metrics::record_request(method.as_str(), status.as_u16(), start);

    response
}

//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the vote API under `/{partition_id}/{replica_id}`
//!   and admin routes at the root
//! - Wire up middleware (request ID, tracing, timeout, request counting)
//! - Serve on an already bound listener, plain or TLS
//! - Stop gracefully when the instance shuts down

use std::io;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{middleware, routing::get, Router};
use axum_server::tls_rustls::RustlsConfig;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::config::schema::{HttpConfig, ServiceConfig};
use crate::health::counter::RequestCounter;
use crate::health::reporter::ReportSinks;
use crate::http::request::count_requests;
use crate::http::votes::{self, VoteStore};
use crate::lifecycle::instance::InstanceView;
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::net::address::InstanceIdentity;
use crate::net::listener::BoundListener;

/// Time TLS connections get to finish after shutdown.
const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub counter: RequestCounter,
    pub votes: Arc<VoteStore>,
    pub config: Arc<ArcSwap<ServiceConfig>>,
    pub instance: InstanceView,
    pub sinks: ReportSinks,
}

/// Path the vote API is mounted under, matching the published address.
pub fn api_prefix(identity: &InstanceIdentity) -> String {
    format!("/{}/{}", identity.partition_id, identity.replica_id)
}

/// HTTP server for a service instance.
pub struct HttpServer {
    router: Router,
    tls: Option<RustlsConfig>,
}

impl HttpServer {
    pub fn new(state: AppState, config: &HttpConfig) -> Self {
        Self {
            router: Self::build_router(config, state),
            tls: None,
        }
    }

    /// Serve over TLS with the given configuration.
    pub fn with_tls(mut self, tls: RustlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    #[allow(deprecated)]
    fn build_router(config: &HttpConfig, state: AppState) -> Router {
        let api = Router::new()
            .route(
                "/api/{key}",
                get(votes::get_resource)
                    .post(votes::add_vote)
                    .delete(votes::remove_vote),
            )
            .route_layer(middleware::from_fn_with_state(
                state.counter.clone(),
                count_requests,
            ));

        Router::new()
            .nest(&api_prefix(&state.instance.identity), api)
            .merge(admin::router())
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs))),
            )
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: BoundListener, mut shutdown: ShutdownSignal) -> io::Result<()> {
        let addr = listener.local_addr();
        tracing::info!(address = %addr, tls = self.tls.is_some(), "HTTP server starting");

        match self.tls {
            None => {
                axum::serve(listener.into_inner(), self.router)
                    .with_graceful_shutdown(async move { shutdown.recv().await })
                    .await?;
            }
            Some(tls) => {
                let handle = axum_server::Handle::new();
                let trigger = handle.clone();
                tokio::spawn(async move {
                    shutdown.recv().await;
                    trigger.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
                });

                let std_listener = listener.into_inner().into_std()?;
                axum_server::from_tcp_rustls(std_listener, tls)
                    .handle(handle)
                    .serve(self.router.into_make_service())
                    .await?;
            }
        }

        tracing::info!(address = %addr, "HTTP server stopped");
        Ok(())
    }
}

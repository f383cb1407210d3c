//! Self-registering service host.
//!
//! Resolves a wildcard endpoint for a partition replica, binds it, serves a
//! small vote API and reports health and load at an adjustable interval.

pub mod admin;
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::{LifecycleState, ServiceInstance, Shutdown, StartupError};

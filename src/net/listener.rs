//! Listener binding.
//!
//! # Responsibilities
//! - Bind a TCP listener on the resolved bind address
//! - Surface bind failures as [`BindError`] without retrying
//!
//! # Design Decisions
//! - No connection limit: request backpressure belongs to the hosting layer
//! - Binding is the only socket operation here; serving is done by the HTTP layer

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::net::address::Endpoint;

/// Error type for binding the listener.
#[derive(Debug, thiserror::Error)]
#[error("failed to bind {addr}: {source}")]
pub struct BindError {
    pub addr: SocketAddr,
    #[source]
    pub source: std::io::Error,
}

/// A TCP listener bound to an endpoint's bind address.
#[derive(Debug)]
pub struct BoundListener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl BoundListener {
    /// Bind to the endpoint's bind address.
    pub async fn bind(endpoint: &Endpoint) -> Result<Self, BindError> {
        let addr = endpoint.bind_socket_addr();

        let inner = TcpListener::bind(addr)
            .await
            .map_err(|source| BindError { addr, source })?;

        let local_addr = inner
            .local_addr()
            .map_err(|source| BindError { addr, source })?;

        tracing::info!(
            bind_address = %endpoint.bind_address(),
            local_addr = %local_addr,
            "Listener bound"
        );

        Ok(Self { inner, local_addr })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn into_inner(self) -> TcpListener {
        self.inner
    }
}

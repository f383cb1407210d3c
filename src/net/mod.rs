//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Endpoint config + node address + partition/replica identity
//!     → address.rs (bind address with wildcard host, publish address with node host)
//!     → listener.rs (bind the TCP socket, BindError on failure)
//!     → tls.rs (optional, for https endpoints)
//!     → hand off to the HTTP layer
//! ```
//!
//! # Design Decisions
//! - Address derivation is pure and separate from binding
//! - Bind failures are fatal and surfaced, never retried here

pub mod address;
pub mod listener;
pub mod tls;

pub use address::{ConfigurationError, Endpoint, InstanceIdentity, Protocol};
pub use listener::{BindError, BoundListener};

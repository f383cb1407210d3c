//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, trace, timeout)
//!     → request.rs (count /api requests, log start and stop)
//!     → votes.rs (vote tallies, index.html)
//!     → admin (status, health, load; not counted)
//! ```

pub mod request;
pub mod server;
pub mod votes;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
pub use votes::{VoteEntry, VoteStore};

//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Instance (instance.rs):
//!     open → resolve endpoint → bind → serve + report → Running
//!     run  → apply config updates until cancelled → close
//!
//! Shutdown (shutdown.rs):
//!     trigger → reporter stops, server drains → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger shutdown
//!     SIGHUP → reload configuration
//! ```

pub mod instance;
pub mod shutdown;
pub mod signals;

pub use instance::{InstanceView, LifecycleState, ServiceInstance, StartupError};
pub use shutdown::{Shutdown, ShutdownSignal};

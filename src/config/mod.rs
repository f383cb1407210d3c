//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated)
//!
//! On change (file watcher or SIGHUP):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → pushed to the running instance over an mpsc channel
//!     → instance applies the new report interval and swaps the shared config
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Invalid reloads are logged and dropped; the current config stays
//! - Only the report interval is applied live; endpoint changes need a restart

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::EndpointConfig;
pub use schema::HealthConfig;
pub use schema::NodeConfig;
pub use schema::ServiceConfig;

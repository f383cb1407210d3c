//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request middleware, reporter, sinks, lifecycle:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint
//! ```

pub mod logging;
pub mod metrics;

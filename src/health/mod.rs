//! Health and load reporting subsystem.
//!
//! # Data Flow
//! ```text
//! Request handlers:
//!     every request → counter.rs (atomic increment)
//!
//! Reporter (reporter.rs):
//!     Periodic timer
//!     → snapshot counter, compute delta / RPS
//!     → heartbeat HealthReport + RPS LoadMetric (report.rs)
//!     → optional rollback report (policy.rs)
//!     → HealthSink / LoadSink (sink.rs)
//!
//! Reconfiguration:
//!     new interval → watch channel → reporter re-arms its timer
//! ```
//!
//! # Design Decisions
//! - One sample feeds both reports of a tick
//! - The reporter owns its sample state; only the interval is shared
//! - Sinks are traits so the hosting environment can plug in its own

pub mod counter;
pub mod policy;
pub mod report;
pub mod reporter;
pub mod sink;

pub use counter::RequestCounter;
pub use report::{HealthReport, HealthState, LoadMetric, ReportTarget};
pub use reporter::{HealthReporter, ReportInterval};
pub use sink::{HealthSink, HealthStore, LoadSink, LoadStore, ReportEmissionError};

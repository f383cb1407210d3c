//! Request volume counter.
//!
//! # Responsibilities
//! - Count every inbound request exactly once
//! - Give the reporter a non-destructive point read
//!
//! # Design Decisions
//! - Single `AtomicU64`, shared by cloning the handle
//! - Monotonic: there is no reset or decrement

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic request counter shared between request handlers and the reporter.
///
/// Clones observe and mutate the same underlying value.
#[derive(Debug, Clone, Default)]
pub struct RequestCounter {
    total: Arc<AtomicU64>,
}

impl RequestCounter {
    /// Create a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request and return the new total.
    pub fn increment(&self) -> u64 {
        self.total.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Read the current total without modifying it.
    pub fn snapshot(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }
}

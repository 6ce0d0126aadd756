//! Process-wide atomic counters.
//!
//! Incremented silently at the call site; [`Metrics::flush`] emits the
//! current values as one `info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    integrations_completed: AtomicU64,
    units_dispatched: AtomicU64,
    unit_failures: AtomicU64,
    remote_calls: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            integrations_completed: AtomicU64::new(0),
            units_dispatched: AtomicU64::new(0),
            unit_failures: AtomicU64::new(0),
            remote_calls: AtomicU64::new(0),
        }
    }

    /// A strategy call returned a result.
    pub fn inc_integrations_completed(&self) {
        self.integrations_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "integrations_completed", "counter incremented");
    }

    /// A unit was submitted to a worker pool.
    pub fn inc_units_dispatched(&self) {
        self.units_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_unit_failures(&self) {
        self.unit_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "unit_failures", "counter incremented");
    }

    /// One request/response exchange with a remote endpoint.
    pub fn inc_remote_calls(&self) {
        self.remote_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            integrations_completed = self.integrations_completed(),
            units_dispatched = self.units_dispatched(),
            unit_failures = self.unit_failures(),
            remote_calls = self.remote_calls(),
        );
    }

    pub fn integrations_completed(&self) -> u64 {
        self.integrations_completed.load(Ordering::Relaxed)
    }

    pub fn units_dispatched(&self) -> u64 {
        self.units_dispatched.load(Ordering::Relaxed)
    }

    pub fn unit_failures(&self) -> u64 {
        self.unit_failures.load(Ordering::Relaxed)
    }

    pub fn remote_calls(&self) -> u64 {
        self.remote_calls.load(Ordering::Relaxed)
    }

    /// Zero every counter (tests).
    pub fn reset(&self) {
        self.integrations_completed.store(0, Ordering::Relaxed);
        self.units_dispatched.store(0, Ordering::Relaxed);
        self.unit_failures.store(0, Ordering::Relaxed);
        self.remote_calls.store(0, Ordering::Relaxed);
    }
}

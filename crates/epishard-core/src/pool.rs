//! Fixed-size worker pool and the shared fan-in routine.
//!
//! The pool is a dedicated multi-thread tokio runtime with exactly `size`
//! worker threads. Callers create it once, pass it by reference to any
//! strategy, and shut it down when done. Units submitted to it are plain
//! closures; their `JoinHandle`s can be awaited from any runtime.

use std::any::Any;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::runtime::Runtime;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tracing::debug;

use crate::config::ExecutionConfig;
use crate::control::Armed;
use crate::domain::error::{EpiError, Result};
use crate::metrics::METRICS;
use crate::obs::emit_unit_failed;

/// Caller-owned fixed-size executor.
pub struct WorkerPool {
    runtime: Option<Runtime>,
    size: usize,
}

impl WorkerPool {
    /// Start a pool with `size` worker threads.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(EpiError::InvalidConfig(
                "worker pool size must be >= 1".to_string(),
            ));
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(size)
            .thread_name("epishard-worker")
            .build()?;
        debug!(size, "worker pool started");
        Ok(Self {
            runtime: Some(runtime),
            size,
        })
    }

    pub fn from_config(config: &ExecutionConfig) -> Result<Self> {
        Self::new(config.workers)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Submit one CPU-bound unit.
    pub fn spawn<F, T>(&self, unit: F) -> Result<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        match &self.runtime {
            Some(runtime) => {
                METRICS.inc_units_dispatched();
                Ok(runtime.spawn(async move { unit() }))
            }
            None => Err(EpiError::InvalidConfig(
                "worker pool has been shut down".to_string(),
            )),
        }
    }

    /// Stop the pool. Units still running are detached, not awaited.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            debug!(size = self.size, "worker pool stopped");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("running", &self.runtime.is_some())
            .finish()
    }
}

/// A named unit handle awaiting fan-in.
pub(crate) type UnitHandle<T> = (String, JoinHandle<Result<T>>);

/// Strict join of every unit, results returned in submission order.
///
/// Fail-fast: the first unit error (or panic) trips the cancel token, aborts
/// the remaining handles and is returned. Deadline expiry and external
/// cancellation behave the same way with their own error kinds.
pub(crate) async fn join_units<T: Send + 'static>(
    units: Vec<UnitHandle<T>>,
    armed: &Armed,
) -> Result<Vec<T>> {
    let aborts: Vec<AbortHandle> = units.iter().map(|(_, h)| h.abort_handle()).collect();
    let mut slots: Vec<Option<T>> = units.iter().map(|_| None).collect();

    let mut pending: FuturesUnordered<_> = units
        .into_iter()
        .enumerate()
        .map(|(index, (name, handle))| async move { (index, name, handle.await) })
        .collect();

    loop {
        let next = tokio::select! {
            biased;
            _ = armed.cancel.cancelled() => {
                abort_all(&aborts);
                return Err(EpiError::Cancelled);
            }
            _ = deadline_elapsed(armed) => {
                armed.cancel.cancel();
                abort_all(&aborts);
                let limit_ms = armed.deadline.map(|(_, ms)| ms).unwrap_or_default();
                return Err(EpiError::DeadlineExceeded { limit_ms });
            }
            next = pending.next() => next,
        };

        let Some((index, name, joined)) = next else {
            break;
        };

        let outcome = match joined {
            Ok(result) => result,
            Err(join_err) => Err(join_error_to_epi(&name, join_err)),
        };

        match outcome {
            Ok(value) => slots[index] = Some(value),
            Err(err) => {
                armed.cancel.cancel();
                abort_all(&aborts);
                if !err.is_interruption() {
                    METRICS.inc_unit_failures();
                    emit_unit_failed(&armed.run_id.to_string(), &name, &err);
                }
                return Err(err);
            }
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| EpiError::WorkerFailed {
                unit: format!("unit-{index}"),
                detail: "unit produced no result".to_string(),
            })
        })
        .collect()
}

async fn deadline_elapsed(armed: &Armed) {
    match armed.deadline {
        Some((at, _)) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

fn abort_all(aborts: &[AbortHandle]) {
    for handle in aborts {
        handle.abort();
    }
}

fn join_error_to_epi(unit: &str, err: JoinError) -> EpiError {
    if err.is_cancelled() {
        return EpiError::Cancelled;
    }
    let detail = match err.try_into_panic() {
        Ok(payload) => panic_message(payload),
        Err(other) => other.to_string(),
    };
    EpiError::WorkerFailed {
        unit: unit.to_string(),
        detail,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}

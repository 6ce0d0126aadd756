//! Parallel integration strategies.
//!
//! Every strategy here follows the same shape:
//! 1. validate parameters and decomposition up front, before any task exists
//! 2. fan units out onto the caller's [`WorkerPool`]
//! 3. strict fan-in through [`join_units`], fail-fast on the first error
//! 4. deterministic index-order aggregation
//!
//! Results come back wrapped in a [`RunReport`].

pub mod ensemble;
pub mod population;
pub mod rhs;

use std::future::Future;
use std::time::Instant;

use tracing::Instrument;
use uuid::Uuid;

use crate::control::{Armed, RunControl};
use crate::domain::error::Result;
use crate::domain::model::DerivativeModel;
use crate::domain::params::ModelParameters;
use crate::domain::report::{RunReport, StrategyKind};
use crate::domain::trajectory::Trajectory;
use crate::metrics::METRICS;
use crate::obs::{emit_strategy_finished, emit_strategy_started, StrategySpan};
use crate::pool::{UnitHandle, WorkerPool};
use crate::solver::Rk4Solver;

pub use ensemble::{EnsembleShardIntegrator, EnsembleSummary, Sweep, SweepAxis};
pub use population::PopulationShardIntegrator;
pub use rhs::RhsShardIntegrator;

/// Single-threaded baseline on the calling thread.
pub struct SequentialIntegrator;

impl SequentialIntegrator {
    pub fn integrate<M>(model: &M, params: &ModelParameters) -> Result<RunReport<Trajectory>>
    where
        M: DerivativeModel + ?Sized,
    {
        let run_id = Uuid::new_v4();
        let strategy = StrategyKind::Sequential;
        let _span = StrategySpan::enter(run_id, strategy);
        emit_strategy_started(run_id, strategy, model.name(), 1);

        let started = Instant::now();
        let outcome = Rk4Solver::solve(model, params);
        let elapsed = started.elapsed();
        emit_strategy_finished(run_id, strategy, elapsed, outcome.is_ok());

        let trajectory = outcome?;
        METRICS.inc_integrations_completed();
        Ok(RunReport {
            run_id,
            strategy,
            model: model.name().to_string(),
            workers: 1,
            value: trajectory,
            elapsed,
        })
    }
}

/// Run `body` under a fresh run id, span, timing and lifecycle events.
///
/// The run control is armed (deadline pinned, pre-cancellation checked)
/// before `body` starts.
pub(crate) async fn run_reported<T, F, Fut>(
    strategy: StrategyKind,
    model: &str,
    workers: usize,
    control: &RunControl,
    body: F,
) -> Result<RunReport<T>>
where
    F: FnOnce(Armed) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let run_id = Uuid::new_v4();
    let span = StrategySpan::span(run_id, strategy);

    async move {
        emit_strategy_started(run_id, strategy, model, workers);
        let started = Instant::now();
        let outcome = match control.arm(run_id) {
            Ok(armed) => body(armed).await,
            Err(err) => Err(err),
        };
        let elapsed = started.elapsed();
        emit_strategy_finished(run_id, strategy, elapsed, outcome.is_ok());

        let value = outcome?;
        METRICS.inc_integrations_completed();
        Ok(RunReport {
            run_id,
            strategy,
            model: model.to_string(),
            workers,
            value,
            elapsed,
        })
    }
    .instrument(span)
    .await
}

/// Submit named units to the pool. Each unit checks the cancel token before
/// doing any work. If submission fails part-way the token is tripped so the
/// units already running stop early.
pub(crate) fn dispatch<T, F, I>(
    pool: &WorkerPool,
    armed: &Armed,
    units: I,
) -> Result<Vec<UnitHandle<T>>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
    I: IntoIterator<Item = (String, F)>,
{
    let mut handles = Vec::new();
    for (name, unit) in units {
        let cancel = armed.cancel.clone();
        let submitted = pool.spawn(move || {
            cancel.check()?;
            unit()
        });
        match submitted {
            Ok(handle) => handles.push((name, handle)),
            Err(err) => {
                armed.cancel.cancel();
                return Err(err);
            }
        }
    }
    Ok(handles)
}

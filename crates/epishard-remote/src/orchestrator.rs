//! Distributed ensemble: scenarios split across named hosts.
//!
//! The scenario set is partitioned into one contiguous assignment per host.
//! Each host gets one client task that connects once and runs its scenarios
//! one after another. The orchestrator waits for every host, then sums the
//! peaks in scenario order, exactly like the local ensemble. Any host failure
//! aborts the batch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use epishard_core::metrics::METRICS;
use epishard_core::obs::{
    emit_host_dispatched, emit_strategy_finished, emit_strategy_started, emit_unit_failed,
    StrategySpan,
};
use epishard_core::{
    partition, CancelToken, DerivativeModel, EnsembleShardIntegrator, EnsembleSummary, EpiError, ModelKind,
    ModelParameters, RunControl, RunReport, StrategyKind, Sweep,
};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::Instrument;
use uuid::Uuid;

use crate::client::EndpointConnector;
use crate::error::{RemoteError, Result};

pub struct DistributedOrchestrator {
    connector: Arc<dyn EndpointConnector>,
    endpoints: Vec<String>,
    model: ModelKind,
}

impl DistributedOrchestrator {
    /// `endpoints` are host names in assignment order; `model` is used for
    /// local validation and must match what the hosts serve.
    pub fn new(
        connector: Arc<dyn EndpointConnector>,
        endpoints: Vec<String>,
        model: ModelKind,
    ) -> Self {
        Self {
            connector,
            endpoints,
            model,
        }
    }

    pub fn hosts(&self) -> usize {
        self.endpoints.len()
    }

    /// Run `count` scenarios of `sweep` across all hosts.
    pub async fn run(
        &self,
        base: &ModelParameters,
        sweep: &Sweep,
        count: usize,
        control: &RunControl,
    ) -> Result<RunReport<EnsembleSummary>> {
        if self.endpoints.is_empty() {
            return Err(RemoteError::config("host count must be >= 1"));
        }
        let scenarios = EnsembleShardIntegrator::plan(&self.model, base, sweep, count)?;
        let assignments = partition(count, self.endpoints.len())?;
        control.cancel.check()?;

        let run_id = Uuid::new_v4();
        let strategy = StrategyKind::Distributed;
        let hosts = self.endpoints.len();
        let span = StrategySpan::span(run_id, strategy);
        let cancel = control.cancel.child();
        let deadline = control.deadline;

        async move {
            emit_strategy_started(run_id, strategy, self.model.name(), hosts);
            let started = Instant::now();

            let mut tasks: Vec<(String, JoinHandle<Result<Vec<f64>>>)> = Vec::new();
            for assignment in assignments.iter().filter(|a| !a.is_empty()) {
                let endpoint = self.endpoints[assignment.worker].clone();
                let slice = scenarios[assignment.range.clone()].to_vec();
                emit_host_dispatched(run_id, &endpoint, assignment.range.start, slice.len());

                let connector = Arc::clone(&self.connector);
                let cancel = cancel.clone();
                let name = endpoint.clone();
                let task = tokio::spawn(
                    async move {
                        let mut client = connector.connect(&name).await?;
                        let mut peaks = Vec::with_capacity(slice.len());
                        for params in &slice {
                            cancel.check()?;
                            peaks.push(client.peak_infected(params).await?.value);
                        }
                        Ok::<_, RemoteError>(peaks)
                    }
                    .in_current_span(),
                );
                tasks.push((endpoint, task));
            }

            let outcome = join_hosts(tasks, run_id, &cancel, deadline).await;
            let elapsed = started.elapsed();
            emit_strategy_finished(run_id, strategy, elapsed, outcome.is_ok());

            let per_host = outcome?;
            let peaks: Vec<f64> = per_host.into_iter().flatten().collect();
            METRICS.inc_integrations_completed();
            Ok(RunReport {
                run_id,
                strategy,
                model: self.model.name().to_string(),
                workers: hosts,
                value: EnsembleSummary::from_peaks(peaks),
                elapsed,
            })
        }
        .instrument(span)
        .await
    }
}

/// Strict join over host tasks, results in assignment order. The first
/// failure trips the per-call token and aborts every other host task.
async fn join_hosts(
    tasks: Vec<(String, JoinHandle<Result<Vec<f64>>>)>,
    run_id: Uuid,
    cancel: &CancelToken,
    deadline: Option<Duration>,
) -> Result<Vec<Vec<f64>>> {
    let aborts: Vec<AbortHandle> = tasks.iter().map(|(_, t)| t.abort_handle()).collect();
    let mut slots: Vec<Option<Vec<f64>>> = tasks.iter().map(|_| None).collect();
    let mut pending: FuturesUnordered<_> = tasks
        .into_iter()
        .enumerate()
        .map(|(index, (host, task))| async move { (index, host, task.await) })
        .collect();

    let deadline = deadline.map(|d| (tokio::time::Instant::now() + d, d));
    let abort_all = || aborts.iter().for_each(AbortHandle::abort);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                abort_all();
                return Err(EpiError::Cancelled.into());
            }
            _ = async {
                match deadline {
                    Some((at, _)) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                cancel.cancel();
                abort_all();
                let limit_ms = deadline.map(|(_, d)| d.as_millis() as u64).unwrap_or_default();
                return Err(EpiError::DeadlineExceeded { limit_ms }.into());
            }
            next = pending.next() => next,
        };

        let Some((index, host, joined)) = next else {
            break;
        };
        let outcome = match joined {
            Ok(result) => result,
            Err(join_err) => Err(RemoteError::HostFailed {
                host: host.clone(),
                detail: join_err.to_string(),
            }),
        };
        match outcome {
            Ok(peaks) => slots[index] = Some(peaks),
            Err(err) => {
                cancel.cancel();
                abort_all();
                METRICS.inc_unit_failures();
                emit_unit_failed(&run_id.to_string(), &host, &err);
                return Err(err);
            }
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| RemoteError::HostFailed {
                host: format!("host-{index}"),
                detail: "host task produced no result".to_string(),
            })
        })
        .collect()
}

//! The integration service seam and its in-process implementation.

use std::time::Instant;

use async_trait::async_trait;
use epishard_core::{CancelToken, DerivativeModel, ModelKind, ModelParameters, Rk4Solver, Trajectory};
use tracing::debug;

use crate::error::{RemoteError, Result};
use crate::protocol::{min_trajectory_bytes, Request, Response, DEFAULT_MAX_FRAME_BYTES};

/// A value computed by a service plus the service's own compute time, so
/// callers can separate transport overhead from integration cost.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceReply<T> {
    pub value: T,
    pub server_elapsed_ms: f64,
}

/// Stateless integration service. Every call is independent and idempotent.
#[async_trait]
pub trait IntegrationEndpoint: Send + Sync {
    /// Full trajectory for `params`.
    async fn integrate(&mut self, params: &ModelParameters) -> Result<ServiceReply<Trajectory>>;

    /// Peak infected value for `params`.
    async fn peak_infected(&mut self, params: &ModelParameters) -> Result<ServiceReply<f64>>;
}

/// Runs the solver in-process on tokio's blocking pool.
#[derive(Debug, Clone, Copy)]
pub struct LocalIntegrationService {
    model: ModelKind,
    max_frame_bytes: usize,
}

impl LocalIntegrationService {
    pub fn new(model: ModelKind) -> Self {
        Self {
            model,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Refuse `integrate` requests whose trajectory cannot fit in one frame
    /// of `max_frame_bytes`.
    pub fn with_frame_limit(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    fn check_trajectory_fits(&self, params: &ModelParameters) -> Result<()> {
        let needed = min_trajectory_bytes(params.step_count as usize, self.model.compartments());
        if needed > self.max_frame_bytes {
            return Err(RemoteError::Protocol(format!(
                "trajectory of {} states needs at least {needed} bytes, over the frame limit of {}",
                params.step_count, self.max_frame_bytes
            )));
        }
        Ok(())
    }

    pub fn model(&self) -> ModelKind {
        self.model
    }

    pub async fn solve(&self, params: ModelParameters) -> Result<ServiceReply<Trajectory>> {
        let model = self.model;
        let (trajectory, elapsed_ms) = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let outcome = Rk4Solver::solve(&model, &params);
            (outcome, started.elapsed().as_secs_f64() * 1_000.0)
        })
        .await
        .map_err(|e| RemoteError::Service(format!("integration task failed: {e}")))?;
        Ok(ServiceReply {
            value: trajectory?,
            server_elapsed_ms: elapsed_ms,
        })
    }

    pub async fn peak(&self, params: ModelParameters) -> Result<ServiceReply<f64>> {
        let model = self.model;
        let (peak, elapsed_ms) = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let outcome = Rk4Solver::peak_infected(&model, &params, &CancelToken::new());
            (outcome, started.elapsed().as_secs_f64() * 1_000.0)
        })
        .await
        .map_err(|e| RemoteError::Service(format!("integration task failed: {e}")))?;
        Ok(ServiceReply {
            value: peak?,
            server_elapsed_ms: elapsed_ms,
        })
    }

    /// Answer one decoded request. Failures become `error` responses.
    pub async fn handle(&self, request: Request) -> Response {
        let op = request.op();
        let outcome = match request {
            Request::Integrate { params } => match ModelParameters::try_from(params) {
                Ok(params) => match self.check_trajectory_fits(&params) {
                    Ok(()) => self
                        .solve(params)
                        .await
                        .map(|reply| Response::trajectory(reply.value, reply.server_elapsed_ms)),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e.into()),
            },
            Request::PeakInfected { params } => match ModelParameters::try_from(params) {
                Ok(params) => self.peak(params).await.map(|reply| Response::Peak {
                    value: reply.value,
                    server_elapsed_ms: reply.server_elapsed_ms,
                }),
                Err(e) => Err(e.into()),
            },
        };

        match outcome.and_then(Response::ensure_finite) {
            Ok(response) => response,
            Err(err) => {
                debug!(op, model = %self.model.name(), error = %err, "request rejected");
                Response::error(&err)
            }
        }
    }
}

#[async_trait]
impl IntegrationEndpoint for LocalIntegrationService {
    async fn integrate(&mut self, params: &ModelParameters) -> Result<ServiceReply<Trajectory>> {
        self.solve(*params).await
    }

    async fn peak_infected(&mut self, params: &ModelParameters) -> Result<ServiceReply<f64>> {
        self.peak(*params).await
    }
}

//! Right-hand-side sharding: k1 of every step is computed one compartment per
//! task, k2..k4 on the calling task.
//!
//! This does exactly the arithmetic of the sequential solver, so the result is
//! bit-identical to [`Rk4Solver::solve`]. It also pays one fan-out/fan-in per
//! step, which makes it the slowest strategy for small compartment counts.

use std::sync::Arc;

use crate::control::RunControl;
use crate::domain::error::{EpiError, Result};
use crate::domain::model::DerivativeModel;
use crate::domain::params::ModelParameters;
use crate::domain::report::{RunReport, StrategyKind};
use crate::domain::trajectory::Trajectory;
use crate::pool::{join_units, WorkerPool};
use crate::solver::Rk4Solver;

use super::{dispatch, run_reported};

pub struct RhsShardIntegrator;

impl RhsShardIntegrator {
    /// `workers` must equal the model's compartment count.
    pub async fn integrate<M>(
        pool: &WorkerPool,
        model: &M,
        params: &ModelParameters,
        workers: usize,
        control: &RunControl,
    ) -> Result<RunReport<Trajectory>>
    where
        M: DerivativeModel + Clone + 'static,
    {
        model.validate(params)?;
        if workers != model.compartments() {
            return Err(EpiError::InvalidConfig(format!(
                "rhs sharding needs one worker per compartment: {} model has {}, got {workers}",
                model.name(),
                model.compartments()
            )));
        }

        let params = *params;
        let shared_model = Arc::new(model.clone());

        run_reported(
            StrategyKind::RhsShard,
            model.name(),
            workers,
            control,
            |armed| async move {
                let h = params.step_size();
                let mut trajectory = Trajectory::with_capacity(h, params.step_count as usize);
                let mut y = shared_model.initial_state(&params);

                for step in 0..params.step_intervals() {
                    armed.check()?;
                    let snapshot: Arc<[f64]> = Arc::from(y.as_slice());
                    let units = (0..workers).map(|component| {
                        let model = Arc::clone(&shared_model);
                        let state = Arc::clone(&snapshot);
                        let unit = move || -> Result<f64> {
                            Ok(model.derive_component(component, &state, &params))
                        };
                        (format!("step-{step}/component-{component}"), unit)
                    });
                    let handles = dispatch(pool, &armed, units)?;
                    let d1 = join_units(handles, &armed).await?;

                    let next = Rk4Solver::advance(&y, &d1, h, &mut |s: &[f64]| {
                        shared_model.derive(s, &params)
                    });
                    trajectory.push(std::mem::replace(&mut y, next));
                }
                trajectory.push(y);
                Ok(trajectory)
            },
        )
        .await
    }
}

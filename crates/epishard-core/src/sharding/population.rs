//! Population sharding: P independent sub-populations integrated in parallel
//! and summed back together.
//!
//! Each shard sees `N/P`, `I0/P` and `R0/P` with the global rates. Shard 0
//! absorbs the floating-point residual so the shards always add back up to the
//! original inputs. Mixing between shards is not modelled, so for non-linear
//! models the sum only matches the sequential run up to rounding.

use crate::control::RunControl;
use crate::domain::error::{EpiError, Result};
use crate::domain::model::DerivativeModel;
use crate::domain::params::ModelParameters;
use crate::domain::report::{RunReport, StrategyKind};
use crate::domain::trajectory::Trajectory;
use crate::pool::{join_units, WorkerPool};
use crate::reduce::sum_trajectories;
use crate::solver::Rk4Solver;

use super::{dispatch, run_reported};

pub struct PopulationShardIntegrator;

impl PopulationShardIntegrator {
    /// Per-shard parameter records, shard 0 first.
    pub fn shard_parameters(
        params: &ModelParameters,
        shards: usize,
    ) -> Result<Vec<ModelParameters>> {
        if shards == 0 {
            return Err(EpiError::InvalidConfig(
                "shard count must be >= 1".to_string(),
            ));
        }
        let population = split(params.total_population, shards);
        let infected = split(params.initial_infected, shards);
        let recovered = split(params.initial_recovered, shards);

        Ok((0..shards)
            .map(|shard| {
                let share = |parts: &(f64, f64)| if shard == 0 { parts.0 } else { parts.1 };
                ModelParameters {
                    total_population: share(&population),
                    initial_infected: share(&infected),
                    initial_recovered: share(&recovered),
                    ..*params
                }
            })
            .collect())
    }

    /// Integrate `params` as `shards` parallel sub-populations.
    pub async fn integrate<M>(
        pool: &WorkerPool,
        model: &M,
        params: &ModelParameters,
        shards: usize,
        control: &RunControl,
    ) -> Result<RunReport<Trajectory>>
    where
        M: DerivativeModel + Clone + 'static,
    {
        model.validate(params)?;
        let shard_params = Self::shard_parameters(params, shards)?;

        run_reported(
            StrategyKind::PopulationShard,
            model.name(),
            shards,
            control,
            |armed| async move {
                let units = shard_params.into_iter().enumerate().map(|(index, p)| {
                    let model = model.clone();
                    let cancel = armed.cancel.clone();
                    let unit = move || Rk4Solver::solve_cancellable(&model, &p, &cancel);
                    (format!("shard-{index}"), unit)
                });
                let handles = dispatch(pool, &armed, units)?;
                let parts = join_units(handles, &armed).await?;
                sum_trajectories(&parts)
            },
        )
        .await
    }
}

/// `(first, rest)` shares of `value` over `shards`.
fn split(value: f64, shards: usize) -> (f64, f64) {
    let share = value / shards as f64;
    let first = value - (shards - 1) as f64 * share;
    (first, share)
}

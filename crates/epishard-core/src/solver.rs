//! Classical fixed-step RK4.
//!
//! Every entry point runs the same step arithmetic:
//!
//! ```text
//! k1 = h·f(y)
//! k2 = h·f(y + k1/2)
//! k3 = h·f(y + k2/2)
//! k4 = h·f(y + k3)
//! y' = max(0, y + (k1 + 2·k2 + 2·k3 + k4) / 6)
//! ```
//!
//! The clamp is applied after the update, per component.

use crate::control::CancelToken;
use crate::domain::error::Result;
use crate::domain::model::DerivativeModel;
use crate::domain::params::ModelParameters;
use crate::domain::trajectory::{State, Trajectory};

/// Steps between two cancellation checks inside long loops.
pub const CANCEL_CHECK_INTERVAL: usize = 256;

/// Fixed-step 4th-order Runge–Kutta integrator.
pub struct Rk4Solver;

impl Rk4Solver {
    /// Integrate from `initial` for `params.step_count` stored states.
    ///
    /// No validation happens here; callers go through [`Rk4Solver::solve`] or
    /// a strategy for that.
    pub fn integrate<F>(initial: State, params: &ModelParameters, mut derive: F) -> Trajectory
    where
        F: FnMut(&[f64]) -> State,
    {
        let h = params.step_size();
        let mut trajectory = Trajectory::with_capacity(h, params.step_count as usize);
        let mut y = initial;
        for _ in 0..params.step_intervals() {
            let next = Self::step(&y, h, &mut derive);
            trajectory.push(std::mem::replace(&mut y, next));
        }
        trajectory.push(y);
        trajectory
    }

    /// One RK4 step from `y`.
    pub fn step<F>(y: &[f64], h: f64, derive: &mut F) -> State
    where
        F: FnMut(&[f64]) -> State,
    {
        let d1 = derive(y);
        Self::advance(y, &d1, h, derive)
    }

    /// One RK4 step from `y` given `d1 = f(y)` computed elsewhere.
    pub fn advance<F>(y: &[f64], d1: &[f64], h: f64, derive: &mut F) -> State
    where
        F: FnMut(&[f64]) -> State,
    {
        let k1: Vec<f64> = d1.iter().map(|d| h * d).collect();

        let probe = offset(y, &k1, 0.5);
        let k2: Vec<f64> = derive(&probe).iter().map(|d| h * d).collect();

        let probe = offset(y, &k2, 0.5);
        let k3: Vec<f64> = derive(&probe).iter().map(|d| h * d).collect();

        let probe = offset(y, &k3, 1.0);
        let k4: Vec<f64> = derive(&probe).iter().map(|d| h * d).collect();

        (0..y.len())
            .map(|i| {
                let next = y[i] + (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]) / 6.0;
                next.max(0.0)
            })
            .collect()
    }

    /// Run the step loop without storing states, handing each one (initial
    /// included) to `visit`. Checks `cancel` every [`CANCEL_CHECK_INTERVAL`]
    /// steps.
    pub fn drive<F, V>(
        initial: State,
        params: &ModelParameters,
        mut derive: F,
        cancel: &CancelToken,
        mut visit: V,
    ) -> Result<()>
    where
        F: FnMut(&[f64]) -> State,
        V: FnMut(&[f64]),
    {
        let h = params.step_size();
        let mut y = initial;
        visit(&y);
        for step in 0..params.step_intervals() {
            if step % CANCEL_CHECK_INTERVAL == 0 {
                cancel.check()?;
            }
            y = Self::step(&y, h, &mut derive);
            visit(&y);
        }
        Ok(())
    }

    /// Validated sequential integration of `model`.
    pub fn solve<M>(model: &M, params: &ModelParameters) -> Result<Trajectory>
    where
        M: DerivativeModel + ?Sized,
    {
        model.validate(params)?;
        Ok(Self::integrate(
            model.initial_state(params),
            params,
            |state| model.derive(state, params),
        ))
    }

    /// Full trajectory of `model` that stops early once `cancel` trips.
    ///
    /// Parameters are not validated; strategies validate the whole call once
    /// before splitting it into units.
    pub fn solve_cancellable<M>(
        model: &M,
        params: &ModelParameters,
        cancel: &CancelToken,
    ) -> Result<Trajectory>
    where
        M: DerivativeModel + ?Sized,
    {
        let mut trajectory =
            Trajectory::with_capacity(params.step_size(), params.step_count as usize);
        Self::drive(
            model.initial_state(params),
            params,
            |state| model.derive(state, params),
            cancel,
            |state| trajectory.push(state.to_vec()),
        )?;
        Ok(trajectory)
    }

    /// Largest infected value over the whole run, initial state included.
    ///
    /// Streams the states, so memory stays constant in `step_count`.
    pub fn peak_infected<M>(
        model: &M,
        params: &ModelParameters,
        cancel: &CancelToken,
    ) -> Result<f64>
    where
        M: DerivativeModel + ?Sized,
    {
        model.validate(params)?;
        let infected = model.infected_index();
        let mut peak = f64::NEG_INFINITY;
        Self::drive(
            model.initial_state(params),
            params,
            |state| model.derive(state, params),
            cancel,
            |state| peak = peak.max(state[infected]),
        )?;
        Ok(peak)
    }
}

fn offset(y: &[f64], k: &[f64], scale: f64) -> State {
    y.iter().zip(k).map(|(y, k)| y + k * scale).collect()
}

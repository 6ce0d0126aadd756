//! State vectors and trajectories.

use serde::{Deserialize, Serialize};

/// Compartment values at one step, e.g. `[S, I, R]`.
pub type State = Vec<f64>;

/// Time-ordered sequence of states produced by one integration call.
///
/// `states[0]` is always the initial condition; `states[i]` is the state at
/// `t = i * step_size`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    step_size: f64,
    states: Vec<State>,
}

impl Trajectory {
    pub fn new(step_size: f64, states: Vec<State>) -> Self {
        Self { step_size, states }
    }

    /// Pre-sized empty trajectory, filled by the solver.
    pub(crate) fn with_capacity(step_size: f64, capacity: usize) -> Self {
        Self {
            step_size,
            states: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, state: State) {
        self.states.push(state);
    }

    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Number of compartments per state (0 for an empty trajectory).
    pub fn compartments(&self) -> usize {
        self.states.first().map(Vec::len).unwrap_or(0)
    }

    pub fn state(&self, index: usize) -> Option<&[f64]> {
        self.states.get(index).map(Vec::as_slice)
    }

    pub fn initial_state(&self) -> Option<&[f64]> {
        self.state(0)
    }

    pub fn final_state(&self) -> Option<&[f64]> {
        self.states.last().map(Vec::as_slice)
    }

    pub fn time_at(&self, index: usize) -> f64 {
        index as f64 * self.step_size
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    /// Row-major matrix view `[step][compartment]`.
    pub fn as_rows(&self) -> &[State] {
        &self.states
    }

    pub fn into_rows(self) -> Vec<State> {
        self.states
    }

    /// Time series of one compartment.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`Trajectory::compartments`].
    pub fn compartment(&self, index: usize) -> Vec<f64> {
        self.states.iter().map(|s| s[index]).collect()
    }

    /// Largest value a compartment reaches, including the initial state.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`Trajectory::compartments`].
    pub fn peak(&self, index: usize) -> f64 {
        self.states
            .iter()
            .map(|s| s[index])
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Sum over compartments at every step.
    pub fn totals(&self) -> Vec<f64> {
        self.states.iter().map(|s| s.iter().sum()).collect()
    }
}

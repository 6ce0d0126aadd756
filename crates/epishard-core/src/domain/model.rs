//! Compartmental derivative models.
//!
//! [`DerivativeModel`] is the only place model equations live. Every solver
//! and sharding strategy calls it; none of them know which variant they are
//! integrating.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{EpiError, Result};
use super::params::ModelParameters;
use super::trajectory::State;

/// Capability interface for an autonomous compartmental model.
///
/// Implementations must be pure: the same `(index, state, params)` always
/// yields the same value and no shared state is touched, so the model can be
/// evaluated from many workers at once on disjoint buffers.
pub trait DerivativeModel: Send + Sync {
    /// Short identifier used in logs and reports.
    fn name(&self) -> &'static str;

    /// Number of compartments in the state vector.
    fn compartments(&self) -> usize;

    /// Index of the infected compartment.
    fn infected_index(&self) -> usize {
        1
    }

    /// Whether `initial_recovered` seeds a compartment.
    fn tracks_recovered(&self) -> bool;

    /// Derivative of compartment `index` at `state`.
    fn derive_component(&self, index: usize, state: &[f64], params: &ModelParameters) -> f64;

    /// State at t = 0 derived from the parameters.
    fn initial_state(&self, params: &ModelParameters) -> State;

    /// Full derivative vector written into `out`.
    fn derive_into(&self, state: &[f64], params: &ModelParameters, out: &mut [f64]) {
        for (index, slot) in out.iter_mut().enumerate().take(self.compartments()) {
            *slot = self.derive_component(index, state, params);
        }
    }

    /// Full derivative vector.
    fn derive(&self, state: &[f64], params: &ModelParameters) -> State {
        let mut out = vec![0.0; self.compartments()];
        self.derive_into(state, params, &mut out);
        out
    }

    /// Fail-fast parameter validation for this model.
    fn validate(&self, params: &ModelParameters) -> Result<()> {
        params.validate(self.tracks_recovered())
    }
}

/// Tagged model variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Susceptible → Infected → Recovered, state `[S, I, R]`.
    Sir,
    /// Susceptible → Infected → Susceptible, state `[S, I]`.
    Sis,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Sir, ModelKind::Sis];

    /// β·S·I/N, shared by both variants.
    fn incidence(state: &[f64], params: &ModelParameters) -> f64 {
        params.transmission_rate * state[0] * state[1] / params.total_population
    }
}

impl DerivativeModel for ModelKind {
    fn name(&self) -> &'static str {
        match self {
            ModelKind::Sir => "sir",
            ModelKind::Sis => "sis",
        }
    }

    fn compartments(&self) -> usize {
        match self {
            ModelKind::Sir => 3,
            ModelKind::Sis => 2,
        }
    }

    fn tracks_recovered(&self) -> bool {
        matches!(self, ModelKind::Sir)
    }

    fn derive_component(&self, index: usize, state: &[f64], params: &ModelParameters) -> f64 {
        let recovery = params.recovery_rate * state[1];
        match (self, index) {
            (ModelKind::Sir, 0) => -Self::incidence(state, params),
            (ModelKind::Sir, 1) => Self::incidence(state, params) - recovery,
            (ModelKind::Sir, 2) => recovery,
            (ModelKind::Sis, 0) => -Self::incidence(state, params) + recovery,
            (ModelKind::Sis, 1) => Self::incidence(state, params) - recovery,
            _ => panic!(
                "compartment index {index} out of range for {} model",
                self.name()
            ),
        }
    }

    fn initial_state(&self, params: &ModelParameters) -> State {
        match self {
            ModelKind::Sir => vec![
                params.total_population - params.initial_infected - params.initial_recovered,
                params.initial_infected,
                params.initial_recovered,
            ],
            ModelKind::Sis => vec![
                params.total_population - params.initial_infected,
                params.initial_infected,
            ],
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = EpiError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sir" => Ok(ModelKind::Sir),
            "sis" => Ok(ModelKind::Sis),
            other => Err(EpiError::InvalidConfig(format!(
                "unknown model '{other}', expected 'sir' or 'sis'"
            ))),
        }
    }
}

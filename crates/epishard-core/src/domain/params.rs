//! Model parameters shared by every model variant and strategy.

use serde::{Deserialize, Serialize};

use super::error::{EpiError, Result};

/// Immutable parameter record for one integration run.
///
/// `initial_recovered` is only meaningful for SIR; SIS ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    /// Total population N (> 0).
    pub total_population: f64,
    /// Transmission rate β (>= 0).
    pub transmission_rate: f64,
    /// Recovery rate γ (>= 0).
    pub recovery_rate: f64,
    /// Infected individuals at t = 0.
    pub initial_infected: f64,
    /// Recovered individuals at t = 0 (SIR only).
    pub initial_recovered: f64,
    /// Simulated time span (> 0).
    pub horizon: f64,
    /// Number of stored states, including the initial one (>= 2).
    pub step_count: u32,
}

impl ModelParameters {
    pub fn new(
        total_population: f64,
        transmission_rate: f64,
        recovery_rate: f64,
        initial_infected: f64,
        initial_recovered: f64,
        horizon: f64,
        step_count: u32,
    ) -> Self {
        Self {
            total_population,
            transmission_rate,
            recovery_rate,
            initial_infected,
            initial_recovered,
            horizon,
            step_count,
        }
    }

    /// Configuration used by the reference benchmarks: one million people,
    /// R0 = 2, ten index cases, 500 days resolved in 50 000 steps.
    pub fn reference() -> Self {
        Self::new(1_000_000.0, 0.2, 0.1, 10.0, 0.0, 500.0, 50_000)
    }

    pub fn with_transmission_rate(mut self, beta: f64) -> Self {
        self.transmission_rate = beta;
        self
    }

    pub fn with_recovery_rate(mut self, gamma: f64) -> Self {
        self.recovery_rate = gamma;
        self
    }

    pub fn with_step_count(mut self, step_count: u32) -> Self {
        self.step_count = step_count;
        self
    }

    pub fn with_horizon(mut self, horizon: f64) -> Self {
        self.horizon = horizon;
        self
    }

    /// h = horizon / (step_count - 1).
    pub fn step_size(&self) -> f64 {
        self.horizon / (self.step_count.saturating_sub(1).max(1)) as f64
    }

    /// Number of RK4 steps taken (one fewer than stored states).
    pub fn step_intervals(&self) -> usize {
        self.step_count.saturating_sub(1) as usize
    }

    /// Basic reproduction number β/γ (infinite when γ = 0).
    pub fn r0(&self) -> f64 {
        self.transmission_rate / self.recovery_rate
    }

    /// Validate the model-independent constraints.
    ///
    /// `include_recovered` selects whether `initial_recovered` counts towards
    /// the initial susceptible pool (SIR) or is ignored (SIS).
    pub fn validate(&self, include_recovered: bool) -> Result<()> {
        let fields = [
            ("total_population", self.total_population),
            ("transmission_rate", self.transmission_rate),
            ("recovery_rate", self.recovery_rate),
            ("initial_infected", self.initial_infected),
            ("initial_recovered", self.initial_recovered),
            ("horizon", self.horizon),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(EpiError::InvalidParameters(format!(
                    "{name} must be finite, got {value}"
                )));
            }
        }

        if self.total_population <= 0.0 {
            return Err(EpiError::InvalidParameters(format!(
                "total_population must be > 0, got {}",
                self.total_population
            )));
        }
        if self.step_count < 2 {
            return Err(EpiError::InvalidParameters(format!(
                "step_count must be >= 2, got {}",
                self.step_count
            )));
        }
        if self.horizon <= 0.0 {
            return Err(EpiError::InvalidParameters(format!(
                "horizon must be > 0, got {}",
                self.horizon
            )));
        }
        for (name, value) in [
            ("transmission_rate", self.transmission_rate),
            ("recovery_rate", self.recovery_rate),
            ("initial_infected", self.initial_infected),
            ("initial_recovered", self.initial_recovered),
        ] {
            if value < 0.0 {
                return Err(EpiError::InvalidParameters(format!(
                    "{name} must be >= 0, got {value}"
                )));
            }
        }

        let seeded = if include_recovered {
            self.initial_infected + self.initial_recovered
        } else {
            self.initial_infected
        };
        if seeded > self.total_population {
            return Err(EpiError::InvalidParameters(format!(
                "initial compartments ({seeded}) exceed total_population ({})",
                self.total_population
            )));
        }

        Ok(())
    }
}

//! Ensemble sharding: a parameter sweep where every scenario is an
//! independent integration.
//!
//! Scenario `i` of `n` sets the swept rate to `lo + (hi - lo)·i/(n - 1)`.
//! Each scenario reduces to its peak infected value (initial state
//! included); peaks are summed in scenario order, so the total does not
//! depend on how many workers ran them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::control::RunControl;
use crate::domain::error::{EpiError, Result};
use crate::domain::model::DerivativeModel;
use crate::domain::params::ModelParameters;
use crate::domain::report::{RunReport, StrategyKind};
use crate::pool::{join_units, WorkerPool};
use crate::reduce::ordered_sum;
use crate::solver::Rk4Solver;

use super::{dispatch, run_reported};

/// Parameter varied across scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepAxis {
    TransmissionRate,
    RecoveryRate,
}

impl fmt::Display for SweepAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepAxis::TransmissionRate => f.write_str("transmission_rate"),
            SweepAxis::RecoveryRate => f.write_str("recovery_rate"),
        }
    }
}

/// Closed interval `[lo, hi]` swept along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sweep {
    pub axis: SweepAxis,
    pub lo: f64,
    pub hi: f64,
}

impl Sweep {
    pub fn transmission(lo: f64, hi: f64) -> Self {
        Self {
            axis: SweepAxis::TransmissionRate,
            lo,
            hi,
        }
    }

    pub fn recovery(lo: f64, hi: f64) -> Self {
        Self {
            axis: SweepAxis::RecoveryRate,
            lo,
            hi,
        }
    }

    /// β swept over [0.1, 0.5], the benchmark scenario set.
    pub fn reference() -> Self {
        Self::transmission(0.1, 0.5)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.lo.is_finite() || !self.hi.is_finite() {
            return Err(EpiError::InvalidConfig(format!(
                "sweep bounds must be finite, got [{}, {}]",
                self.lo, self.hi
            )));
        }
        if self.lo < 0.0 || self.lo > self.hi {
            return Err(EpiError::InvalidConfig(format!(
                "sweep bounds must satisfy 0 <= lo <= hi, got [{}, {}]",
                self.lo, self.hi
            )));
        }
        Ok(())
    }

    /// Swept value of scenario `index` out of `count`. A single scenario
    /// uses `lo`.
    pub fn value_at(&self, index: usize, count: usize) -> f64 {
        if count <= 1 {
            return self.lo;
        }
        self.lo + (self.hi - self.lo) * index as f64 / (count - 1) as f64
    }

    pub fn scenario(&self, base: &ModelParameters, index: usize, count: usize) -> ModelParameters {
        let value = self.value_at(index, count);
        match self.axis {
            SweepAxis::TransmissionRate => base.with_transmission_rate(value),
            SweepAxis::RecoveryRate => base.with_recovery_rate(value),
        }
    }

    pub fn scenarios(&self, base: &ModelParameters, count: usize) -> Vec<ModelParameters> {
        (0..count).map(|i| self.scenario(base, i, count)).collect()
    }
}

/// Per-scenario peaks plus their ordered sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleSummary {
    pub peaks: Vec<f64>,
    pub total: f64,
}

impl EnsembleSummary {
    pub fn from_peaks(peaks: Vec<f64>) -> Self {
        let total = ordered_sum(&peaks);
        Self { peaks, total }
    }

    pub fn scenario_count(&self) -> usize {
        self.peaks.len()
    }

    /// Index and value of the worst scenario.
    pub fn max_peak(&self) -> Option<(usize, f64)> {
        self.peaks
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (i, v)| match best {
                Some((_, b)) if b >= v => best,
                _ => Some((i, v)),
            })
    }
}

pub struct EnsembleShardIntegrator;

impl EnsembleShardIntegrator {
    /// Validated scenario set for `count` scenarios.
    pub fn plan<M>(
        model: &M,
        base: &ModelParameters,
        sweep: &Sweep,
        count: usize,
    ) -> Result<Vec<ModelParameters>>
    where
        M: DerivativeModel + ?Sized,
    {
        if count == 0 {
            return Err(EpiError::InvalidConfig(
                "scenario count must be >= 1".to_string(),
            ));
        }
        sweep.validate()?;
        let scenarios = sweep.scenarios(base, count);
        for scenario in &scenarios {
            model.validate(scenario)?;
        }
        Ok(scenarios)
    }

    /// One pool unit per scenario; parallelism is the pool size.
    pub async fn integrate<M>(
        pool: &WorkerPool,
        model: &M,
        base: &ModelParameters,
        sweep: &Sweep,
        count: usize,
        control: &RunControl,
    ) -> Result<RunReport<EnsembleSummary>>
    where
        M: DerivativeModel + Clone + 'static,
    {
        let scenarios = Self::plan(model, base, sweep, count)?;

        run_reported(
            StrategyKind::Ensemble,
            model.name(),
            pool.size(),
            control,
            |armed| async move {
                let units = scenarios.into_iter().enumerate().map(|(index, p)| {
                    let model = model.clone();
                    let cancel = armed.cancel.clone();
                    let unit = move || Rk4Solver::peak_infected(&model, &p, &cancel);
                    (format!("scenario-{index}"), unit)
                });
                let handles = dispatch(pool, &armed, units)?;
                let peaks = join_units(handles, &armed).await?;
                Ok(EnsembleSummary::from_peaks(peaks))
            },
        )
        .await
    }

    /// Same scenarios run one after another on the calling task.
    pub async fn integrate_sequential<M>(
        model: &M,
        base: &ModelParameters,
        sweep: &Sweep,
        count: usize,
        control: &RunControl,
    ) -> Result<RunReport<EnsembleSummary>>
    where
        M: DerivativeModel + ?Sized,
    {
        let scenarios = Self::plan(model, base, sweep, count)?;

        run_reported(
            StrategyKind::EnsembleSequential,
            model.name(),
            1,
            control,
            |armed| async move {
                let mut peaks = Vec::with_capacity(scenarios.len());
                for p in &scenarios {
                    armed.check()?;
                    peaks.push(Rk4Solver::peak_infected(model, p, &armed.cancel)?);
                }
                Ok(EnsembleSummary::from_peaks(peaks))
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::ModelKind;

    #[test]
    fn test_reference_sweep_endpoints() {
        let sweep = Sweep::reference();
        assert_eq!(sweep.value_at(0, 5), 0.1);
        assert_eq!(sweep.value_at(4, 5), 0.5);
        assert!((sweep.value_at(2, 5) - 0.3).abs() < 1e-15);
    }

    #[test]
    fn test_single_scenario_uses_lo() {
        let sweep = Sweep::recovery(0.05, 0.4);
        let base = ModelParameters::reference();
        let scenarios = sweep.scenarios(&base, 1);
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].recovery_rate, 0.05);
        assert_eq!(scenarios[0].transmission_rate, base.transmission_rate);
    }

    #[test]
    fn test_bad_bounds_rejected() {
        assert!(Sweep::transmission(0.5, 0.1).validate().is_err());
        assert!(Sweep::transmission(-0.1, 0.1).validate().is_err());
        assert!(Sweep::transmission(0.1, f64::NAN).validate().is_err());
        assert!(Sweep::transmission(0.2, 0.2).validate().is_ok());
    }

    #[test]
    fn test_plan_rejects_zero_scenarios() {
        let base = ModelParameters::reference();
        assert!(matches!(
            EnsembleShardIntegrator::plan(&ModelKind::Sir, &base, &Sweep::reference(), 0),
            Err(EpiError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_summary_totals_and_max() {
        let summary = EnsembleSummary::from_peaks(vec![3.0, 9.0, 4.0]);
        assert_eq!(summary.total, 16.0);
        assert_eq!(summary.scenario_count(), 3);
        assert_eq!(summary.max_peak(), Some((1, 9.0)));
        assert_eq!(EnsembleSummary::from_peaks(Vec::new()).max_peak(), None);
    }

    #[test]
    fn test_axis_serializes_snake_case() {
        let json = serde_json::to_string(&Sweep::recovery(0.1, 0.2)).unwrap();
        assert!(json.contains("\"recovery_rate\""));
    }
}

//! Result envelope returned by every integration strategy.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which decomposition produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Sequential,
    PopulationShard,
    RhsShard,
    Ensemble,
    EnsembleSequential,
    Distributed,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Sequential => "sequential",
            StrategyKind::PopulationShard => "population_shard",
            StrategyKind::RhsShard => "rhs_shard",
            StrategyKind::Ensemble => "ensemble",
            StrategyKind::EnsembleSequential => "ensemble_sequential",
            StrategyKind::Distributed => "distributed",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successful strategy run: the value plus what a reporting layer needs
/// to record it (model, strategy, worker count, wall-clock time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport<T> {
    pub run_id: Uuid,
    pub strategy: StrategyKind,
    pub model: String,
    /// Decomposition factor in use (P, C, T or H).
    pub workers: usize,
    pub value: T,
    pub elapsed: Duration,
}

impl<T> RunReport<T> {
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1_000.0
    }

    pub fn into_value(self) -> T {
        self.value
    }

    /// Replace the value while keeping the run metadata.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RunReport<U> {
        RunReport {
            run_id: self.run_id,
            strategy: self.strategy,
            model: self.model,
            workers: self.workers,
            value: f(self.value),
            elapsed: self.elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_ms_and_map() {
        let report = RunReport {
            run_id: Uuid::new_v4(),
            strategy: StrategyKind::Ensemble,
            model: "sir".to_string(),
            workers: 4,
            value: 21.5_f64,
            elapsed: Duration::from_micros(2_500),
        };
        assert!((report.elapsed_ms() - 2.5).abs() < 1e-9);

        let mapped = report.map(|v| v * 2.0);
        assert_eq!(mapped.value, 43.0);
        assert_eq!(mapped.workers, 4);
        assert_eq!(mapped.strategy.to_string(), "ensemble");
    }

    #[test]
    fn test_strategy_serializes_snake_case() {
        let json = serde_json::to_string(&StrategyKind::PopulationShard).unwrap();
        assert_eq!(json, "\"population_shard\"");
    }
}

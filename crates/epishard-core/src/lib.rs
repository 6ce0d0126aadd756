//! EpiShard Core Library
//!
//! RK4 integration of SIR/SIS compartmental models plus three local
//! parallel decompositions (population, right-hand side, ensemble) running
//! on a caller-owned worker pool.

pub mod config;
pub mod control;
pub mod domain;
pub mod metrics;
pub mod obs;
pub mod partition;
pub mod pool;
pub mod reduce;
pub mod sharding;
pub mod solver;
pub mod telemetry;

pub use config::ExecutionConfig;
pub use control::{CancelToken, RunControl};
pub use domain::{
    DerivativeModel, EpiError, ModelKind, ModelParameters, Result, RunReport, State,
    StrategyKind, Trajectory,
};
pub use partition::{partition, ShardAssignment};
pub use pool::WorkerPool;
pub use reduce::{ordered_sum, sum_trajectories};
pub use sharding::{
    EnsembleShardIntegrator, EnsembleSummary, PopulationShardIntegrator, RhsShardIntegrator,
    SequentialIntegrator, Sweep, SweepAxis,
};
pub use solver::Rk4Solver;

/// Crate version, reported by the daemon at startup.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

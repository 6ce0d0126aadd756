//! Domain models for EpiShard.
//!
//! Canonical definitions for the core entities:
//! - `ModelParameters`: immutable run parameters
//! - `ModelKind` / `DerivativeModel`: model equations
//! - `State` / `Trajectory`: integration output
//! - `RunReport`: result plus timing returned by every strategy

pub mod error;
pub mod model;
pub mod params;
pub mod report;
pub mod trajectory;

pub use error::{EpiError, Result};
pub use model::{DerivativeModel, ModelKind};
pub use params::ModelParameters;
pub use report::{RunReport, StrategyKind};
pub use trajectory::{State, Trajectory};

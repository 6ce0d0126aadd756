//! Deterministic fan-in reductions.
//!
//! All reductions walk their inputs in index order so the result does not
//! depend on which worker finished first.

use crate::domain::error::{EpiError, Result};
use crate::domain::trajectory::Trajectory;

/// Elementwise sum of trajectories, accumulated in slice order.
///
/// All inputs must share length, compartment count and step size.
pub fn sum_trajectories(parts: &[Trajectory]) -> Result<Trajectory> {
    let Some(first) = parts.first() else {
        return Err(EpiError::InvalidConfig(
            "nothing to aggregate: zero trajectories".to_string(),
        ));
    };

    for (index, part) in parts.iter().enumerate().skip(1) {
        if part.len() != first.len() || part.compartments() != first.compartments() {
            return Err(EpiError::WorkerFailed {
                unit: format!("shard-{index}"),
                detail: format!(
                    "trajectory shape {}x{} does not match {}x{}",
                    part.len(),
                    part.compartments(),
                    first.len(),
                    first.compartments()
                ),
            });
        }
    }

    let mut rows = first.states().to_vec();
    for part in &parts[1..] {
        for (row, other) in rows.iter_mut().zip(part.states()) {
            for (acc, value) in row.iter_mut().zip(other) {
                *acc += *value;
            }
        }
    }
    Ok(Trajectory::new(first.step_size(), rows))
}

/// Ordered scalar sum.
pub fn ordered_sum(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |acc, v| acc + v)
}

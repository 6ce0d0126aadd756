//! Execution configuration for local strategies.

use serde::{Deserialize, Serialize};

use crate::domain::error::{EpiError, Result};

/// Worker pool sizing and default run deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Worker threads in the pool (>= 1).
    pub workers: usize,
    /// Optional wall-clock budget per strategy call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            deadline_ms: None,
        }
    }
}

impl ExecutionConfig {
    /// Defaults overridden by the environment.
    ///
    /// Reads:
    /// - EPISHARD_WORKERS (optional, default: available parallelism)
    /// - EPISHARD_DEADLINE_MS (optional, default: none)
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(workers) = env_number::<usize>("EPISHARD_WORKERS")? {
            config.workers = workers;
        }
        if let Some(deadline) = env_number::<u64>("EPISHARD_DEADLINE_MS")? {
            config.deadline_ms = Some(deadline);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(EpiError::InvalidConfig(
                "workers must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse an optional numeric environment variable.
pub fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| EpiError::InvalidConfig(format!("{key} is not a valid number: '{raw}'"))),
        Err(_) => Ok(None),
    }
}

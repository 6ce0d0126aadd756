//! Domain-level error taxonomy for EpiShard.

/// EpiShard integration errors.
///
/// Every strategy reports failure through this one type: a call either
/// returns a complete result or one of these, never a partially-filled
/// trajectory.
#[derive(Debug, thiserror::Error)]
pub enum EpiError {
    #[error("invalid model parameters: {0}")]
    InvalidParameters(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("worker unit {unit} failed: {detail}")]
    WorkerFailed { unit: String, detail: String },

    #[error("integration cancelled")]
    Cancelled,

    #[error("deadline of {limit_ms}ms exceeded")]
    DeadlineExceeded { limit_ms: u64 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EpiError {
    /// `true` for errors caused by the run control rather than by a unit.
    pub fn is_interruption(&self) -> bool {
        matches!(self, EpiError::Cancelled | EpiError::DeadlineExceeded { .. })
    }
}

/// Result type for EpiShard domain operations.
pub type Result<T> = std::result::Result<T, EpiError>;

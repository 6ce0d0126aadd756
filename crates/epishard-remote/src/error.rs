//! Error taxonomy for remote integration.

use std::net::SocketAddr;

use epishard_core::EpiError;

/// Failures of the distributed path.
///
/// Network and protocol failures get their own kinds so callers can tell a
/// dead host from a bad request or a crashed host task.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("endpoint not found: {0}")]
    EndpointNotFound(String),

    #[error("endpoint {endpoint} unreachable at {addr}: {source}")]
    Unreachable {
        endpoint: String,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} on endpoint {endpoint} timed out after {timeout_ms}ms")]
    Timeout {
        endpoint: String,
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("remote service error: {0}")]
    Service(String),

    #[error("host task {host} failed: {detail}")]
    HostFailed { host: String, detail: String },

    #[error(transparent)]
    Domain(#[from] EpiError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RemoteError {
    /// Configuration problem detected locally.
    pub fn config(message: impl Into<String>) -> Self {
        RemoteError::Domain(EpiError::InvalidConfig(message.into()))
    }
}

/// Result type for remote operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

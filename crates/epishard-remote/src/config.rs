//! Client and server settings for the remote protocol.

use std::time::Duration;

use epishard_core::config::env_number;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::DEFAULT_MAX_FRAME_BYTES;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub connect_timeout_ms: u64,
    /// Budget for one request/response exchange, compute included.
    pub call_timeout_ms: u64,
    pub max_frame_bytes: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            call_timeout_ms: 300_000,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl RemoteConfig {
    /// Defaults overridden by the environment.
    ///
    /// Reads:
    /// - EPISHARD_CONNECT_TIMEOUT_MS (optional, default: 5000)
    /// - EPISHARD_CALL_TIMEOUT_MS (optional, default: 300000)
    /// - EPISHARD_MAX_FRAME_BYTES (optional, default: 64 MiB)
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(ms) = env_number("EPISHARD_CONNECT_TIMEOUT_MS")? {
            config.connect_timeout_ms = ms;
        }
        if let Some(ms) = env_number("EPISHARD_CALL_TIMEOUT_MS")? {
            config.call_timeout_ms = ms;
        }
        if let Some(bytes) = env_number("EPISHARD_MAX_FRAME_BYTES")? {
            config.max_frame_bytes = bytes;
        }
        Ok(config)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

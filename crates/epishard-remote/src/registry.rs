//! Name-to-address lookup for integration endpoints.

use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{Arc, RwLock};

use crate::error::{RemoteError, Result};

/// Environment variable holding `name=host:port` pairs, comma separated.
pub const ENDPOINTS_ENV: &str = "EPISHARD_ENDPOINTS";

/// Prefix of the default endpoint names (`epishard_host0`, `epishard_host1`, ...).
pub const DEFAULT_ENDPOINT_PREFIX: &str = "epishard_host";

/// Conventional name of host `index`.
pub fn endpoint_name(prefix: &str, index: usize) -> String {
    format!("{prefix}{index}")
}

/// Shared flat registry. Clones see the same entries.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    entries: Arc<RwLock<HashMap<String, SocketAddr>>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`, replacing any previous address.
    pub fn bind(&self, name: impl Into<String>, addr: SocketAddr) {
        let name = name.into();
        let previous = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.clone(), addr);
        if let Some(old) = previous {
            tracing::debug!(endpoint = %name, old = %old, new = %addr, "endpoint rebound");
        }
    }

    pub fn unbind(&self, name: &str) -> Option<SocketAddr> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(name)
    }

    pub fn lookup(&self, name: &str) -> Result<SocketAddr> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .copied()
            .ok_or_else(|| RemoteError::EndpointNotFound(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parse `name=host:port,name=host:port`. Hostnames are resolved once,
    /// here; the first address wins.
    pub fn parse(spec: &str) -> Result<Self> {
        let registry = Self::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, target) = entry.split_once('=').ok_or_else(|| {
                RemoteError::config(format!("endpoint entry '{entry}' is not name=host:port"))
            })?;
            let (name, target) = (name.trim(), target.trim());
            if name.is_empty() {
                return Err(RemoteError::config(format!(
                    "endpoint entry '{entry}' has an empty name"
                )));
            }
            let addr = resolve(target)?;
            registry.bind(name, addr);
        }
        Ok(registry)
    }

    /// Registry from [`ENDPOINTS_ENV`]; empty when unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var(ENDPOINTS_ENV) {
            Ok(spec) => Self::parse(&spec),
            Err(_) => Ok(Self::new()),
        }
    }

    /// Inverse of [`EndpointRegistry::parse`], names sorted.
    pub fn to_spec_string(&self) -> String {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut pairs: Vec<String> = entries
            .iter()
            .map(|(name, addr)| format!("{name}={addr}"))
            .collect();
        pairs.sort();
        pairs.join(",")
    }
}

fn resolve(target: &str) -> Result<SocketAddr> {
    if let Ok(addr) = target.parse::<SocketAddr>() {
        return Ok(addr);
    }
    target
        .to_socket_addrs()
        .map_err(|e| RemoteError::config(format!("cannot resolve '{target}': {e}")))?
        .next()
        .ok_or_else(|| RemoteError::config(format!("'{target}' resolved to no address")))
}

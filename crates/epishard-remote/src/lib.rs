//! EpiShard Remote
//!
//! Distributed sharding: a stateless integration service behind a framed
//! TCP protocol, a name-to-address endpoint registry, and the orchestrator
//! that spreads an ensemble sweep across hosts.

pub mod client;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod service;

pub use client::{EndpointConnector, RemoteClient, TcpConnector};
pub use config::RemoteConfig;
pub use error::{RemoteError, Result};
pub use orchestrator::DistributedOrchestrator;
pub use protocol::{Request, Response, WireParameters, DEFAULT_MAX_FRAME_BYTES};
pub use registry::{endpoint_name, EndpointRegistry, DEFAULT_ENDPOINT_PREFIX, ENDPOINTS_ENV};
pub use server::{BoundServer, IntegrationServer};
pub use service::{IntegrationEndpoint, LocalIntegrationService, ServiceReply};

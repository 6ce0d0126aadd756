//! Client side: TCP connections to named endpoints.

use std::net::SocketAddr;

use async_trait::async_trait;
use epishard_core::metrics::METRICS;
use epishard_core::{ModelParameters, Trajectory};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::config::RemoteConfig;
use crate::error::{RemoteError, Result};
use crate::protocol::{read_frame, write_frame, Request, Response};
use crate::registry::EndpointRegistry;
use crate::service::{IntegrationEndpoint, ServiceReply};

/// One open connection to a remote integration service.
#[derive(Debug)]
pub struct RemoteClient {
    endpoint: String,
    addr: SocketAddr,
    stream: TcpStream,
    config: RemoteConfig,
}

impl RemoteClient {
    pub async fn connect(endpoint: &str, addr: SocketAddr, config: &RemoteConfig) -> Result<Self> {
        let stream = match timeout(config.connect_timeout(), TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(RemoteError::Unreachable {
                    endpoint: endpoint.to_string(),
                    addr,
                    source,
                })
            }
            Err(_) => {
                return Err(RemoteError::Timeout {
                    endpoint: endpoint.to_string(),
                    operation: "connect",
                    timeout_ms: config.connect_timeout_ms,
                })
            }
        };
        stream.set_nodelay(true)?;
        debug!(endpoint, addr = %addr, "connected");
        Ok(Self {
            endpoint: endpoint.to_string(),
            addr,
            stream,
            config: config.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// One request/response exchange under the call timeout.
    pub async fn call(&mut self, request: &Request) -> Result<Response> {
        let max = self.config.max_frame_bytes;
        let stream = &mut self.stream;
        let exchange = async move {
            write_frame(stream, request, max).await?;
            read_frame::<_, Response>(stream, max).await
        };

        let response = match timeout(self.config.call_timeout(), exchange).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                return Err(RemoteError::Timeout {
                    endpoint: self.endpoint.clone(),
                    operation: request.op(),
                    timeout_ms: self.config.call_timeout_ms,
                })
            }
        };
        METRICS.inc_remote_calls();

        match response {
            Some(Response::Error { message }) => Err(RemoteError::Service(message)),
            Some(response) => Ok(response),
            None => Err(RemoteError::Protocol(format!(
                "endpoint {} closed the connection mid-call",
                self.endpoint
            ))),
        }
    }
}

#[async_trait]
impl IntegrationEndpoint for RemoteClient {
    async fn integrate(&mut self, params: &ModelParameters) -> Result<ServiceReply<Trajectory>> {
        match self.call(&Request::integrate(params)?).await? {
            Response::Trajectory {
                rows,
                step_size,
                server_elapsed_ms,
            } => Ok(ServiceReply {
                value: Trajectory::new(step_size, rows),
                server_elapsed_ms,
            }),
            other => Err(unexpected("trajectory", &other)),
        }
    }

    async fn peak_infected(&mut self, params: &ModelParameters) -> Result<ServiceReply<f64>> {
        match self.call(&Request::peak_infected(params)?).await? {
            Response::Peak {
                value,
                server_elapsed_ms,
            } => Ok(ServiceReply {
                value,
                server_elapsed_ms,
            }),
            other => Err(unexpected("peak", &other)),
        }
    }
}

fn unexpected(wanted: &str, got: &Response) -> RemoteError {
    let status = match got {
        Response::Trajectory { .. } => "trajectory",
        Response::Peak { .. } => "peak",
        Response::Error { .. } => "error",
    };
    RemoteError::Protocol(format!("expected a {wanted} response, got {status}"))
}

/// Resolves an endpoint name into a live connection.
///
/// The orchestrator only talks to this seam; retries or pooling would live in
/// an implementation of it.
#[async_trait]
pub trait EndpointConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn IntegrationEndpoint>>;
}

/// Registry lookup followed by a TCP connect.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    registry: EndpointRegistry,
    config: RemoteConfig,
}

impl TcpConnector {
    pub fn new(registry: EndpointRegistry, config: RemoteConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }
}

#[async_trait]
impl EndpointConnector for TcpConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn IntegrationEndpoint>> {
        let addr = self.registry.lookup(endpoint)?;
        let client = RemoteClient::connect(endpoint, addr, &self.config).await?;
        Ok(Box::new(client))
    }
}

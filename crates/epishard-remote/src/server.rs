//! TCP front-end for [`LocalIntegrationService`].

use std::net::SocketAddr;
use std::sync::Arc;

use epishard_core::{DerivativeModel, ModelKind};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RemoteConfig;
use crate::error::{RemoteError, Result};
use crate::protocol::{read_frame, write_frame, Request, Response};
use crate::service::LocalIntegrationService;

/// Serves one model on one address.
pub struct IntegrationServer {
    service: Arc<LocalIntegrationService>,
    max_frame_bytes: usize,
}

impl IntegrationServer {
    pub fn new(model: ModelKind, config: &RemoteConfig) -> Self {
        Self {
            service: Arc::new(
                LocalIntegrationService::new(model).with_frame_limit(config.max_frame_bytes),
            ),
            max_frame_bytes: config.max_frame_bytes,
        }
    }

    /// Bind `addr` (port 0 picks a free port) and start accepting.
    pub async fn bind(self, addr: SocketAddr) -> Result<BoundServer> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        info!(
            addr = %local_addr,
            model = %self.service.model().name(),
            "integration server listening"
        );
        let task = tokio::spawn(self.accept_loop(listener, shutdown_rx));
        Ok(BoundServer {
            local_addr,
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    async fn accept_loop(self, listener: TcpListener, mut shutdown: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let service = Arc::clone(&self.service);
                        let max = self.max_frame_bytes;
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, service, max).await {
                                warn!(peer = %peer, error = %e, "connection closed with error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
            }
        }
        debug!("accept loop stopped");
    }
}

/// Request/response loop for one client connection.
async fn serve_connection(
    mut stream: TcpStream,
    service: Arc<LocalIntegrationService>,
    max_frame_bytes: usize,
) -> Result<()> {
    stream.set_nodelay(true)?;
    loop {
        let request: Request = match read_frame(&mut stream, max_frame_bytes).await {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(RemoteError::Protocol(message)) => {
                // Tell the client before hanging up; the stream may be out of
                // sync after a bad frame.
                let reply = Response::Error {
                    message: message.clone(),
                };
                let _ = write_frame(&mut stream, &reply, max_frame_bytes).await;
                return Err(RemoteError::Protocol(message));
            }
            Err(e) => return Err(e),
        };
        let op = request.op();
        let response = service.handle(request).await;
        match write_frame(&mut stream, &response, max_frame_bytes).await {
            Ok(()) => debug!(op, "request served"),
            // Nothing reached the socket, so the stream is still in sync.
            Err(RemoteError::Protocol(message)) => {
                warn!(op, error = %message, "response too large");
                write_frame(&mut stream, &Response::Error { message }, max_frame_bytes).await?;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Handle to a running server. Dropping it stops accepting new connections.
pub struct BoundServer {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl BoundServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and wait for the accept loop to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for BoundServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

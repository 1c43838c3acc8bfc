//! Fragment server.
//!
//! Serves fragments from a node's local registry to peers: one task per
//! connection, one request/response exchange per connection. Connection
//! tasks belong to the accept loop and stop with it.

use super::wire::{
    read_frame, write_frame, FragmentRequest, FragmentResponse, WireError, PROTOCOL_ID,
};
use crate::registry::FragmentRegistry;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};

/// Time a peer gets to send its request and receive the answer.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// TCP listener bound to a node's fragment registry.
pub struct FragmentServer {
    listener: TcpListener,
    registry: FragmentRegistry,
    request_timeout: Duration,
}

impl FragmentServer {
    /// Bind to `address` (use port 0 for an ephemeral port).
    pub async fn bind(address: &str, registry: FragmentRegistry) -> std::io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self {
            listener,
            registry,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Override the per-connection exchange timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the task is aborted.
    ///
    /// Aborting drops the connection set, which aborts every open exchange.
    pub async fn run(self) {
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let registry = self.registry.clone();
                        let timeout = self.request_timeout;
                        connections.spawn(async move {
                            let exchange = handle_connection(stream, &registry);
                            match tokio::time::timeout(timeout, exchange).await {
                                Ok(Ok(())) => {}
                                Ok(Err(error)) => {
                                    tracing::debug!(%peer, %error, "fragment request failed");
                                }
                                Err(_) => {
                                    tracing::debug!(%peer, ?timeout, "fragment request timed out");
                                }
                            }
                        });
                    }
                    Err(error) => {
                        tracing::warn!(%error, "accept failed");
                    }
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }
    }

    /// Run the accept loop in the background.
    pub fn spawn(self) -> std::io::Result<ServerHandle> {
        let address = self.local_addr()?;
        tracing::info!(%address, protocol = PROTOCOL_ID, "fragment server listening");
        let task = tokio::spawn(self.run());
        Ok(ServerHandle { address, task })
    }
}

/// Handle to a running fragment server. Stops the server when dropped.
pub struct ServerHandle {
    address: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Address peers should fetch from.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Stop accepting connections and drop open ones.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    registry: &FragmentRegistry,
) -> Result<(), WireError> {
    let request: FragmentRequest = read_frame(&mut stream).await?;
    let data = registry.data(&request.content_hash);

    tracing::debug!(
        hash = %request.content_hash.short(),
        found = data.is_some(),
        "serving fragment request"
    );

    let response = FragmentResponse {
        content_hash: request.content_hash,
        found: data.is_some(),
        data,
    };
    write_frame(&mut stream, &response).await
}

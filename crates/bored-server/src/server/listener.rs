//! Network listeners
//!
//! The HTTP listener serves health checks and WebSocket upgrades for agents
//! and clients. The optional TCP listener relays raw client sockets.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};

use bored_core::traits::{IoReader, IoWriter};

use super::router::router;
use crate::state::ServerState;

/// HTTP/WebSocket server
pub struct HttpServer {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl HttpServer {
    /// Bind the HTTP listener
    pub async fn bind(bind_addr: &str, state: Arc<ServerState>) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", bind_addr))?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the shutdown token is cancelled
    pub async fn run(self) -> Result<()> {
        tracing::info!("HTTP server listening on {}", self.local_addr()?);

        let shutdown = self.state.shutdown.clone();
        axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .context("HTTP server failed")?;

        tracing::info!("HTTP server shut down");
        Ok(())
    }
}

/// Raw TCP listener whose connections are relayed to agents as-is
pub struct ClientListener {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl ClientListener {
    /// Bind the client listener
    pub async fn bind(bind_addr: &str, state: Arc<ServerState>) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind client listener to {}", bind_addr))?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients until the shutdown token is cancelled
    pub async fn run(self) -> Result<()> {
        tracing::info!("Client listener on {}", self.local_addr()?);

        loop {
            tokio::select! {
                _ = self.state.shutdown.cancelled() => {
                    tracing::info!("Client listener shutting down");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((socket, peer_addr)) => self.handle_connection(socket, peer_addr),
                        Err(e) => {
                            tracing::error!("Failed to accept client connection: {}", e);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        tracing::debug!("Client connection from {}", peer_addr);

        if let Err(e) = socket.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
        }

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let (read, write) = socket.into_split();
            let reader = IoReader::new(read, state.config.relay.read_buffer_size);
            let writer = IoWriter::new(write);

            tokio::select! {
                _ = state.shutdown.cancelled() => {
                    tracing::debug!("Client relay cancelled for {}", peer_addr);
                }
                _ = state.relay.serve_client(reader, writer) => {
                    tracing::debug!("Client {} disconnected", peer_addr);
                }
            }
        });
    }
}

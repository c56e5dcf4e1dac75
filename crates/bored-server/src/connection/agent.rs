//! One connected agent and its lifecycle

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use bored_core::config::MuxConfig;
use bored_core::{AgentId, ConnectionState, Credential, StreamError};

use super::registry::AgentRegistry;
use crate::mux::{LogicalStream, Multiplexer, Role};
use crate::transport::Transport;

/// A remote endpoint that receives relayed client streams
pub struct Agent {
    id: AgentId,
    credential: Credential,
    mux: Multiplexer,
    connected_at: Instant,
    state: Mutex<ConnectionState>,
}

impl Agent {
    /// Create an agent in the `Connecting` state
    pub fn new(credential: Credential, mux: Multiplexer) -> Self {
        Self {
            id: AgentId::new(),
            credential,
            mux,
            connected_at: Instant::now(),
            state: Mutex::new(ConnectionState::Connecting),
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn multiplexer(&self) -> &Multiplexer {
        &self.mux
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn set_state(&self, state: ConnectionState) {
        let mut current = self.state.lock();
        tracing::trace!("{}: {} -> {}", self.id, *current, state);
        *current = state;
    }

    /// Whether the agent's transport is still up
    pub fn is_connected(&self) -> bool {
        !self.mux.is_closed()
    }

    /// Open a logical stream to this agent
    pub async fn open_stream(&self) -> Result<LogicalStream, StreamError> {
        self.mux.open_stream().await
    }
}

/// Drive one agent connection from registration to removal.
///
/// The agent is selectable while this future runs. It completes when the
/// transport ends or `shutdown` is cancelled, after the agent has been
/// unregistered.
pub async fn serve_agent(
    registry: Arc<AgentRegistry>,
    transport: Transport,
    credential: Credential,
    config: MuxConfig,
    shutdown: CancellationToken,
) -> AgentId {
    let mux = Multiplexer::new(transport, Role::Server, &config);
    let agent = Arc::new(Agent::new(credential, mux));
    let id = agent.id();

    registry.register(&agent);
    agent.set_state(ConnectionState::Open);
    tracing::info!(
        "Agent {} connected (credential: {}, {} online)",
        id,
        agent.credential(),
        registry.len()
    );

    tokio::select! {
        _ = agent.mux.closed() => {}
        _ = shutdown.cancelled() => {
            tracing::debug!("Closing agent {} for shutdown", id);
            agent.mux.close();
            agent.mux.closed().await;
        }
    }

    agent.set_state(ConnectionState::Closing);
    registry.unregister(id);
    agent.set_state(ConnectionState::Closed);

    tracing::info!(
        "Agent {} disconnected after {:?} ({} online)",
        id,
        agent.connected_at().elapsed(),
        registry.len()
    );
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_lifecycle_follows_transport() {
        let registry = Arc::new(AgentRegistry::new());
        let (near, far) = tokio::io::duplex(1024);

        let task = tokio::spawn(serve_agent(
            Arc::clone(&registry),
            Transport::framed(near, 8),
            Credential::from("key-1"),
            MuxConfig::default(),
            CancellationToken::new(),
        ));

        let agent = loop {
            if let Some(agent) = registry.select_random() {
                break agent;
            }
            tokio::task::yield_now().await;
        };
        assert_eq!(agent.state(), ConnectionState::Open);
        assert_eq!(agent.credential().as_str(), "key-1");

        drop(far);
        let id = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("agent task should finish")
            .unwrap();

        assert_eq!(id, agent.id());
        assert_eq!(agent.state(), ConnectionState::Closed);
        assert!(!agent.is_connected());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_closes_agent() {
        let registry = Arc::new(AgentRegistry::new());
        let (near, _far) = tokio::io::duplex(1024);
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(serve_agent(
            Arc::clone(&registry),
            Transport::framed(near, 8),
            Credential::default(),
            MuxConfig::default(),
            shutdown.clone(),
        ));

        while registry.is_empty() {
            tokio::task::yield_now().await;
        }
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("agent task should finish")
            .unwrap();
        assert!(registry.is_empty());
    }
}

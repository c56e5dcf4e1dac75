//! Shared server state

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use bored_core::config::ServerConfig;

use crate::connection::AgentRegistry;
use crate::relay::RelayCoordinator;

/// State shared by every listener and connection task
pub struct ServerState {
    /// Configuration
    pub config: ServerConfig,
    /// Online agents
    pub registry: Arc<AgentRegistry>,
    /// Client relaying
    pub relay: RelayCoordinator,
    /// Cancelled on graceful shutdown
    pub shutdown: CancellationToken,
}

impl ServerState {
    /// Create server state with an empty registry
    pub fn new(config: ServerConfig, shutdown: CancellationToken) -> Self {
        let registry = Arc::new(AgentRegistry::new());
        let relay = RelayCoordinator::new(Arc::clone(&registry), config.relay.clone());
        Self {
            config,
            registry,
            relay,
            shutdown,
        }
    }
}

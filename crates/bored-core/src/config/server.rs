//! Relay server configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Header carrying the agent's credential on connect
pub const DEFAULT_CREDENTIAL_HEADER: &str = "X-BoreD-PublicKey";

/// Configuration for the relay server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address for the HTTP/WebSocket listener (health, agent and client upgrades)
    pub bind_address: String,

    /// Optional address for a raw TCP client listener
    pub client_tcp_address: Option<String>,

    /// Bearer token agents must present; `None` accepts every agent
    pub agent_token: Option<String>,

    /// Request header whose value becomes the agent's credential
    pub credential_header: String,

    /// Client bridging settings
    pub relay: RelayConfig,

    /// Per-agent multiplexer settings
    pub mux: MuxConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            client_tcp_address: None,
            agent_token: None,
            credential_header: DEFAULT_CREDENTIAL_HEADER.to_string(),
            relay: RelayConfig::default(),
            mux: MuxConfig::default(),
        }
    }
}

/// Client bridging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Maximum bytes read from a client socket per chunk
    pub read_buffer_size: usize,

    /// How long the remaining direction may sit idle once the other one finished
    #[serde(with = "duration_secs")]
    pub half_close_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 16 * 1024,
            half_close_timeout: Duration::from_secs(30),
        }
    }
}

/// Stream multiplexer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// Frames queued for the transport writer before senders suspend
    pub outbound_queue: usize,

    /// Remote-opened streams waiting for `accept()` before new ones are refused
    pub accept_backlog: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            outbound_queue: 256,
            accept_backlog: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.credential_header, "X-BoreD-PublicKey");
        assert!(config.agent_token.is_none());
        assert!(config.client_tcp_address.is_none());
        assert_eq!(config.relay.half_close_timeout, Duration::from_secs(30));
        assert_eq!(config.mux.outbound_queue, 256);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
            bind_address = "127.0.0.1:9000"

            [relay]
            half_close_timeout = 5
        "#;

        let config: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.relay.half_close_timeout, Duration::from_secs(5));
        assert_eq!(config.relay.read_buffer_size, 16 * 1024);
        assert_eq!(config.mux.accept_backlog, 64);
    }
}

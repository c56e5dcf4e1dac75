//! Relay coordinator: pairs incoming clients with online agents

use std::sync::Arc;

use bored_core::config::RelayConfig;
use bored_core::traits::{ClientReader, ClientWriter};
use bored_core::{AgentId, RelayError};
use bored_protocol::StreamId;

use super::bridge::bridge;
use crate::connection::AgentRegistry;

/// Summary of a completed client relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub agent_id: AgentId,
    pub stream_id: StreamId,
    pub bytes_to_agent: u64,
    pub bytes_to_client: u64,
}

/// Bridges each client connection to a randomly chosen agent
pub struct RelayCoordinator {
    registry: Arc<AgentRegistry>,
    config: RelayConfig,
}

impl RelayCoordinator {
    pub fn new(registry: Arc<AgentRegistry>, config: RelayConfig) -> Self {
        Self { registry, config }
    }

    /// Relay one client until both directions end.
    ///
    /// Selection is single-shot: if the chosen agent cannot open a stream the
    /// client is dropped rather than retried elsewhere. The client is always
    /// shut down before an error is returned.
    pub async fn handle_client<R, W>(
        &self,
        mut reader: R,
        mut writer: W,
    ) -> Result<RelayOutcome, RelayError>
    where
        R: ClientReader,
        W: ClientWriter,
    {
        let Some(agent) = self.registry.select_random() else {
            tracing::warn!("No agents online, closing client request");
            shutdown_client(&mut writer).await;
            return Err(RelayError::NoAgentAvailable);
        };
        let agent_id = agent.id();

        let stream = match agent.open_stream().await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Agent {} could not open a stream: {}", agent_id, e);
                shutdown_client(&mut writer).await;
                return Err(e.into());
            }
        };
        drop(agent);

        let stream_id = stream.id();
        tracing::info!("Relaying client over {} on agent {}", stream_id, agent_id);

        let totals = bridge(&mut reader, &mut writer, stream, self.config.half_close_timeout).await?;

        Ok(RelayOutcome {
            agent_id,
            stream_id,
            bytes_to_agent: totals.to_agent,
            bytes_to_client: totals.to_client,
        })
    }

    /// [`handle_client`](Self::handle_client), logging the result
    pub async fn serve_client<R, W>(&self, reader: R, writer: W)
    where
        R: ClientReader,
        W: ClientWriter,
    {
        match self.handle_client(reader, writer).await {
            Ok(outcome) => {
                tracing::info!(
                    "Relay over {} on agent {} finished ({} bytes up, {} bytes down)",
                    outcome.stream_id,
                    outcome.agent_id,
                    outcome.bytes_to_agent,
                    outcome.bytes_to_client
                );
            }
            Err(RelayError::NoAgentAvailable) => {}
            Err(e) => {
                tracing::warn!("Relay failed: {}", e);
            }
        }
    }
}

async fn shutdown_client<W: ClientWriter>(writer: &mut W) {
    if let Err(e) = writer.shutdown().await {
        tracing::debug!("Failed to shut down rejected client: {}", e);
    }
}

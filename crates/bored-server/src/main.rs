//! BoreD relay server
//!
//! Accepts reverse connections from agents and relays client connections
//! to them over multiplexed streams.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bored_core::config::{self, ServerConfig};
use bored_server::server::{ClientListener, HttpServer};
use bored_server::ServerState;

#[derive(Parser)]
#[command(name = "bored-server")]
#[command(about = "BoreD reverse-tunnel relay server")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP/WebSocket bind address (overrides config)
    #[arg(short, long, env = "BORED_BIND")]
    bind: Option<String>,

    /// Raw TCP client listener address (overrides config)
    #[arg(long, env = "BORED_CLIENT_TCP")]
    client_tcp: Option<String>,

    /// Bearer token agents must present (overrides config)
    #[arg(long, env = "BORED_AGENT_TOKEN", hide_env_values = true)]
    agent_token: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("~~ BoreD v{} ~~", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_config_path();
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                ServerConfig::default()
            })
        } else {
            tracing::info!("Using default configuration");
            ServerConfig::default()
        }
    };

    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(client_tcp) = args.client_tcp {
        config.client_tcp_address = Some(client_tcp);
    }
    if let Some(token) = args.agent_token {
        config.agent_token = Some(token);
    }

    if config.agent_token.is_none() {
        tracing::warn!("No agent token configured - any agent may connect");
    }

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Setup signal handlers
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    let state = Arc::new(ServerState::new(config.clone(), cancel.clone()));

    let http = HttpServer::bind(&config.bind_address, Arc::clone(&state)).await?;

    let client_listener = match &config.client_tcp_address {
        Some(addr) => Some(ClientListener::bind(addr, Arc::clone(&state)).await?),
        None => None,
    };

    match client_listener {
        Some(listener) => {
            // Either listener failing stops the other
            let (http_result, client_result) = tokio::join!(
                async {
                    let result = http.run().await;
                    cancel.cancel();
                    result
                },
                async {
                    let result = listener.run().await;
                    cancel.cancel();
                    result
                }
            );
            http_result?;
            client_result?;
        }
        None => http.run().await?,
    }

    tracing::info!("BoreD shutdown complete");
    Ok(())
}

//! Core error types for BoreD

use bored_protocol::{ProtocolError, StreamId};
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by a physical agent connection.
///
/// Every variant is terminal: once a transport reports an error it delivers
/// no further frames.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The connection ended or was closed locally
    #[error("Transport closed")]
    Closed,

    /// Peer sent bytes that do not form a valid frame
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    /// WebSocket layer failure
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors on a logical stream or its multiplexer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The multiplexer's transport has already been torn down
    #[error("Multiplexer closed")]
    MultiplexerClosed,

    /// Operation on a stream whose direction is already closed
    #[error("Stream closed: {0}")]
    StreamClosed(StreamId),

    /// The transport failed while the stream was open
    #[error("Connection lost")]
    ConnectionLost,

    /// Every stream id in this side's range has been used
    #[error("Stream ids exhausted")]
    StreamIdsExhausted,

    /// The peer aborted the stream with an `Error` frame
    #[error("Stream {stream_id} reset by peer: {reason}")]
    Reset { stream_id: StreamId, reason: String },
}

/// Errors terminating a client relay
#[derive(Error, Debug)]
pub enum RelayError {
    /// Registry was empty at selection time
    #[error("No agent available")]
    NoAgentAvailable,

    /// Opening or using the logical stream failed
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Client socket failure
    #[error("Client I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// One direction finished and the other did not within the linger period
    #[error("Half-closed relay timed out")]
    HalfCloseTimeout,
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

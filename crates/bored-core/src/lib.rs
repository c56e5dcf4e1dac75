//! bored-core: Core abstractions and configuration for BoreD
//!
//! This crate provides the configuration structures, error taxonomy, shared
//! identity types and client connection traits used by the relay server.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{ConfigError, RelayError, StreamError, TransportError};
pub use types::{AgentId, ConnectionState, Credential};

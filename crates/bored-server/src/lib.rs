//! bored-server: reverse-tunnel relay
//!
//! Agents connect out to the relay and keep one multiplexed connection open.
//! Each client that connects to the relay is bridged to a logical stream on
//! a randomly chosen agent's connection. The relay never looks inside the
//! relayed bytes.

pub mod connection;
pub mod mux;
pub mod relay;
pub mod server;
pub mod state;
pub mod transport;

pub use connection::{Agent, AgentRegistry};
pub use mux::{LogicalStream, Multiplexer, Role};
pub use relay::{RelayCoordinator, RelayOutcome};
pub use state::ServerState;
pub use transport::Transport;

//! Agent connections and the registry of online agents

mod agent;
mod registry;

pub use agent::{serve_agent, Agent};
pub use registry::AgentRegistry;

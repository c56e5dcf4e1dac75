//! Core domain types

use std::fmt;
use uuid::Uuid;

/// Unique identifier for one agent connection.
///
/// Two connections presenting the same credential are still distinct agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgentId(Uuid);

impl AgentId {
    /// Allocate a fresh agent ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent-{}", self.0.simple())
    }
}

/// Opaque credential presented by an agent at connect time.
///
/// The relay never interprets it; it is kept as an identity tag. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    /// Create a credential from a header value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the raw credential string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether no credential was presented
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<none>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for Credential {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle of one agent connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport and multiplexer are being set up
    Connecting,
    /// Registered and selectable
    Open,
    /// Transport ended; leaving the registry
    Closing,
    /// Fully torn down
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closing => write!(f, "closing"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_ids_are_unique() {
        let a = AgentId::new();
        let b = AgentId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("agent-"));
    }

    #[test]
    fn test_empty_credential_display() {
        assert_eq!(Credential::default().to_string(), "<none>");
        assert_eq!(Credential::from("abc").to_string(), "abc");
        assert!(Credential::new("").is_empty());
    }
}

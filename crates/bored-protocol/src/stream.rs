//! Logical stream identifier type

use std::fmt;

/// Identifier of one logical stream on a multiplexed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(pub u32);

impl StreamId {
    /// Reserved id; never allocated to a stream
    pub const RESERVED: StreamId = StreamId(0);

    /// Create a new stream ID
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Whether this id falls in the server-allocated (odd) range
    pub fn is_server_initiated(&self) -> bool {
        self.0 % 2 == 1
    }

    /// Whether this id falls in the agent-allocated (even, non-zero) range
    pub fn is_agent_initiated(&self) -> bool {
        self.0 != 0 && self.0 % 2 == 0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

impl From<u32> for StreamId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

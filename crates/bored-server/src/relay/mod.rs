//! Client relaying

mod bridge;
mod coordinator;

pub use bridge::{bridge, BridgeTotals};
pub use coordinator::{RelayCoordinator, RelayOutcome};

//! Stream multiplexing over a single agent transport

mod multiplexer;
mod stream;

pub use multiplexer::{Multiplexer, Role};
pub use stream::{LogicalStream, StreamReader, StreamState, StreamWriter};

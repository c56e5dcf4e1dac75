//! bored-protocol: Wire protocol for BoreD stream multiplexing
//!
//! This crate defines the binary framing used between the relay server and
//! its agents. Many logical byte streams share one physical connection; each
//! frame names the stream it belongs to.

pub mod codec;
pub mod error;
pub mod frame;
pub mod kind;
pub mod stream;

pub use codec::{Frame, FrameCodec};
pub use error::ProtocolError;
pub use frame::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use kind::FrameKind;
pub use stream::StreamId;

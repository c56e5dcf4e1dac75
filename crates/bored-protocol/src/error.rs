//! Protocol error types

use thiserror::Error;

/// Errors that can occur while encoding or decoding frames
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Unknown frame kind byte
    #[error("Unknown frame kind: {0:#04x}")]
    UnknownFrameKind(u8),

    /// Payload exceeds maximum size
    #[error("Payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Stream id 0 is reserved and must not appear on the wire
    #[error("Reserved stream id 0 used for {0} frame")]
    ReservedStreamId(crate::FrameKind),

    /// A message-framed link delivered a partial or oversized frame
    #[error("Incomplete frame: expected {expected} bytes, got {actual}")]
    IncompleteFrame { expected: usize, actual: usize },

    /// Error frame reason was not valid UTF-8
    #[error("Error frame reason is not valid UTF-8")]
    InvalidReason,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

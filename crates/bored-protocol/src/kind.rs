//! Frame kinds for the BoreD protocol
//!
//! # Stream Flow
//!
//! 1. The opening side sends `Open` and may immediately follow it with `Data`
//!    without waiting for any acknowledgment.
//! 2. `Data` frames flow in both directions.
//! 3. Each side sends `Close` once it has nothing more to write. A stream is
//!    finished once both sides have sent `Close`.
//! 4. `Error` aborts the stream in both directions; its payload is a UTF-8
//!    reason string.

use std::fmt;

/// Frame kind identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// Open a new logical stream
    Open = 0x01,
    /// Stream payload bytes
    Data = 0x02,
    /// Sender has finished writing on this stream
    Close = 0x03,
    /// Abort the stream
    Error = 0x04,
}

impl FrameKind {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Open),
            0x02 => Some(Self::Data),
            0x03 => Some(Self::Close),
            0x04 => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Data => "data",
            Self::Close => "close",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_byte_mapping() {
        for kind in [FrameKind::Open, FrameKind::Data, FrameKind::Close, FrameKind::Error] {
            assert_eq!(FrameKind::from_u8(kind.as_u8()), Some(kind));
        }
        assert_eq!(FrameKind::from_u8(0x00), None);
        assert_eq!(FrameKind::from_u8(0xFF), None);
    }
}

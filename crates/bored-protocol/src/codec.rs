//! Tokio codec for framed protocol messages

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::kind::FrameKind;
use crate::stream::StreamId;

/// A complete frame with header and payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Stream ID this frame belongs to
    pub stream_id: StreamId,
    /// Frame kind
    pub kind: FrameKind,
    /// Raw payload
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame
    pub fn new(stream_id: StreamId, kind: FrameKind, payload: Bytes) -> Self {
        Self {
            stream_id,
            kind,
            payload,
        }
    }

    /// `Open` frame for a new stream
    pub fn open(stream_id: StreamId) -> Self {
        Self::new(stream_id, FrameKind::Open, Bytes::new())
    }

    /// `Data` frame carrying stream bytes
    pub fn data(stream_id: StreamId, payload: Bytes) -> Self {
        Self::new(stream_id, FrameKind::Data, payload)
    }

    /// `Close` frame: the sender will write nothing more on this stream
    pub fn close(stream_id: StreamId) -> Self {
        Self::new(stream_id, FrameKind::Close, Bytes::new())
    }

    /// `Error` frame aborting the stream with a reason
    pub fn error(stream_id: StreamId, reason: impl Into<String>) -> Self {
        Self::new(stream_id, FrameKind::Error, Bytes::from(reason.into()))
    }

    /// Reason carried by an `Error` frame
    pub fn reason(&self) -> Result<&str, ProtocolError> {
        std::str::from_utf8(&self.payload).map_err(|_| ProtocolError::InvalidReason)
    }

    /// Encode this frame as one contiguous buffer (used for message-based links)
    pub fn to_bytes(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        FrameCodec::new().encode(self.clone(), &mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode a buffer that must hold exactly one whole frame
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut buf = BytesMut::from(data);
        let header = FrameHeader::decode(&mut buf)?.ok_or(ProtocolError::IncompleteFrame {
            expected: HEADER_SIZE,
            actual: data.len(),
        })?;

        let expected = HEADER_SIZE + header.payload_length as usize;
        if data.len() != expected {
            return Err(ProtocolError::IncompleteFrame {
                expected,
                actual: data.len(),
            });
        }

        Ok(Frame {
            stream_id: header.stream_id,
            kind: header.kind,
            payload: buf.freeze(),
        })
    }
}

/// Codec for encoding/decoding protocol frames
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Current header being decoded (if any)
    pending_header: Option<FrameHeader>,
}

impl FrameCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            pending_header: None,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => match FrameHeader::decode(src)? {
                Some(h) => h,
                None => return Ok(None),
            },
        };

        let payload_len = header.payload_length as usize;
        if src.len() < payload_len {
            // Save header and wait for more data
            src.reserve(payload_len - src.len());
            self.pending_header = Some(header);
            return Ok(None);
        }

        let payload = src.split_to(payload_len).freeze();

        Ok(Some(Frame {
            stream_id: header.stream_id,
            kind: header.kind,
            payload,
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload_len = frame.payload.len();
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let header = FrameHeader::new(frame.stream_id, frame.kind, payload_len as u32);
        header.encode(dst);
        dst.extend_from_slice(&frame.payload);

        Ok(())
    }
}

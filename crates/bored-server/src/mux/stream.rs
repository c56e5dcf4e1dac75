//! Logical streams carried by a [`Multiplexer`](super::Multiplexer)

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use bored_core::StreamError;
use bored_protocol::{Frame, StreamId, MAX_PAYLOAD_SIZE};

use super::multiplexer::Shared;

/// State of one logical stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Opened locally, nothing heard from the peer yet
    Opening,
    /// Both directions open
    Open,
    /// We sent `Close`; the peer may still send
    HalfClosedLocal,
    /// The peer sent `Close`; we may still send
    HalfClosedRemote,
    /// Both directions finished, or the stream failed
    Closed,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamState::Opening => write!(f, "opening"),
            StreamState::Open => write!(f, "open"),
            StreamState::HalfClosedLocal => write!(f, "half-closed (local)"),
            StreamState::HalfClosedRemote => write!(f, "half-closed (remote)"),
            StreamState::Closed => write!(f, "closed"),
        }
    }
}

type Inbound = Result<Bytes, StreamError>;

/// Stream table entry, shared by the dispatch loop and the stream handle
pub(crate) struct StreamSlot {
    id: StreamId,
    inner: Mutex<SlotInner>,
}

struct SlotInner {
    state: StreamState,
    /// Set when the stream was closed by an error rather than two FINs
    error: Option<StreamError>,
    /// Dropped once the read side has delivered EOF or an error
    inbound: Option<mpsc::UnboundedSender<Inbound>>,
}

impl StreamSlot {
    /// Create a slot and the receiver its reader drains
    pub(crate) fn new(id: StreamId, state: StreamState) -> (Arc<Self>, mpsc::UnboundedReceiver<Inbound>) {
        // Unbounded: the dispatch loop must never wait on a slow reader
        let (tx, rx) = mpsc::unbounded_channel();
        let slot = Arc::new(Self {
            id,
            inner: Mutex::new(SlotInner {
                state,
                error: None,
                inbound: Some(tx),
            }),
        });
        (slot, rx)
    }

    pub(crate) fn id(&self) -> StreamId {
        self.id
    }

    pub(crate) fn state(&self) -> StreamState {
        self.inner.lock().state
    }

    /// Queue bytes from the peer. Returns false if the read side is already closed.
    pub(crate) fn on_data(&self, data: Bytes) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            StreamState::Opening => inner.state = StreamState::Open,
            StreamState::Open | StreamState::HalfClosedLocal => {}
            StreamState::HalfClosedRemote | StreamState::Closed => return false,
        }
        match &inner.inbound {
            // A dropped reader just discards
            Some(tx) => {
                let _ = tx.send(Ok(data));
                true
            }
            None => false,
        }
    }

    /// The peer finished its direction
    pub(crate) fn on_remote_close(&self) {
        let mut inner = self.inner.lock();
        inner.state = match inner.state {
            StreamState::Opening | StreamState::Open => StreamState::HalfClosedRemote,
            StreamState::HalfClosedLocal => StreamState::Closed,
            other => other,
        };
        inner.inbound = None;
    }

    /// Fail the stream. The first error wins; later ones are ignored.
    pub(crate) fn on_error(&self, error: StreamError) {
        let mut inner = self.inner.lock();
        if inner.state == StreamState::Closed {
            return;
        }
        inner.state = StreamState::Closed;
        if let Some(tx) = inner.inbound.take() {
            let _ = tx.send(Err(error.clone()));
        }
        inner.error = Some(error);
    }

    fn check_writable(&self) -> Result<(), StreamError> {
        let inner = self.inner.lock();
        match inner.state {
            StreamState::Opening | StreamState::Open | StreamState::HalfClosedRemote => Ok(()),
            StreamState::HalfClosedLocal => Err(StreamError::StreamClosed(self.id)),
            StreamState::Closed => Err(inner
                .error
                .clone()
                .unwrap_or(StreamError::StreamClosed(self.id))),
        }
    }

    /// Finish our direction. Returns true if a `Close` frame must be sent.
    fn local_close(&self) -> bool {
        let mut inner = self.inner.lock();
        let next = match inner.state {
            StreamState::Opening | StreamState::Open => StreamState::HalfClosedLocal,
            StreamState::HalfClosedRemote => StreamState::Closed,
            StreamState::HalfClosedLocal | StreamState::Closed => return false,
        };
        inner.state = next;
        true
    }

    /// Mark the stream abandoned by its owner. Returns true if it had not
    /// finished cleanly, in which case the peer must be told.
    pub(crate) fn abandon(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.inbound = None;
        if inner.state == StreamState::Closed {
            return false;
        }
        inner.state = StreamState::Closed;
        inner.error = Some(StreamError::StreamClosed(self.id));
        true
    }
}

/// Keeps the stream registered until both halves are gone
struct StreamHandle {
    slot: Arc<StreamSlot>,
    mux: Arc<Shared>,
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.mux.release(&self.slot);
    }
}

/// A bidirectional byte stream multiplexed over an agent connection.
///
/// Dropping it (or both of its halves) releases the stream.
pub struct LogicalStream {
    reader: StreamReader,
    writer: StreamWriter,
}

impl LogicalStream {
    pub(crate) fn new(
        slot: Arc<StreamSlot>,
        inbound: mpsc::UnboundedReceiver<Inbound>,
        mux: Arc<Shared>,
    ) -> Self {
        let handle = Arc::new(StreamHandle { slot, mux });
        Self {
            reader: StreamReader {
                handle: Arc::clone(&handle),
                inbound,
            },
            writer: StreamWriter { handle },
        }
    }

    /// Stream identifier
    pub fn id(&self) -> StreamId {
        self.writer.id()
    }

    /// Current state
    pub fn state(&self) -> StreamState {
        self.writer.handle.slot.state()
    }

    /// See [`StreamReader::read`]
    pub async fn read(&mut self) -> Result<Option<Bytes>, StreamError> {
        self.reader.read().await
    }

    /// See [`StreamWriter::write`]
    pub async fn write(&mut self, data: Bytes) -> Result<(), StreamError> {
        self.writer.write(data).await
    }

    /// See [`StreamWriter::shutdown`]
    pub async fn shutdown(&mut self) -> Result<(), StreamError> {
        self.writer.shutdown().await
    }

    /// Split into independently owned halves
    pub fn split(self) -> (StreamReader, StreamWriter) {
        (self.reader, self.writer)
    }
}

impl fmt::Debug for LogicalStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalStream")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

/// Read half of a [`LogicalStream`]
pub struct StreamReader {
    handle: Arc<StreamHandle>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

impl StreamReader {
    /// Stream identifier
    pub fn id(&self) -> StreamId {
        self.handle.slot.id()
    }

    /// Next chunk from the peer.
    ///
    /// Returns `Ok(None)` at end of stream. Buffered data is always delivered
    /// before EOF or an error; after an error has been returned once, reads
    /// report EOF.
    pub async fn read(&mut self) -> Result<Option<Bytes>, StreamError> {
        match self.inbound.recv().await {
            Some(Ok(data)) => Ok(Some(data)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// Write half of a [`LogicalStream`]
pub struct StreamWriter {
    handle: Arc<StreamHandle>,
}

impl StreamWriter {
    /// Stream identifier
    pub fn id(&self) -> StreamId {
        self.handle.slot.id()
    }

    /// Send bytes to the peer, split into `Data` frames as needed.
    ///
    /// Waits while the transport is backpressured.
    pub async fn write(&mut self, mut data: Bytes) -> Result<(), StreamError> {
        let slot = &self.handle.slot;
        slot.check_writable()?;

        while !data.is_empty() {
            let chunk = data.split_to(data.len().min(MAX_PAYLOAD_SIZE));
            slot.check_writable()?;
            self.handle
                .mux
                .send(Frame::data(slot.id(), chunk))
                .await
                .map_err(|_| StreamError::ConnectionLost)?;
        }

        Ok(())
    }

    /// Tell the peer nothing more will be written. Idempotent.
    pub async fn shutdown(&mut self) -> Result<(), StreamError> {
        let slot = &self.handle.slot;
        if !slot.local_close() {
            return Ok(());
        }

        tracing::debug!("Closing write side of {}", slot.id());
        self.handle
            .mux
            .send(Frame::close(slot.id()))
            .await
            .map_err(|_| StreamError::ConnectionLost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(state: StreamState) -> (Arc<StreamSlot>, mpsc::UnboundedReceiver<Inbound>) {
        StreamSlot::new(StreamId::new(1), state)
    }

    #[test]
    fn test_fin_in_both_directions_closes_cleanly() {
        let (slot, mut rx) = slot(StreamState::Opening);

        assert!(slot.on_data(Bytes::from_static(b"x")));
        assert_eq!(slot.state(), StreamState::Open);

        assert!(slot.local_close());
        assert!(!slot.local_close());
        assert_eq!(slot.state(), StreamState::HalfClosedLocal);
        assert_eq!(slot.check_writable(), Err(StreamError::StreamClosed(StreamId::new(1))));

        slot.on_remote_close();
        assert_eq!(slot.state(), StreamState::Closed);
        assert!(!slot.abandon());

        assert_eq!(rx.try_recv().unwrap(), Ok(Bytes::from_static(b"x")));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_data_after_remote_close_is_dropped() {
        let (slot, mut rx) = slot(StreamState::Open);

        slot.on_remote_close();
        assert!(!slot.on_data(Bytes::from_static(b"late")));
        assert!(slot.check_writable().is_ok());
        assert!(matches!(rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));
    }

    #[test]
    fn test_first_error_wins() {
        let (slot, mut rx) = slot(StreamState::Open);

        slot.on_error(StreamError::ConnectionLost);
        slot.on_error(StreamError::MultiplexerClosed);

        assert_eq!(slot.state(), StreamState::Closed);
        assert_eq!(slot.check_writable(), Err(StreamError::ConnectionLost));
        assert_eq!(rx.try_recv().unwrap(), Err(StreamError::ConnectionLost));
        assert!(matches!(rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));
    }

    #[test]
    fn test_abandon_open_stream_needs_reset() {
        let (slot, _rx) = slot(StreamState::HalfClosedRemote);
        assert!(slot.abandon());
        assert!(!slot.abandon());
    }
}

//! Transport adapter: discrete frames over one physical agent connection
//!
//! A [`Transport`] owns a single writer task that drains a bounded queue into
//! the underlying sink, so frames from concurrent senders are never
//! interleaved and a slow link suspends senders instead of growing memory.
//! Closing is driven by one `CancellationToken` shared by both halves: any
//! write failure, read failure, remote close or explicit [`FrameSender::close`]
//! cancels it, and everything waiting on the connection wakes up.

use std::time::Duration;

use futures::stream::BoxStream;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use bored_core::TransportError;
use bored_protocol::{Frame, FrameCodec};

/// How long the writer task waits for the sink to flush and close on shutdown
const SINK_CLOSE_GRACE: Duration = Duration::from_secs(5);

/// A frame-oriented physical connection, split into its two halves
pub struct Transport {
    sender: FrameSender,
    receiver: FrameReceiver,
}

impl Transport {
    /// Build a transport from a frame sink and a frame stream.
    ///
    /// `queue` bounds the number of frames waiting for the writer task.
    /// Must be called from within a tokio runtime.
    pub fn new<Si, St, SiE, StE>(sink: Si, stream: St, queue: usize) -> Self
    where
        Si: Sink<Frame, Error = SiE> + Send + Unpin + 'static,
        SiE: Into<TransportError> + 'static,
        St: Stream<Item = Result<Frame, StE>> + Send + 'static,
        StE: Into<TransportError>,
    {
        let closed = CancellationToken::new();
        let (tx, rx) = mpsc::channel(queue.max(1));

        tokio::spawn(write_loop(sink, rx, closed.clone()));

        let frames: BoxStream<'static, Result<Frame, TransportError>> =
            stream.map(|item| item.map_err(Into::into)).boxed();

        Self {
            sender: FrameSender {
                tx,
                closed: closed.clone(),
            },
            receiver: FrameReceiver {
                frames,
                closed,
            },
        }
    }

    /// Frames concatenated on a raw byte stream
    pub fn framed<T>(io: T, queue: usize) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (sink, stream) = Framed::new(io, FrameCodec::new()).split();
        Self::new(sink, stream, queue)
    }

    /// Split into the sending and receiving halves
    pub fn split(self) -> (FrameSender, FrameReceiver) {
        (self.sender, self.receiver)
    }
}

/// Sending half of a [`Transport`]; cheap to clone
#[derive(Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<Frame>,
    closed: CancellationToken,
}

impl FrameSender {
    /// Queue one frame for the writer task, waiting if the queue is full
    pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(TransportError::Closed),
            result = self.tx.send(frame) => result.map_err(|_| TransportError::Closed),
        }
    }

    /// Queue one frame without waiting. Returns false if it could not be queued.
    pub fn try_send(&self, frame: Frame) -> bool {
        !self.closed.is_cancelled() && self.tx.try_send(frame).is_ok()
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether the connection has been closed for any reason
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// Receiving half of a [`Transport`]
pub struct FrameReceiver {
    frames: BoxStream<'static, Result<Frame, TransportError>>,
    closed: CancellationToken,
}

impl FrameReceiver {
    /// Next frame in arrival order.
    ///
    /// Any error is terminal: the connection is closed and every later call
    /// returns [`TransportError::Closed`].
    pub async fn receive(&mut self) -> Result<Frame, TransportError> {
        let next = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Err(TransportError::Closed),
            next = self.frames.next() => next,
        };

        match next {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(e)) => {
                self.closed.cancel();
                Err(e)
            }
            None => {
                self.closed.cancel();
                Err(TransportError::Closed)
            }
        }
    }
}

async fn write_loop<Si, SiE>(mut sink: Si, mut rx: mpsc::Receiver<Frame>, closed: CancellationToken)
where
    Si: Sink<Frame, Error = SiE> + Unpin,
    SiE: Into<TransportError>,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let result = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            result = sink.send(frame) => result,
        };

        if let Err(e) = result {
            let e: TransportError = e.into();
            tracing::debug!("Transport write failed: {}", e);
            break;
        }
    }

    closed.cancel();
    rx.close();
    let _ = tokio::time::timeout(SINK_CLOSE_GRACE, sink.close()).await;
    tracing::trace!("Transport writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use bored_protocol::StreamId;
    use bytes::Bytes;

    fn pair() -> (Transport, Transport) {
        let (a, b) = tokio::io::duplex(4096);
        (Transport::framed(a, 16), Transport::framed(b, 16))
    }

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let (left, right) = pair();
        let (tx, _rx) = left.split();
        let (_tx, mut rx) = right.split();

        for i in 0..10u8 {
            tx.send(Frame::data(StreamId::new(1), Bytes::from(vec![i])))
                .await
                .unwrap();
        }

        for i in 0..10u8 {
            let frame = rx.receive().await.unwrap();
            assert_eq!(frame.payload.as_ref(), &[i]);
        }
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_terminal() {
        let (left, _right) = pair();
        let (tx, mut rx) = left.split();

        tx.close();
        tx.close();
        assert!(tx.is_closed());

        assert!(matches!(rx.receive().await, Err(TransportError::Closed)));
        assert!(matches!(rx.receive().await, Err(TransportError::Closed)));
        assert!(matches!(
            tx.send(Frame::open(StreamId::new(1))).await,
            Err(TransportError::Closed)
        ));
        assert!(!tx.try_send(Frame::open(StreamId::new(1))));
    }

    #[tokio::test]
    async fn test_remote_close_surfaces_as_closed() {
        let (left, right) = pair();
        let (_tx, mut rx) = left.split();

        drop(right);

        let result = tokio::time::timeout(Duration::from_secs(1), rx.receive())
            .await
            .expect("receive should not hang");
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_garbage_is_a_protocol_error() {
        use tokio::io::AsyncWriteExt;

        let (a, mut b) = tokio::io::duplex(64);
        let (tx, mut rx) = Transport::framed(a, 4).split();

        b.write_all(&[0, 0, 0, 1, 0xEE, 0, 0, 0]).await.unwrap();

        assert!(matches!(rx.receive().await, Err(TransportError::Protocol(_))));
        assert!(tx.is_closed());
    }
}

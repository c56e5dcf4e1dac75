//! Stream multiplexer over one agent transport

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use bored_core::config::MuxConfig;
use bored_core::{StreamError, TransportError};
use bored_protocol::{Frame, FrameKind, StreamId};

use super::stream::{LogicalStream, StreamSlot, StreamState};
use crate::transport::{FrameReceiver, FrameSender, Transport};

/// Which end of the agent connection a multiplexer sits on.
///
/// The role fixes the stream id parity so both ends can open streams without
/// coordinating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Relay side: opens odd ids, refuses peer-initiated streams
    Server,
    /// Agent side: opens even ids, accepts peer-initiated streams
    Agent,
}

impl Role {
    fn first_stream_id(self) -> u32 {
        match self {
            Role::Server => 1,
            Role::Agent => 2,
        }
    }

    fn opens(self, id: StreamId) -> bool {
        match self {
            Role::Server => id.is_server_initiated(),
            Role::Agent => id.is_agent_initiated(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Server => write!(f, "server"),
            Role::Agent => write!(f, "agent"),
        }
    }
}

/// State shared between the multiplexer handle, its streams and the dispatch loop
pub(crate) struct Shared {
    role: Role,
    sender: FrameSender,
    streams: DashMap<StreamId, Arc<StreamSlot>>,
    next_stream_id: AtomicU32,
    /// Cancelled once every stream has been failed after transport loss
    terminated: CancellationToken,
}

impl Shared {
    pub(crate) async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.sender.send(frame).await
    }

    /// Remove a stream whose handle is gone, resetting it if it was still live
    pub(crate) fn release(&self, slot: &Arc<StreamSlot>) {
        let id = slot.id();
        self.streams.remove(&id);

        if slot.abandon() && !self.sender.is_closed() {
            tracing::debug!("Resetting released {}", id);
            let reset = move || Frame::error(id, "stream released");
            if self.sender.try_send(reset()) {
                return;
            }

            // Queue full: wait for room in the background until the transport closes
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let sender = self.sender.clone();
                    handle.spawn(async move {
                        if let Err(e) = sender.send(reset()).await {
                            tracing::debug!("Reset for {} not sent: {}", id, e);
                        }
                    });
                }
                Err(_) => tracing::debug!("Could not queue reset for {}", id),
            }
        } else {
            tracing::debug!("Released {}", id);
        }
    }

    fn allocate_id(&self) -> Result<StreamId, StreamError> {
        self.next_stream_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| id.checked_add(2))
            .map(StreamId::new)
            .map_err(|_| StreamError::StreamIdsExhausted)
    }

    fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Reply to the peer from the dispatch loop without waiting on backpressure
    fn refuse(&self, id: StreamId, reason: &str) {
        if !self.sender.try_send(Frame::error(id, reason)) {
            tracing::debug!("Dropped refusal for {}: outbound queue full", id);
        }
    }
}

/// Many independent logical streams over one [`Transport`].
///
/// Cheap to clone; all clones drive the same connection. A background task
/// demultiplexes incoming frames until the transport ends, at which point
/// every open stream fails with [`StreamError::ConnectionLost`].
#[derive(Clone)]
pub struct Multiplexer {
    shared: Arc<Shared>,
    accept_rx: Arc<Mutex<mpsc::Receiver<LogicalStream>>>,
}

impl Multiplexer {
    /// Start multiplexing over `transport`. Must be called from within a tokio runtime.
    pub fn new(transport: Transport, role: Role, config: &MuxConfig) -> Self {
        let (sender, receiver) = transport.split();
        let (accept_tx, accept_rx) = mpsc::channel(config.accept_backlog.max(1));

        let shared = Arc::new(Shared {
            role,
            sender,
            streams: DashMap::new(),
            next_stream_id: AtomicU32::new(role.first_stream_id()),
            terminated: CancellationToken::new(),
        });

        tokio::spawn(dispatch_loop(Arc::clone(&shared), receiver, accept_tx));

        Self {
            shared,
            accept_rx: Arc::new(Mutex::new(accept_rx)),
        }
    }

    /// Open a new logical stream.
    ///
    /// Returns as soon as the `Open` frame is queued; the caller may write
    /// immediately without waiting for the peer.
    pub async fn open_stream(&self) -> Result<LogicalStream, StreamError> {
        if self.shared.is_closed() {
            return Err(StreamError::MultiplexerClosed);
        }

        let id = self.shared.allocate_id()?;
        let (slot, inbound) = StreamSlot::new(id, StreamState::Opening);
        self.shared.streams.insert(id, Arc::clone(&slot));

        // The dispatch loop may have failed all streams between the check and the insert
        if self.shared.is_closed() {
            self.shared.streams.remove(&id);
            return Err(StreamError::MultiplexerClosed);
        }

        let stream = LogicalStream::new(slot, inbound, Arc::clone(&self.shared));

        if self.shared.send(Frame::open(id)).await.is_err() {
            return Err(StreamError::MultiplexerClosed);
        }

        tracing::debug!("Opened {} ({} active)", id, self.shared.streams.len());
        Ok(stream)
    }

    /// Wait for the next peer-initiated stream.
    ///
    /// Only an [`Role::Agent`] multiplexer ever yields streams. Fails with
    /// [`StreamError::MultiplexerClosed`] once the transport has ended.
    pub async fn accept(&self) -> Result<LogicalStream, StreamError> {
        self.accept_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(StreamError::MultiplexerClosed)
    }

    /// Close the underlying transport. Idempotent.
    pub fn close(&self) {
        self.shared.sender.close();
    }

    /// Whether the underlying transport has ended
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Wait until the transport has ended and every stream has been failed
    pub async fn closed(&self) {
        self.shared.terminated.cancelled().await;
    }

    /// Number of streams in the stream table
    pub fn active_streams(&self) -> usize {
        self.shared.streams.len()
    }

    /// Whether `id` is still in the stream table
    pub fn contains_stream(&self, id: StreamId) -> bool {
        self.shared.streams.contains_key(&id)
    }
}

async fn dispatch_loop(
    shared: Arc<Shared>,
    mut receiver: FrameReceiver,
    accept_tx: mpsc::Sender<LogicalStream>,
) {
    let mut last_remote_id = 0u32;

    loop {
        let frame = match receiver.receive().await {
            Ok(frame) => frame,
            Err(TransportError::Closed) => {
                tracing::debug!("Transport closed ({} multiplexer)", shared.role);
                break;
            }
            Err(e) => {
                tracing::warn!("Transport failed ({} multiplexer): {}", shared.role, e);
                break;
            }
        };

        let id = frame.stream_id;
        tracing::trace!("Received {} frame for {} ({} bytes)", frame.kind, id, frame.payload.len());

        if frame.kind == FrameKind::Open {
            on_remote_open(&shared, id, &mut last_remote_id, &accept_tx);
            continue;
        }

        let Some(slot) = shared.streams.get(&id).map(|entry| Arc::clone(entry.value())) else {
            tracing::trace!("Dropping {} frame for unknown {}", frame.kind, id);
            continue;
        };

        match frame.kind {
            FrameKind::Data => {
                if !slot.on_data(frame.payload) {
                    tracing::trace!("Dropping data for {}: read side closed", id);
                }
            }
            FrameKind::Close => {
                tracing::debug!("Peer closed write side of {}", id);
                slot.on_remote_close();
            }
            FrameKind::Error => {
                let reason = frame.reason().unwrap_or("malformed reason").to_string();
                tracing::debug!("Peer reset {}: {}", id, reason);
                slot.on_error(StreamError::Reset {
                    stream_id: id,
                    reason,
                });
            }
            FrameKind::Open => unreachable!("handled above"),
        }
    }

    shared.sender.close();

    let slots: Vec<Arc<StreamSlot>> = shared
        .streams
        .iter()
        .map(|entry| Arc::clone(entry.value()))
        .collect();
    shared.streams.clear();

    if !slots.is_empty() {
        tracing::debug!("Failing {} open streams after connection loss", slots.len());
    }
    for slot in slots {
        slot.on_error(StreamError::ConnectionLost);
    }

    shared.terminated.cancel();
}

fn on_remote_open(
    shared: &Arc<Shared>,
    id: StreamId,
    last_remote_id: &mut u32,
    accept_tx: &mpsc::Sender<LogicalStream>,
) {
    if shared.streams.contains_key(&id) {
        tracing::warn!("Ignoring duplicate open for live {}", id);
        return;
    }

    if shared.role == Role::Server {
        tracing::warn!("Refusing agent-initiated {}", id);
        shared.refuse(id, "server does not accept streams");
        return;
    }

    if shared.role.opens(id) || id.as_u32() <= *last_remote_id {
        tracing::warn!("Refusing open for {}: id not valid for peer", id);
        shared.refuse(id, "invalid stream id");
        return;
    }
    *last_remote_id = id.as_u32();

    let (slot, inbound) = StreamSlot::new(id, StreamState::Open);
    shared.streams.insert(id, Arc::clone(&slot));
    let stream = LogicalStream::new(slot, inbound, Arc::clone(shared));

    // On failure the stream is dropped here, which resets it
    match accept_tx.try_send(stream) {
        Ok(()) => tracing::debug!("Accepted {}", id),
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!("Accept backlog full, refusing {}", id);
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!("No acceptor, refusing {}", id);
        }
    }
}

//! WebSocket adapters for agent transports and client connections

use std::io;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::future;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

use bored_core::traits::{ClientReader, ClientWriter};
use bored_core::TransportError;
use bored_protocol::Frame;

use crate::transport::Transport;

/// Carry frames over an agent WebSocket, one frame per binary message
pub fn agent_transport(socket: WebSocket, queue: usize) -> Transport {
    let (sink, stream) = socket.split();

    let sink = sink
        .sink_map_err(|e| TransportError::WebSocket(e.to_string()))
        .with(|frame: Frame| {
            future::ready(
                frame
                    .to_bytes()
                    .map(|bytes| Message::Binary(bytes.to_vec()))
                    .map_err(TransportError::from),
            )
        });

    let stream = stream
        .map(|msg| msg.map_err(|e| TransportError::WebSocket(e.to_string())))
        .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Binary(data)) => Some(Frame::from_bytes(&data).map_err(TransportError::from)),
                Ok(Message::Text(_)) => Some(Err(TransportError::WebSocket(
                    "agents must send binary frames".to_string(),
                ))),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
        });

    Transport::new(sink, stream, queue)
}

/// Split a client WebSocket into relay halves
pub fn split_client(socket: WebSocket) -> (WsClientReader, WsClientWriter) {
    let (sink, stream) = socket.split();
    (
        WsClientReader {
            inner: stream,
            done: false,
        },
        WsClientWriter {
            inner: sink,
            shut: false,
        },
    )
}

fn ws_io_error(e: axum::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

/// Client bytes from a WebSocket: binary and text payloads, EOF on close
pub struct WsClientReader {
    inner: SplitStream<WebSocket>,
    done: bool,
}

#[async_trait]
impl ClientReader for WsClientReader {
    async fn read_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.done {
            return Ok(None);
        }

        while let Some(msg) = self.inner.next().await {
            match msg.map_err(ws_io_error)? {
                Message::Binary(data) => return Ok(Some(Bytes::from(data))),
                Message::Text(text) => return Ok(Some(Bytes::from(text))),
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }

        self.done = true;
        Ok(None)
    }

    fn supports_half_close(&self) -> bool {
        false
    }
}

/// Client bytes to a WebSocket, one binary message per chunk.
///
/// WebSockets have no half-close, so shutting down sends a close message and
/// ends the whole connection.
pub struct WsClientWriter {
    inner: SplitSink<WebSocket, Message>,
    shut: bool,
}

#[async_trait]
impl ClientWriter for WsClientWriter {
    async fn write_chunk(&mut self, data: Bytes) -> io::Result<()> {
        if self.shut {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "client websocket already closed",
            ));
        }
        self.inner
            .send(Message::Binary(data.to_vec()))
            .await
            .map_err(ws_io_error)
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        if self.shut {
            return Ok(());
        }
        self.shut = true;

        // The client may have closed first, in which case only its close reply is pending
        if let Err(e) = self.inner.send(Message::Close(None)).await {
            tracing::trace!("Client close message not delivered: {}", e);
        }
        if let Err(e) = self.inner.close().await {
            tracing::trace!("Client websocket close failed: {}", e);
        }
        Ok(())
    }
}

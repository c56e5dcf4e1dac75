//! Client connection traits
//!
//! A client connection is relayed as two independent halves so that each
//! direction can be driven by its own copy loop. Any tokio byte stream can be
//! adapted with [`split_io`]; message-based transports (WebSocket) implement
//! the traits directly.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

/// Read half of a client connection
#[async_trait]
pub trait ClientReader: Send {
    /// Read the next chunk of client bytes.
    ///
    /// Returns `Ok(None)` once the client has finished sending.
    async fn read_chunk(&mut self) -> io::Result<Option<Bytes>>;

    /// Whether the client can keep receiving after it finished sending.
    ///
    /// When false, end of input ends the whole connection.
    fn supports_half_close(&self) -> bool {
        true
    }
}

/// Write half of a client connection
#[async_trait]
pub trait ClientWriter: Send {
    /// Deliver bytes to the client
    async fn write_chunk(&mut self, data: Bytes) -> io::Result<()>;

    /// Signal the client that nothing more will be written.
    ///
    /// Transports without an independent half-close close the whole
    /// connection here. Calling it more than once must be harmless.
    async fn shutdown(&mut self) -> io::Result<()>;
}

/// [`ClientReader`] over any tokio `AsyncRead`
pub struct IoReader<R> {
    inner: R,
    buf: BytesMut,
    chunk_size: usize,
}

impl<R> IoReader<R> {
    /// Wrap a reader, reading at most `chunk_size` bytes at a time
    pub fn new(inner: R, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            inner,
            buf: BytesMut::with_capacity(chunk_size),
            chunk_size,
        }
    }
}

#[async_trait]
impl<R> ClientReader for IoReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read_chunk(&mut self) -> io::Result<Option<Bytes>> {
        self.buf.reserve(self.chunk_size);
        let n = (&mut self.inner)
            .take(self.chunk_size as u64)
            .read_buf(&mut self.buf)
            .await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(self.buf.split().freeze()))
    }
}

/// [`ClientWriter`] over any tokio `AsyncWrite`
pub struct IoWriter<W> {
    inner: W,
    shut: bool,
}

impl<W> IoWriter<W> {
    /// Wrap a writer
    pub fn new(inner: W) -> Self {
        Self { inner, shut: false }
    }
}

#[async_trait]
impl<W> ClientWriter for IoWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_chunk(&mut self, data: Bytes) -> io::Result<()> {
        if self.shut {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "client writer already shut down",
            ));
        }
        self.inner.write_all(&data).await?;
        self.inner.flush().await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        if self.shut {
            return Ok(());
        }
        self.shut = true;
        self.inner.shutdown().await
    }
}

/// Split a bidirectional tokio stream into client halves
pub fn split_io<T>(io: T, chunk_size: usize) -> (IoReader<ReadHalf<T>>, IoWriter<WriteHalf<T>>)
where
    T: AsyncRead + AsyncWrite,
{
    let (read, write) = tokio::io::split(io);
    (IoReader::new(read, chunk_size), IoWriter::new(write))
}

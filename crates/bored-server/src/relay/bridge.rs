//! Bidirectional copy between a client connection and a logical stream

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use bored_core::traits::{ClientReader, ClientWriter};
use bored_core::RelayError;

use crate::mux::{LogicalStream, StreamReader, StreamWriter};

/// Bytes moved in each direction by a finished bridge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeTotals {
    pub to_agent: u64,
    pub to_client: u64,
}

/// Coordination between the two copy directions
struct Direction<'a> {
    /// Cancelled by whichever direction fails first
    abort: &'a CancellationToken,
    /// Cancelled once the opposite direction finished cleanly
    peer_done: &'a CancellationToken,
    linger: Duration,
}

impl Direction<'_> {
    /// Run one step of the copy loop.
    ///
    /// Returns `Ok(None)` if the bridge was aborted. Once the opposite
    /// direction is done, each step may take at most `linger`.
    async fn step<F: Future>(&self, fut: F) -> Result<Option<F::Output>, RelayError> {
        tokio::pin!(fut);

        tokio::select! {
            biased;
            _ = self.abort.cancelled() => return Ok(None),
            out = &mut fut => return Ok(Some(out)),
            _ = self.peer_done.cancelled() => {}
        }

        tokio::select! {
            biased;
            _ = self.abort.cancelled() => Ok(None),
            out = &mut fut => Ok(Some(out)),
            _ = tokio::time::sleep(self.linger) => Err(RelayError::HalfCloseTimeout),
        }
    }
}

/// Copy client bytes into the stream, then finish the stream's write side
async fn client_to_agent<R>(
    client: &mut R,
    stream: &mut StreamWriter,
    dir: &Direction<'_>,
) -> Result<u64, RelayError>
where
    R: ClientReader + ?Sized,
{
    let mut total = 0u64;

    loop {
        let chunk = match dir.step(client.read_chunk()).await? {
            Some(chunk) => chunk?,
            None => return Ok(total),
        };

        let Some(data) = chunk else {
            tracing::trace!("Client finished sending on {}", stream.id());
            if let Some(result) = dir.step(stream.shutdown()).await? {
                result?;
            }
            return Ok(total);
        };

        total += data.len() as u64;
        match dir.step(stream.write(data)).await? {
            Some(result) => result?,
            None => return Ok(total),
        }
    }
}

/// Copy stream bytes to the client, then shut down the client's write side
async fn agent_to_client<W>(
    stream: &mut StreamReader,
    client: &mut W,
    dir: &Direction<'_>,
) -> Result<u64, RelayError>
where
    W: ClientWriter + ?Sized,
{
    let mut total = 0u64;

    loop {
        let chunk = match dir.step(stream.read()).await? {
            Some(chunk) => chunk?,
            None => return Ok(total),
        };

        let Some(data) = chunk else {
            tracing::trace!("Agent finished sending on {}", stream.id());
            if let Some(result) = dir.step(client.shutdown()).await? {
                result?;
            }
            return Ok(total);
        };

        total += data.len() as u64;
        match dir.step(client.write_chunk(data)).await? {
            Some(result) => result?,
            None => return Ok(total),
        }
    }
}

/// Relay between a client and a logical stream until both directions end.
///
/// EOF in one direction is forwarded as a half-close to the other side. A
/// client without half-close ends the relay as soon as it stops sending. An
/// error in either direction stops both. The client is shut down and the
/// stream released when this returns.
pub async fn bridge<R, W>(
    client_reader: &mut R,
    client_writer: &mut W,
    stream: LogicalStream,
    linger: Duration,
) -> Result<BridgeTotals, RelayError>
where
    R: ClientReader + ?Sized,
    W: ClientWriter + ?Sized,
{
    let half_close = client_reader.supports_half_close();
    let (mut stream_reader, mut stream_writer) = stream.split();

    let abort = CancellationToken::new();
    let up_done = CancellationToken::new();
    let down_done = CancellationToken::new();

    let up = Direction {
        abort: &abort,
        peer_done: &down_done,
        linger,
    };
    let down = Direction {
        abort: &abort,
        peer_done: &up_done,
        linger,
    };

    let (up_result, down_result) = tokio::join!(
        async {
            let result = client_to_agent(&mut *client_reader, &mut stream_writer, &up).await;
            match &result {
                Ok(_) if half_close => up_done.cancel(),
                Ok(_) | Err(_) => abort.cancel(),
            }
            result
        },
        async {
            let result = agent_to_client(&mut stream_reader, &mut *client_writer, &down).await;
            match &result {
                Ok(_) => down_done.cancel(),
                Err(_) => abort.cancel(),
            }
            result
        }
    );

    if let Err(e) = client_writer.shutdown().await {
        tracing::trace!("Client shutdown after relay failed: {}", e);
    }

    match (up_result, down_result) {
        (Ok(to_agent), Ok(to_client)) => Ok(BridgeTotals {
            to_agent,
            to_client,
        }),
        (Err(e), _) | (_, Err(e)) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mux::{Multiplexer, Role, StreamState};
    use crate::transport::Transport;
    use bored_core::config::MuxConfig;
    use bored_core::traits::split_io;
    use bored_core::StreamError;
    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn linked_muxes() -> (Multiplexer, Multiplexer) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let config = MuxConfig::default();
        (
            Multiplexer::new(Transport::framed(a, 16), Role::Server, &config),
            Multiplexer::new(Transport::framed(b, 16), Role::Agent, &config),
        )
    }

    #[tokio::test]
    async fn test_half_close_in_both_directions() {
        let (server, agent) = linked_muxes();
        let stream = server.open_stream().await.unwrap();
        let id = stream.id();

        let (client_side, mut client) = tokio::io::duplex(1024);
        let relay = tokio::spawn(async move {
            let (mut reader, mut writer) = split_io(client_side, 1024);
            bridge(&mut reader, &mut writer, stream, Duration::from_secs(5)).await
        });

        let mut remote = agent.accept().await.unwrap();

        client.write_all(b"request").await.unwrap();
        client.shutdown().await.unwrap();

        assert_eq!(remote.read().await.unwrap().unwrap().as_ref(), b"request");
        assert_eq!(remote.read().await.unwrap(), None);

        // Client already finished sending; the response still flows back
        remote.write(Bytes::from("response")).await.unwrap();
        remote.shutdown().await.unwrap();

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"response");

        let totals = relay.await.unwrap().unwrap();
        assert_eq!(totals, BridgeTotals { to_agent: 7, to_client: 8 });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!server.contains_stream(id));
    }

    /// Client reader whose end of input ends the whole connection
    struct NoHalfClose<R>(R);

    #[async_trait::async_trait]
    impl<R: ClientReader> ClientReader for NoHalfClose<R> {
        async fn read_chunk(&mut self) -> std::io::Result<Option<Bytes>> {
            self.0.read_chunk().await
        }

        fn supports_half_close(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_client_without_half_close_ends_relay_on_eof() {
        let (server, agent) = linked_muxes();
        let stream = server.open_stream().await.unwrap();
        let id = stream.id();

        let (client_side, mut client) = tokio::io::duplex(1024);
        let relay = tokio::spawn(async move {
            let (reader, mut writer) = split_io(client_side, 1024);
            let mut reader = NoHalfClose(reader);
            bridge(&mut reader, &mut writer, stream, Duration::from_secs(30)).await
        });

        let mut remote = agent.accept().await.unwrap();

        client.write_all(b"bye").await.unwrap();
        client.shutdown().await.unwrap();

        // The silent agent does not hold the relay open
        let totals = tokio::time::timeout(Duration::from_secs(1), relay)
            .await
            .expect("relay should end without lingering")
            .unwrap()
            .unwrap();
        assert_eq!(totals, BridgeTotals { to_agent: 3, to_client: 0 });

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());

        assert_eq!(remote.read().await.unwrap().unwrap().as_ref(), b"bye");
        assert_eq!(remote.read().await.unwrap(), None);
        assert!(!server.contains_stream(id));

        // The released stream is reset on the agent side as well
        tokio::time::timeout(Duration::from_secs(1), async {
            while remote.state() != StreamState::Closed {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("agent stream should be reset");
        assert!(remote.write(Bytes::from("late")).await.is_err());
    }

    #[tokio::test]
    async fn test_stream_reset_closes_client() {
        let (server, agent) = linked_muxes();
        let stream = server.open_stream().await.unwrap();

        let (client_side, mut client) = tokio::io::duplex(1024);
        let relay = tokio::spawn(async move {
            let (mut reader, mut writer) = split_io(client_side, 1024);
            bridge(&mut reader, &mut writer, stream, Duration::from_secs(5)).await
        });

        let remote = agent.accept().await.unwrap();
        drop(remote);

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());

        let err = relay.await.unwrap().unwrap_err();
        assert!(matches!(err, RelayError::Stream(StreamError::Reset { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_half_close_times_out() {
        let (server, agent) = linked_muxes();
        let stream = server.open_stream().await.unwrap();

        let (client_side, mut client) = tokio::io::duplex(1024);
        let relay = tokio::spawn(async move {
            let (mut reader, mut writer) = split_io(client_side, 1024);
            bridge(&mut reader, &mut writer, stream, Duration::from_secs(30)).await
        });

        // The agent finishes immediately; the client keeps its side open and silent
        let mut remote = agent.accept().await.unwrap();
        remote.shutdown().await.unwrap();

        let err = relay.await.unwrap().unwrap_err();
        assert!(matches!(err, RelayError::HalfCloseTimeout));

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_large_transfer_keeps_order() {
        let (server, agent) = linked_muxes();
        let stream = server.open_stream().await.unwrap();

        let (client_side, client) = tokio::io::duplex(4096);
        let relay = tokio::spawn(async move {
            let (mut reader, mut writer) = split_io(client_side, 1000);
            bridge(&mut reader, &mut writer, stream, Duration::from_secs(5)).await
        });

        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();
        let (mut client_read, mut client_write) = tokio::io::split(client);
        let sender = tokio::spawn(async move {
            client_write.write_all(&payload).await.unwrap();
            client_write.shutdown().await.unwrap();
        });

        let mut remote = agent.accept().await.unwrap();
        let mut received = Vec::new();
        while let Some(chunk) = remote.read().await.unwrap() {
            received.extend_from_slice(&chunk);
        }
        assert_eq!(received, expected);
        remote.shutdown().await.unwrap();

        sender.await.unwrap();
        let mut rest = Vec::new();
        client_read.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert_eq!(relay.await.unwrap().unwrap().to_agent, 200_000);
    }
}

//! Duplex relay between a WebSocket and a raw byte stream.
//!
//! Two directions are polled concurrently inside the caller's task:
//!
//! - **Upstream**: raw reader → encrypt → one binary WebSocket message per chunk.
//! - **Downstream**: binary WebSocket message → decrypt → raw writer (fully
//!   written and flushed before the next message is read).
//!
//! Whichever direction finishes first (end of stream, close frame, or error)
//! ends the relay; the other direction's future is dropped on the spot. The
//! raw writer is then shut down, followed by the WebSocket close handshake.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, trace};

use crate::codec::FrameCodec;
use crate::error::{WstError, WstResult};

/// Default read size for the raw side.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Upper bound on the teardown close handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Relay direction, named from the raw stream's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Raw reader → WebSocket.
    Upstream,
    /// WebSocket → raw writer.
    Downstream,
}

/// Summary of a finished relay.
#[derive(Debug)]
pub struct RelayOutcome {
    /// Plaintext bytes read from the raw side and sent as frames.
    pub upstream_bytes: u64,
    /// Plaintext bytes decrypted from frames and written to the raw side.
    pub downstream_bytes: u64,
    /// The direction that ended first.
    pub finished: Direction,
    /// Set when the finishing direction ended with an error rather than a
    /// clean end of stream.
    pub error: Option<WstError>,
}

/// Run the relay until either direction ends, then tear both sides down.
pub async fn relay<S, R, W>(
    ws: WebSocketStream<S>,
    mut reader: R,
    mut writer: W,
    codec: &FrameCodec,
    chunk_size: usize,
) -> RelayOutcome
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    let mut upstream_bytes = 0u64;
    let mut downstream_bytes = 0u64;

    let (finished, result) = {
        let upstream = pump_upstream(
            &mut reader,
            &mut sink,
            codec,
            chunk_size.max(1),
            &mut upstream_bytes,
        );
        let downstream = pump_downstream(&mut stream, &mut writer, codec, &mut downstream_bytes);

        tokio::select! {
            r = upstream => (Direction::Upstream, r),
            r = downstream => (Direction::Downstream, r),
        }
    };

    debug!(?finished, ok = result.is_ok(), "relay direction finished, tearing down");

    // Raw side first, then the WebSocket.
    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "raw shutdown failed");
    }
    match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "websocket close failed"),
        Err(_) => debug!("websocket close timed out"),
    }

    RelayOutcome {
        upstream_bytes,
        downstream_bytes,
        finished,
        error: result.err(),
    }
}

async fn pump_upstream<S, R>(
    reader: &mut R,
    sink: &mut SplitSink<WebSocketStream<S>, Message>,
    codec: &FrameCodec,
    chunk_size: usize,
    total: &mut u64,
) -> WstResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; chunk_size];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            debug!("raw side reached end of stream");
            return Ok(());
        }
        sink.send(Message::Binary(codec.encrypt(&buf[..n]))).await?;
        *total += n as u64;
        trace!(bytes = n, "upstream chunk");
    }
}

async fn pump_downstream<S, W>(
    stream: &mut SplitStream<WebSocketStream<S>>,
    writer: &mut W,
    codec: &FrameCodec,
    total: &mut u64,
) -> WstResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        match stream.next().await {
            Some(Ok(Message::Binary(frame))) => {
                let data = codec.decrypt(&frame)?;
                if data.is_empty() {
                    continue;
                }
                writer.write_all(&data).await?;
                writer.flush().await?;
                *total += data.len() as u64;
                trace!(bytes = data.len(), "downstream chunk");
            }
            Some(Ok(Message::Close(frame))) => {
                debug!(?frame, "peer sent close frame");
                return Ok(());
            }
            Some(Ok(Message::Text(_))) => {
                debug!("ignoring text message");
            }
            // Pings are answered by tungstenite itself.
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(WstError::Transport(format!("websocket recv failed: {e}"))),
            None => {
                debug!("websocket stream ended");
                return Ok(());
            }
        }
    }
}

//! One client's tunnel, from handshake to teardown.
//!
//! ```text
//! AwaitingHandshake ──> Connecting ──> Relaying ──> Closed
//!        │                  │                         ^
//!        └──────────────────┴─────────────────────────┘  (any failure)
//! ```
//!
//! - **AwaitingHandshake**: the first binary message must decrypt to a
//!   [`HandshakeRequest`]. Any failure aborts without sending a frame.
//! - **Connecting**: the target is dialed. Success sends `OK`; failure sends
//!   one `{"error": ...}` frame (best effort) and closes.
//! - **Relaying**: [`wst_core::relay`] runs both directions until one ends.
//! - **Closed**: both connections have been released.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};
use wst_core::{
    relay, ErrorFrame, FrameCodec, HandshakeRequest, RelayOutcome, WstError, WstResult, ACK,
    DEFAULT_CHUNK_SIZE,
};

use crate::connector::TargetConnector;

/// Bound on the close handshake after a failed connect.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of a [`TunnelSession`]. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    AwaitingHandshake,
    Connecting,
    Relaying,
    Closed,
}

/// Per-session knobs taken from the server config.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// How long to wait for the first frame.
    pub handshake_timeout: Duration,
    /// Read size on the target side.
    pub chunk_size: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(30),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Drives a single client's tunnel.
pub struct TunnelSession {
    codec: FrameCodec,
    connector: TargetConnector,
    settings: SessionSettings,
    state: SessionState,
}

impl TunnelSession {
    pub fn new(codec: FrameCodec, connector: TargetConnector, settings: SessionSettings) -> Self {
        Self {
            codec,
            connector,
            settings,
            state: SessionState::AwaitingHandshake,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion. The session always ends `Closed`.
    ///
    /// Returns the relay summary, or the error that ended the session.
    pub async fn run<S>(&mut self, ws: WebSocketStream<S>) -> WstResult<RelayOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let result = self.drive(ws).await;
        self.transition(SessionState::Closed);
        result
    }

    async fn drive<S>(&mut self, mut ws: WebSocketStream<S>) -> WstResult<RelayOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let request = match self.await_handshake(&mut ws).await {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "handshake failed");
                // Dropping the socket without a frame.
                return Err(e);
            }
        };

        self.transition(SessionState::Connecting);
        let target = request.target();
        info!(target = %target, "routing");

        let stream = match self.connector.connect(&request.host, request.port).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(target = %target, error = %e, "target connect failed");
                self.reject(&mut ws, &e).await;
                return Err(e);
            }
        };

        ws.send(Message::Binary(self.codec.encrypt(ACK))).await?;
        self.transition(SessionState::Relaying);
        info!(target = %target, "tunnel open");

        let (reader, writer) = stream.into_split();
        let outcome = relay(ws, reader, writer, &self.codec, self.settings.chunk_size).await;

        info!(
            target = %target,
            upstream_bytes = outcome.upstream_bytes,
            downstream_bytes = outcome.downstream_bytes,
            finished = ?outcome.finished,
            error = outcome.error.as_ref().map(|e| e.to_string()),
            "tunnel closed"
        );

        match outcome.error {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    /// Wait for the first binary message and decode it.
    async fn await_handshake<S>(&self, ws: &mut WebSocketStream<S>) -> WstResult<HandshakeRequest>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let frame = tokio::time::timeout(self.settings.handshake_timeout, first_binary(ws))
            .await
            .map_err(|_| {
                WstError::Handshake(format!(
                    "no handshake within {:?}",
                    self.settings.handshake_timeout
                ))
            })??;

        let payload = self
            .codec
            .decrypt(&frame)
            .map_err(|e| WstError::Handshake(format!("undecryptable handshake frame: {e}")))?;

        HandshakeRequest::decode(&payload)
    }

    /// Best-effort error frame followed by a close.
    async fn reject<S>(&self, ws: &mut WebSocketStream<S>, err: &WstError)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let frame = ErrorFrame::new(err.to_string()).encode();
        if let Err(e) = ws.send(Message::Binary(self.codec.encrypt(&frame))).await {
            debug!(error = %e, "failed to send error frame");
        }
        match tokio::time::timeout(CLOSE_TIMEOUT, ws.close(None)).await {
            Ok(Err(e)) => debug!(error = %e, "websocket close failed"),
            Err(_) => debug!("websocket close timed out"),
            Ok(Ok(())) => {}
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(next > self.state, "{:?} -> {:?}", self.state, next);
        debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }
}

/// First binary message of the connection. Pings/pongs are skipped; any other
/// message or a close means there is no handshake.
async fn first_binary<S>(ws: &mut WebSocketStream<S>) -> WstResult<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        match ws.next().await {
            Some(Ok(Message::Binary(data))) => return Ok(data),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => {
                return Err(WstError::Handshake("connection closed before handshake".into()))
            }
            Some(Ok(_)) => {
                return Err(WstError::Handshake(
                    "expected a binary handshake frame".into(),
                ))
            }
            Some(Err(e)) => {
                return Err(WstError::Handshake(format!(
                    "transport error before handshake: {e}"
                )))
            }
        }
    }
}

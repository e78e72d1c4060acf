//! WebSocket upgrade using tokio-tungstenite.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{accept_hdr_async_with_config, WebSocketStream};
use tracing::debug;
use wst_core::{WstError, WstResult};

/// Complete the server side of the WebSocket handshake on `stream`.
///
/// `max_message_size` caps both single frames and reassembled messages.
pub async fn accept<S>(stream: S, max_message_size: usize) -> WstResult<WebSocketStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let config = WebSocketConfig {
        max_message_size: Some(max_message_size),
        max_frame_size: Some(max_message_size),
        ..WebSocketConfig::default()
    };

    accept_hdr_async_with_config(
        stream,
        |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            debug!(path = %req.uri().path(), "websocket upgrade");
            Ok(resp)
        },
        Some(config),
    )
    .await
    .map_err(|e| WstError::Transport(format!("websocket handshake failed: {e}")))
}

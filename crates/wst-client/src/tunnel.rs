//! Opening tunnels and moving data through them.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use wst_core::{
    relay, CipherMode, FrameCodec, HandshakeRequest, RelayOutcome, ServerReply, WstError,
    WstResult,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for opening tunnels.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Codec shared with the server (same mode, same secret).
    pub codec: FrameCodec,
    /// Bound on connect + handshake + server reply.
    pub timeout: Duration,
}

impl ConnectConfig {
    pub fn new(mode: CipherMode, secret: &str) -> Self {
        Self {
            codec: FrameCodec::new(mode, secret),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Opens tunnels through one server. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TunnelClient {
    url: String,
    config: ConnectConfig,
}

impl TunnelClient {
    pub fn new(url: impl Into<String>, config: ConnectConfig) -> Self {
        Self {
            url: url.into(),
            config,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connect, send the handshake for `host:port` and wait for the reply.
    ///
    /// An error frame from the server becomes [`WstError::Rejected`]; a
    /// server that closes without replying (bad key, malformed request)
    /// becomes [`WstError::Transport`].
    pub async fn open(&self, host: &str, port: u16) -> WstResult<Tunnel> {
        let request = HandshakeRequest::new(host, port);
        request.validate()?;

        tokio::time::timeout(self.config.timeout, self.handshake(&request))
            .await
            .map_err(|_| WstError::Timeout)?
    }

    async fn handshake(&self, request: &HandshakeRequest) -> WstResult<Tunnel> {
        let codec = &self.config.codec;
        let (mut ws, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| WstError::Transport(format!("WebSocket connect error: {e}")))?;
        debug!(url = %self.url, "WebSocket connected");

        ws.send(Message::Binary(codec.encrypt(&request.encode())))
            .await?;

        loop {
            match ws.next().await {
                Some(Ok(Message::Binary(frame))) => {
                    let payload = codec.decrypt(&frame)?;
                    return match ServerReply::parse(&payload)? {
                        ServerReply::Ack => {
                            info!(target = %request.target(), "tunnel open");
                            Ok(Tunnel {
                                ws,
                                codec: codec.clone(),
                                target: request.target(),
                            })
                        }
                        ServerReply::Error(msg) => Err(WstError::Rejected(msg)),
                    };
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(WstError::Transport(
                        "server closed the connection during handshake".into(),
                    ))
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

/// An established tunnel to one target.
pub struct Tunnel {
    ws: WsStream,
    codec: FrameCodec,
    target: String,
}

impl Tunnel {
    /// `host:port` this tunnel reaches.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Send bytes to the target as one frame. Empty input sends nothing.
    pub async fn send(&mut self, data: &[u8]) -> WstResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.ws
            .send(Message::Binary(self.codec.encrypt(data)))
            .await?;
        Ok(())
    }

    /// Next chunk of target data, or `None` once the tunnel closed.
    pub async fn recv(&mut self) -> WstResult<Option<Vec<u8>>> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Binary(frame))) => return self.codec.decrypt(&frame).map(Some),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    pub async fn close(mut self) -> WstResult<()> {
        self.ws.close(None).await?;
        Ok(())
    }

    /// Relay a local stream through the tunnel until either side ends.
    pub async fn relay<R, W>(self, reader: R, writer: W, chunk_size: usize) -> RelayOutcome
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        relay(self.ws, reader, writer, &self.codec, chunk_size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use wst_core::ErrorFrame;

    fn config() -> ConnectConfig {
        ConnectConfig::new(CipherMode::Encrypted, "test-key").with_timeout(Duration::from_secs(5))
    }

    /// One-shot fake server: accepts a WebSocket, checks the handshake and
    /// answers with `reply` (or nothing), then echoes frames back.
    async fn fake_server(reply: Option<Vec<u8>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let codec = config().codec;

            let Some(Ok(Message::Binary(frame))) = ws.next().await else {
                return;
            };
            let request = HandshakeRequest::decode(&codec.decrypt(&frame).unwrap()).unwrap();
            assert_eq!(request, HandshakeRequest::new("db.internal", 5432));

            match reply {
                Some(payload) => {
                    ws.send(Message::Binary(codec.encrypt(&payload))).await.unwrap();
                }
                None => {
                    ws.close(None).await.ok();
                    return;
                }
            }
            while let Some(Ok(Message::Binary(frame))) = ws.next().await {
                let data = codec.decrypt(&frame).unwrap();
                ws.send(Message::Binary(codec.encrypt(&data))).await.unwrap();
            }
        });
        format!("ws://{addr}/ws")
    }

    #[tokio::test]
    async fn open_send_recv() {
        let url = fake_server(Some(b"OK".to_vec())).await;
        let client = TunnelClient::new(url, config());

        let mut tunnel = client.open("db.internal", 5432).await.unwrap();
        assert_eq!(tunnel.target(), "db.internal:5432");

        tunnel.send(b"ping").await.unwrap();
        assert_eq!(tunnel.recv().await.unwrap().unwrap(), b"ping");
        tunnel.close().await.unwrap();
    }

    #[tokio::test]
    async fn error_frame_is_rejection() {
        let url = fake_server(Some(ErrorFrame::new("connection refused").encode())).await;
        let client = TunnelClient::new(url, config());

        match client.open("db.internal", 5432).await {
            Err(WstError::Rejected(msg)) => assert_eq!(msg, "connection refused"),
            Err(other) => panic!("expected rejection, got {other}"),
            Ok(_) => panic!("expected rejection, got a tunnel"),
        }
    }

    #[tokio::test]
    async fn silent_close_is_transport_error() {
        let url = fake_server(None).await;
        let client = TunnelClient::new(url, config());
        assert!(matches!(
            client.open("db.internal", 5432).await,
            Err(WstError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn invalid_request_fails_before_connecting() {
        let client = TunnelClient::new("ws://127.0.0.1:1/ws", config());
        assert!(matches!(client.open("", 80).await, Err(WstError::Handshake(_))));
        assert!(matches!(client.open("host", 0).await, Err(WstError::Handshake(_))));
    }

    #[tokio::test]
    async fn unresponsive_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let _ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let client = TunnelClient::new(
            format!("ws://{addr}/ws"),
            config().with_timeout(Duration::from_millis(300)),
        );
        assert!(matches!(
            client.open("db.internal", 5432).await,
            Err(WstError::Timeout)
        ));
    }
}

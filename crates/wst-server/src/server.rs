//! Core server: accepts connections and hands each one to its own task.
//!
//! Owns the frame codec (and therefore the session key) and the target
//! connector. Both are immutable after [`TunnelServer::bind`] and shared by
//! every connection through one `Arc`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, info_span, warn, Instrument};
use wst_core::{FrameCodec, WstError, WstResult};

use crate::config::ServerConfig;
use crate::connector::TargetConnector;
use crate::session::{SessionSettings, TunnelSession};
use crate::transport::http::{self, Route, Status};
use crate::transport::{websocket, PrefixedStream};

/// Read-only state shared by every connection.
struct ServerContext {
    codec: FrameCodec,
    connector: TargetConnector,
    settings: SessionSettings,
    ws_path: String,
    max_message_size: usize,
}

/// The tunnel server, bound and ready to accept.
pub struct TunnelServer {
    listener: TcpListener,
    context: Arc<ServerContext>,
}

impl TunnelServer {
    /// Derive the key, bind the listener and log the effective mode.
    pub async fn bind(config: ServerConfig) -> WstResult<Self> {
        config.validate()?;

        let codec = FrameCodec::new(config.mode, &config.secret);
        let listener = TcpListener::bind(config.bind_addr())
            .await
            .map_err(|e| WstError::Transport(format!("bind {} failed: {e}", config.bind_addr())))?;

        match codec.key() {
            Some(key) => info!(
                addr = %listener.local_addr()?,
                ws_path = %config.ws_path,
                mode = "aes-256-cbc",
                key_fingerprint = %key.fingerprint(),
                "tunnel server listening"
            ),
            None => warn!(
                addr = %listener.local_addr()?,
                ws_path = %config.ws_path,
                mode = "PLAINTEXT",
                "tunnel server listening without encryption"
            ),
        }
        if config.uses_default_secret() {
            warn!("using the built-in default secret; set WST_KEY or [crypto] secret");
        }

        let context = ServerContext {
            codec,
            connector: TargetConnector::new(config.connect_timeout),
            settings: SessionSettings {
                handshake_timeout: config.handshake_timeout,
                chunk_size: config.chunk_size,
            },
            ws_path: config.ws_path,
            max_message_size: config.max_message_size,
        };

        Ok(Self {
            listener,
            context: Arc::new(context),
        })
    }

    pub fn local_addr(&self) -> WstResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever. A failing connection never stops the loop.
    pub async fn run(self) -> WstResult<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let context = self.context.clone();
                    tokio::spawn(
                        handle_connection(stream, context)
                            .instrument(info_span!("session", peer = %peer)),
                    );
                }
                Err(e) => {
                    // Typically fd exhaustion; back off instead of spinning.
                    error!(error = %e, "TCP accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

/// Route one TCP connection: health check, tunnel, or rejection.
async fn handle_connection(mut stream: TcpStream, context: Arc<ServerContext>) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "failed to set TCP_NODELAY");
    }

    let head = match tokio::time::timeout(
        context.settings.handshake_timeout,
        http::read_request_head(&mut stream),
    )
    .await
    {
        Ok(Ok(head)) => head,
        Ok(Err(e)) => {
            debug!(error = %e, "failed to read request head");
            return;
        }
        Err(_) => {
            debug!("timed out reading request head");
            return;
        }
    };

    let route = http::classify(&head, &context.ws_path);
    debug!(?route, "routed request");

    let response = match route {
        Route::Upgrade => {
            run_tunnel(PrefixedStream::new(head, stream), &context).await;
            return;
        }
        Route::Health { head_only } => {
            let body = format!("wst server OK ({})", context.codec.mode());
            http::respond(&mut stream, Status::Ok, &body, head_only).await
        }
        Route::UpgradeRequired => {
            http::respond(&mut stream, Status::UpgradeRequired, "websocket upgrade required", false)
                .await
        }
        Route::MethodNotAllowed => {
            http::respond(&mut stream, Status::MethodNotAllowed, "method not allowed", false).await
        }
        Route::NotFound => http::respond(&mut stream, Status::NotFound, "not found", false).await,
        Route::BadRequest(reason) => {
            warn!(reason, "rejecting request");
            http::respond(&mut stream, Status::BadRequest, reason, false).await
        }
    };

    if let Err(e) = response {
        debug!(error = %e, "failed to write HTTP response");
    }
}

async fn run_tunnel(stream: PrefixedStream<TcpStream>, context: &ServerContext) {
    let ws = match websocket::accept(stream, context.max_message_size).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(error = %e, "websocket upgrade failed");
            return;
        }
    };
    info!("client connected");

    let mut session = TunnelSession::new(
        context.codec.clone(),
        context.connector.clone(),
        context.settings.clone(),
    );
    if let Err(e) = session.run(ws).await {
        debug!(error = %e, "session ended with error");
    }

    info!("client disconnected");
}

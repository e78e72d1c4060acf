//! Outbound TCP connections to tunnel targets.

use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;
use wst_core::{WstError, WstResult};

/// Opens raw TCP connections to the host/port named in a handshake.
///
/// Name resolution failures, refusals and timeouts all surface as
/// [`WstError::Connect`]. Nothing is retried.
#[derive(Debug, Clone)]
pub struct TargetConnector {
    timeout: Duration,
}

impl TargetConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve and connect to `host:port` within the configured timeout.
    pub async fn connect(&self, host: &str, port: u16) -> WstResult<TcpStream> {
        let bare_host = host.trim_start_matches('[').trim_end_matches(']');
        let target = if bare_host.contains(':') {
            format!("[{bare_host}]:{port}")
        } else {
            format!("{bare_host}:{port}")
        };

        let stream =
            match tokio::time::timeout(self.timeout, TcpStream::connect((bare_host, port))).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(source)) => return Err(WstError::Connect { target, source }),
                Err(_) => {
                    return Err(WstError::Connect {
                        target,
                        source: io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("connect timed out after {:?}", self.timeout),
                        ),
                    })
                }
            };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "failed to set TCP_NODELAY on target stream");
        }
        debug!(target = %target, peer = ?stream.peer_addr().ok(), "target connected");
        Ok(stream)
    }
}

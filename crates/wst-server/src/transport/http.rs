//! Minimal HTTP/1.1 request-head inspection and plain responses.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use wst_core::{WstError, WstResult};

/// Largest request head we are willing to buffer.
pub const MAX_HEAD_LEN: usize = 8192;

const HEADER_END: &[u8] = b"\r\n\r\n";

/// Where a request should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `GET /` or `HEAD /`.
    Health { head_only: bool },
    /// WebSocket upgrade on the tunnel path.
    Upgrade,
    /// Plain request on the tunnel path.
    UpgradeRequired,
    /// Other method on `/`.
    MethodNotAllowed,
    NotFound,
    BadRequest(&'static str),
}

/// Response status lines we send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    UpgradeRequired,
}

impl Status {
    fn line(self) -> &'static str {
        match self {
            Status::Ok => "200 OK",
            Status::BadRequest => "400 Bad Request",
            Status::NotFound => "404 Not Found",
            Status::MethodNotAllowed => "405 Method Not Allowed",
            Status::UpgradeRequired => "426 Upgrade Required",
        }
    }
}

/// Read from `stream` until the end of the request head.
///
/// Returns every byte read, which may extend past the head; callers that
/// hand the connection on must replay them (see [`PrefixedStream`]).
pub async fn read_request_head<S>(stream: &mut S) -> WstResult<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(WstError::Transport(format!(
                "connection closed after {} bytes of request head",
                buf.len()
            )));
        }
        buf.extend_from_slice(&chunk[..n]);
        if find_header_end(&buf).is_some() {
            return Ok(buf);
        }
        if buf.len() >= MAX_HEAD_LEN {
            return Err(WstError::Transport(format!(
                "request head exceeds {MAX_HEAD_LEN} bytes"
            )));
        }
    }
}

/// Classify a complete request head.
pub fn classify(buf: &[u8], ws_path: &str) -> Route {
    let Some(end) = find_header_end(buf) else {
        return Route::BadRequest("incomplete request head");
    };
    let Ok(head) = std::str::from_utf8(&buf[..end]) else {
        return Route::BadRequest("request head is not utf-8");
    };

    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let target = parts.next().unwrap_or("");
    let version = parts.next().unwrap_or("");
    if !version.starts_with("HTTP/") || !target.starts_with('/') {
        return Route::BadRequest("malformed request line");
    }
    let path = target.split('?').next().unwrap_or("");

    let mut upgrade = false;
    let mut connection_upgrade = false;
    let mut ws_key = false;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_ascii_lowercase();
        match name.trim().to_ascii_lowercase().as_str() {
            "upgrade" => upgrade |= value.contains("websocket"),
            "connection" => connection_upgrade |= value.contains("upgrade"),
            "sec-websocket-key" => ws_key |= !value.is_empty(),
            _ => {}
        }
    }
    let is_upgrade = method == "GET" && upgrade && connection_upgrade && ws_key;

    if path == ws_path {
        if is_upgrade {
            Route::Upgrade
        } else {
            Route::UpgradeRequired
        }
    } else if is_upgrade {
        Route::BadRequest("websocket upgrade on unknown path")
    } else if path == "/" {
        match method {
            "GET" => Route::Health { head_only: false },
            "HEAD" => Route::Health { head_only: true },
            _ => Route::MethodNotAllowed,
        }
    } else {
        Route::NotFound
    }
}

/// Write a complete `Connection: close` response and shut the stream down.
pub async fn respond<S>(stream: &mut S, status: Status, body: &str, head_only: bool) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status.line(),
        body.len()
    );
    if !head_only {
        response.push_str(body);
    }
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_END.len())
        .position(|w| w == HEADER_END)
        .map(|idx| idx + HEADER_END.len())
}

/// A stream that yields `prefix` before reading from `inner`.
///
/// Used to hand the already-consumed request head to the WebSocket
/// handshake.
pub struct PrefixedStream<S> {
    prefix: Vec<u8>,
    pos: usize,
    inner: S,
}

impl<S> PrefixedStream<S> {
    pub fn new(prefix: Vec<u8>, inner: S) -> Self {
        Self {
            prefix,
            pos: 0,
            inner,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PrefixedStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.pos < self.prefix.len() {
            let remaining = &self.prefix[self.pos..];
            let to_copy = remaining.len().min(buf.remaining());
            buf.put_slice(&remaining[..to_copy]);
            self.pos += to_copy;
            if self.pos == self.prefix.len() {
                self.prefix = Vec::new();
                self.pos = 0;
            }
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PrefixedStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, data)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

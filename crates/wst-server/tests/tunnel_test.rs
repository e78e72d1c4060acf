//! End-to-end tests: a real server on a loopback port, real TCP targets, and
//! clients speaking the wire protocol directly or through wst-client.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use wst_client::{ConnectConfig, TunnelClient};
use wst_core::{CipherMode, ErrorFrame, FrameCodec, WstError};
use wst_server::{ServerConfig, TunnelServer};

const KEY: &str = "test-key";

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server(mode: CipherMode) -> SocketAddr {
    let config = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        mode,
        secret: KEY.into(),
        connect_timeout: Duration::from_secs(3),
        handshake_timeout: Duration::from_secs(5),
        ..ServerConfig::default()
    };
    let server = TunnelServer::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

async fn echo_target() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let (mut r, mut w) = stream.split();
                tokio::io::copy(&mut r, &mut w).await.ok();
            });
        }
    });
    addr
}

/// A port with nothing listening on it.
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

async fn ws_connect(addr: SocketAddr) -> Ws {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

fn codec() -> FrameCodec {
    FrameCodec::new(CipherMode::Encrypted, KEY)
}

async fn send_json(ws: &mut Ws, codec: &FrameCodec, json: &str) {
    ws.send(Message::Binary(codec.encrypt(json.as_bytes())))
        .await
        .unwrap();
}

/// Next binary frame, decrypted. `None` once the server closed.
async fn next_payload(ws: &mut Ws, codec: &FrameCodec) -> Option<Vec<u8>> {
    let next = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("server did not answer in time");
    match next {
        Some(Ok(Message::Binary(frame))) => Some(codec.decrypt(&frame).unwrap()),
        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => None,
        Some(Ok(other)) => panic!("unexpected message: {other:?}"),
    }
}

#[tokio::test]
async fn echo_round_trip() {
    let server = start_server(CipherMode::Encrypted).await;
    let target = echo_target().await;
    let codec = codec();

    let mut ws = ws_connect(server).await;
    send_json(
        &mut ws,
        &codec,
        &format!(r#"{{"host":"127.0.0.1","port":{}}}"#, target.port()),
    )
    .await;
    assert_eq!(next_payload(&mut ws, &codec).await.unwrap(), b"OK");

    ws.send(Message::Binary(codec.encrypt(b"ping"))).await.unwrap();
    assert_eq!(next_payload(&mut ws, &codec).await.unwrap(), b"ping");
}

#[tokio::test]
async fn refused_target_gets_one_error_frame() {
    let server = start_server(CipherMode::Encrypted).await;
    let codec = codec();
    let port = closed_port().await;

    let mut ws = ws_connect(server).await;
    send_json(&mut ws, &codec, &format!(r#"{{"host":"127.0.0.1","port":{port}}}"#)).await;

    let reply = next_payload(&mut ws, &codec).await.unwrap();
    let frame = ErrorFrame::decode(&reply).unwrap();
    assert!(!frame.error.is_empty());
    assert!(next_payload(&mut ws, &codec).await.is_none());
}

#[tokio::test]
async fn unresolvable_target_gets_one_error_frame() {
    let server = start_server(CipherMode::Encrypted).await;
    let codec = codec();

    let mut ws = ws_connect(server).await;
    send_json(&mut ws, &codec, r#"{"host":"example.invalid","port":80}"#).await;

    let reply = next_payload(&mut ws, &codec).await.unwrap();
    assert!(ErrorFrame::decode(&reply).is_ok());
    assert!(next_payload(&mut ws, &codec).await.is_none());
}

#[tokio::test]
async fn malformed_handshakes_close_without_data() {
    let server = start_server(CipherMode::Encrypted).await;
    let codec = codec();

    for bad in [
        r#"{"host":"127.0.0.1"}"#,
        r#"{"host":"127.0.0.1","port":"eighty"}"#,
        r#"{"port":80}"#,
        "not json",
    ] {
        let mut ws = ws_connect(server).await;
        send_json(&mut ws, &codec, bad).await;
        assert!(
            next_payload(&mut ws, &codec).await.is_none(),
            "server answered {bad}"
        );
    }
}

#[tokio::test]
async fn wrong_key_closes_without_data() {
    let server = start_server(CipherMode::Encrypted).await;
    let target = echo_target().await;
    let wrong = FrameCodec::new(CipherMode::Encrypted, "not-the-key");

    let mut ws = ws_connect(server).await;
    send_json(
        &mut ws,
        &wrong,
        &format!(r#"{{"host":"127.0.0.1","port":{}}}"#, target.port()),
    )
    .await;
    assert!(next_payload(&mut ws, &wrong).await.is_none());
}

#[tokio::test]
async fn target_close_closes_client() {
    let server = start_server(CipherMode::Encrypted).await;
    let codec = codec();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(b"bye").await.unwrap();
    });

    let mut ws = ws_connect(server).await;
    send_json(
        &mut ws,
        &codec,
        &format!(r#"{{"host":"127.0.0.1","port":{}}}"#, target.port()),
    )
    .await;
    assert_eq!(next_payload(&mut ws, &codec).await.unwrap(), b"OK");
    assert_eq!(next_payload(&mut ws, &codec).await.unwrap(), b"bye");
    assert!(next_payload(&mut ws, &codec).await.is_none());
}

#[tokio::test]
async fn client_close_closes_target() {
    let server = start_server(CipherMode::Encrypted).await;
    let codec = codec();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.ok();
        tx.send(buf).ok();
    });

    let mut ws = ws_connect(server).await;
    send_json(
        &mut ws,
        &codec,
        &format!(r#"{{"host":"127.0.0.1","port":{}}}"#, target.port()),
    )
    .await;
    assert_eq!(next_payload(&mut ws, &codec).await.unwrap(), b"OK");
    ws.send(Message::Binary(codec.encrypt(b"last words"))).await.unwrap();
    ws.close(None).await.unwrap();

    let seen = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seen, b"last words");
}

#[tokio::test]
async fn health_endpoint() {
    let server = start_server(CipherMode::Encrypted).await;

    let mut stream = TcpStream::connect(server).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let mut out = String::new();
    stream.read_to_string(&mut out).await.unwrap();

    assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(out.ends_with("wst server OK (encrypted)"));
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let server = start_server(CipherMode::Encrypted).await;

    let mut stream = TcpStream::connect(server).await.unwrap();
    stream
        .write_all(b"GET /admin HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let mut out = String::new();
    stream.read_to_string(&mut out).await.unwrap();

    assert!(out.starts_with("HTTP/1.1 404 Not Found\r\n"));
}

#[tokio::test]
async fn plaintext_mode_round_trip() {
    let server = start_server(CipherMode::Plaintext).await;
    let target = echo_target().await;

    let mut ws = ws_connect(server).await;
    let handshake = format!(r#"{{"host":"127.0.0.1","port":{}}}"#, target.port());
    ws.send(Message::Binary(handshake.into_bytes())).await.unwrap();

    let plain = FrameCodec::new(CipherMode::Plaintext, "");
    assert_eq!(next_payload(&mut ws, &plain).await.unwrap(), b"OK");
    ws.send(Message::Binary(b"hello".to_vec())).await.unwrap();
    assert_eq!(next_payload(&mut ws, &plain).await.unwrap(), b"hello");
}

#[tokio::test]
async fn client_library_relays_a_local_stream() {
    let server = start_server(CipherMode::Encrypted).await;
    let target = echo_target().await;

    let client = TunnelClient::new(
        format!("ws://{server}/ws"),
        ConnectConfig::new(CipherMode::Encrypted, KEY),
    );
    let tunnel = client.open("127.0.0.1", target.port()).await.unwrap();

    // Local side of the relay is an in-memory pipe.
    let (local, mut app) = tokio::io::duplex(1024);
    let (reader, writer) = tokio::io::split(local);
    let relay = tokio::spawn(tunnel.relay(reader, writer, 4096));

    app.write_all(b"through the tunnel").await.unwrap();
    let mut buf = [0u8; 18];
    app.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"through the tunnel");

    drop(app);
    let outcome = tokio::time::timeout(Duration::from_secs(5), relay)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.upstream_bytes, 18);
    assert_eq!(outcome.downstream_bytes, 18);
}

#[tokio::test]
async fn client_library_surfaces_rejection() {
    let server = start_server(CipherMode::Encrypted).await;
    let port = closed_port().await;

    let client = TunnelClient::new(
        format!("ws://{server}/ws"),
        ConnectConfig::new(CipherMode::Encrypted, KEY),
    );
    assert!(matches!(
        client.open("127.0.0.1", port).await,
        Err(WstError::Rejected(_))
    ));
}

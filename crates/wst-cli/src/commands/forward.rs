//! `wst forward`: accept local TCP connections and tunnel each one to a
//! fixed target.

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, info_span, warn, Instrument};
use wst_client::TunnelClient;
use wst_core::DEFAULT_CHUNK_SIZE;

/// Listen on `listen` until Ctrl-C, opening one tunnel per connection.
pub async fn run(client: TunnelClient, listen: &str, host: &str, port: u16) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to listen on {listen}"))?;
    info!(
        listen = %listener.local_addr()?,
        server = %client.url(),
        target = %format!("{host}:{port}"),
        "forwarding"
    );

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                let client = client.clone();
                let host = host.to_string();
                tokio::spawn(
                    forward_one(client, stream, host, port)
                        .instrument(info_span!("forward", peer = %peer)),
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, no longer accepting connections");
                return Ok(());
            }
        }
    }
}

async fn forward_one(client: TunnelClient, stream: TcpStream, host: String, port: u16) {
    let tunnel = match client.open(&host, port).await {
        Ok(tunnel) => tunnel,
        Err(e) => {
            warn!(error = %e, "could not open tunnel");
            return;
        }
    };

    stream.set_nodelay(true).ok();
    let (reader, writer) = stream.into_split();
    let outcome = tunnel.relay(reader, writer, DEFAULT_CHUNK_SIZE).await;
    match outcome.error {
        Some(e) => warn!(error = %e, "tunnel ended with error"),
        None => info!(
            sent = outcome.upstream_bytes,
            received = outcome.downstream_bytes,
            "tunnel closed"
        ),
    }
}

//! `wst pipe`: connect stdin/stdout to a target through the tunnel.
//!
//! The tunnel has no half-close: end of stdin ends the tunnel.

use anyhow::{Context, Result};
use tracing::debug;
use wst_client::TunnelClient;
use wst_core::DEFAULT_CHUNK_SIZE;

pub async fn run(client: TunnelClient, host: &str, port: u16) -> Result<()> {
    let tunnel = client
        .open(host, port)
        .await
        .with_context(|| format!("failed to open tunnel to {host}:{port}"))?;

    let outcome = tunnel
        .relay(tokio::io::stdin(), tokio::io::stdout(), DEFAULT_CHUNK_SIZE)
        .await;
    debug!(
        sent = outcome.upstream_bytes,
        received = outcome.downstream_bytes,
        "pipe finished"
    );

    match outcome.error {
        Some(e) => Err(e).context("tunnel failed"),
        None => Ok(()),
    }
}

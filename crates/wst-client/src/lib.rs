//! wst-client: client library for the WebSocket tunnel.
//!
//! Connects to a wst server, performs the encrypted handshake naming a TCP
//! target, and then either exchanges frames directly or relays a local
//! stream through the tunnel.
//!
//! # Quick Start
//!
//! ```no_run
//! use wst_client::{ConnectConfig, TunnelClient};
//! use wst_core::CipherMode;
//!
//! # async fn example() -> wst_core::WstResult<()> {
//! let client = TunnelClient::new(
//!     "wss://example.com/ws",
//!     ConnectConfig::new(CipherMode::Encrypted, "shared-secret"),
//! );
//! let mut tunnel = client.open("10.0.0.5", 22).await?;
//! tunnel.send(b"SSH-2.0-probe\r\n").await?;
//! if let Some(banner) = tunnel.recv().await? {
//!     println!("{}", String::from_utf8_lossy(&banner));
//! }
//! tunnel.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod tunnel;

pub use tunnel::{ConnectConfig, Tunnel, TunnelClient};

// Re-export wst-core error types for convenience.
pub use wst_core::{WstError, WstResult};

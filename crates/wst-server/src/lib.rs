//! wst-server: WebSocket tunnel server.
//!
//! Accepts WebSocket connections on a single HTTP port, reads one encrypted
//! handshake frame naming a TCP target, connects to it, and relays bytes in
//! both directions until either side closes. Plain `GET /` requests are
//! answered with a health response on the same port.

pub mod config;
pub mod connector;
pub mod server;
pub mod session;
pub mod transport;

pub use config::{ConfigOverrides, ServerConfig};
pub use connector::TargetConnector;
pub use server::TunnelServer;
pub use session::{SessionSettings, SessionState, TunnelSession};

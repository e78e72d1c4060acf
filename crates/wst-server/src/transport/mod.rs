//! HTTP and WebSocket handling on the listening port.
//!
//! Every accepted TCP connection starts as HTTP. [`http`] reads the request
//! head and decides whether it is a health check, a WebSocket upgrade on the
//! tunnel path, or something to reject. Upgrades are completed by
//! [`websocket`], which replays the bytes already consumed.

pub mod http;
pub mod websocket;

pub use http::{PrefixedStream, Route};

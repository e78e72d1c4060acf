//! Handshake, acknowledgment and error frames.
//!
//! All three travel as frame payloads, i.e. they are encrypted by the
//! [`FrameCodec`](crate::codec::FrameCodec) like relay data:
//!
//! - client → server, first message: `{"host": "<name>", "port": <1-65535>}`
//! - server → client on success: the literal bytes `OK`
//! - server → client on connect failure: `{"error": "<message>"}`

use serde::{Deserialize, Serialize};

use crate::error::{WstError, WstResult};

/// Acknowledgment payload sent once the target connection is up.
pub const ACK: &[u8] = b"OK";

/// Destination requested by the client in the first frame of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandshakeRequest {
    pub host: String,
    pub port: u16,
}

impl HandshakeRequest {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Decode and validate a decrypted handshake payload.
    pub fn decode(payload: &[u8]) -> WstResult<Self> {
        let request: Self = serde_json::from_slice(payload)
            .map_err(|e| WstError::Handshake(format!("invalid handshake request: {e}")))?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> WstResult<()> {
        if self.host.trim().is_empty() {
            return Err(WstError::Handshake("empty host".into()));
        }
        if self.port == 0 {
            return Err(WstError::Handshake("port 0 is not a valid target port".into()));
        }
        Ok(())
    }

    pub fn encode(&self) -> Vec<u8> {
        // A struct of a String and a u16 always serializes.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// `host:port`, with IPv6 literals bracketed.
    pub fn target(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Error payload sent when the server cannot reach the requested target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub error: String,
}

impl ErrorFrame {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn decode(payload: &[u8]) -> WstResult<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| WstError::Handshake(format!("invalid error frame: {e}")))
    }
}

/// The server's answer to a handshake, as seen by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerReply {
    Ack,
    Error(String),
}

impl ServerReply {
    pub fn parse(payload: &[u8]) -> WstResult<Self> {
        if payload == ACK {
            return Ok(Self::Ack);
        }
        ErrorFrame::decode(payload)
            .map(|frame| Self::Error(frame.error))
            .map_err(|_| {
                WstError::Handshake(format!(
                    "unexpected handshake reply ({} bytes)",
                    payload.len()
                ))
            })
    }
}

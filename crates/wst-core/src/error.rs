use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors produced by the tunnel protocol layer.
#[derive(Debug, Error)]
pub enum WstError {
    /// The first frame of a session could not be decrypted or decoded.
    #[error("handshake error: {0}")]
    Handshake(String),

    /// The target named in the handshake could not be reached.
    #[error("connect to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// A frame failed to decrypt.
    #[error("frame decode error: {0}")]
    FrameDecode(String),

    /// The message-stream connection failed or closed unexpectedly.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered the handshake with an error frame.
    #[error("tunnel rejected by server: {0}")]
    Rejected(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("timeout")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<tungstenite::Error> for WstError {
    fn from(e: tungstenite::Error) -> Self {
        WstError::Transport(e.to_string())
    }
}

pub type WstResult<T> = Result<T, WstError>;

//! wst-core: Shared protocol library for the WebSocket tunnel.
//!
//! Provides shared-secret key derivation, the AES-256-CBC frame codec,
//! handshake/acknowledgment/error frame types, and the duplex relay engine
//! used by both the server and the client.

pub mod codec;
pub mod error;
pub mod key;
pub mod protocol;
pub mod relay;

// Re-export commonly used items at crate root.
pub use codec::{CipherMode, FrameCodec, IV_LEN};
pub use error::{WstError, WstResult};
pub use key::SessionKey;
pub use protocol::{ErrorFrame, HandshakeRequest, ServerReply, ACK};
pub use relay::{relay, Direction, RelayOutcome, DEFAULT_CHUNK_SIZE};

//! Frame encryption for the message-stream leg.
//!
//! Wire format of an encrypted frame: `[16-byte IV][AES-256-CBC ciphertext]`
//! with PKCS#7 padding. A fresh IV is drawn from the OS RNG for every frame.
//! There is no authentication tag.
//!
//! In [`CipherMode::Plaintext`] frames are sent unchanged. Both peers must be
//! configured with the same mode; it is not negotiated.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::error::{WstError, WstResult};
use crate::key::SessionKey;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Size of the IV prefix on every encrypted frame.
pub const IV_LEN: usize = 16;

/// AES block size.
const BLOCK_LEN: usize = 16;

/// Wire mode of the frame codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherMode {
    /// AES-256-CBC with a per-frame random IV.
    #[default]
    Encrypted,
    /// No confidentiality at all. Frames are relayed as-is.
    Plaintext,
}

impl CipherMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Encrypted => "encrypted",
            Self::Plaintext => "plaintext",
        }
    }
}

impl fmt::Display for CipherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CipherMode {
    type Err = WstError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "encrypted" | "aes" | "aes-256-cbc" => Ok(Self::Encrypted),
            "plaintext" | "plain" | "none" => Ok(Self::Plaintext),
            other => Err(WstError::Config(format!(
                "unknown cipher mode: {other} (expected encrypted or plaintext)"
            ))),
        }
    }
}

/// Encrypts and decrypts frame payloads.
///
/// Cheap to clone; every session holds its own copy of the same key.
#[derive(Debug, Clone)]
pub enum FrameCodec {
    Encrypted(SessionKey),
    Plaintext,
}

impl FrameCodec {
    /// Build a codec for `mode`, deriving the key from `secret` when needed.
    ///
    /// The secret is ignored in plaintext mode.
    pub fn new(mode: CipherMode, secret: &str) -> Self {
        match mode {
            CipherMode::Encrypted => Self::Encrypted(SessionKey::derive(secret)),
            CipherMode::Plaintext => {
                warn!("frame codec in PLAINTEXT mode: tunnel payloads are not encrypted");
                Self::Plaintext
            }
        }
    }

    pub fn mode(&self) -> CipherMode {
        match self {
            Self::Encrypted(_) => CipherMode::Encrypted,
            Self::Plaintext => CipherMode::Plaintext,
        }
    }

    pub fn is_plaintext(&self) -> bool {
        matches!(self, Self::Plaintext)
    }

    /// The key in use, if any.
    pub fn key(&self) -> Option<&SessionKey> {
        match self {
            Self::Encrypted(key) => Some(key),
            Self::Plaintext => None,
        }
    }

    /// Encrypt one frame payload.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let key = match self {
            Self::Encrypted(key) => key,
            Self::Plaintext => return plaintext.to_vec(),
        };

        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(key.as_bytes().into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut frame = Vec::with_capacity(IV_LEN + ciphertext.len());
        frame.extend_from_slice(&iv);
        frame.extend(ciphertext);
        frame
    }

    /// Decrypt one frame, stripping the IV prefix and the padding.
    pub fn decrypt(&self, frame: &[u8]) -> WstResult<Vec<u8>> {
        let key = match self {
            Self::Encrypted(key) => key,
            Self::Plaintext => return Ok(frame.to_vec()),
        };

        if frame.len() < IV_LEN {
            return Err(WstError::FrameDecode(format!(
                "frame too short: {} bytes (need at least {IV_LEN})",
                frame.len()
            )));
        }

        let (iv, body) = frame.split_at(IV_LEN);
        if body.is_empty() || body.len() % BLOCK_LEN != 0 {
            return Err(WstError::FrameDecode(format!(
                "ciphertext length {} is not a positive multiple of {BLOCK_LEN}",
                body.len()
            )));
        }

        Aes256CbcDec::new(key.as_bytes().into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(body)
            .map_err(|_| WstError::FrameDecode("invalid padding".into()))
    }
}

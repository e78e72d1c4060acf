//! Server configuration: TOML file + CLI/environment overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use wst_core::{CipherMode, WstError, WstResult, DEFAULT_CHUNK_SIZE};

/// Secret used when none is configured. Logged loudly when in effect.
pub const DEFAULT_SECRET: &str = "wst-secret-key-change-this";

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub crypto: CryptoSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
    /// Seconds to wait for the HTTP request head and the first frame.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout: u64,
    /// Seconds to wait for the target TCP connection.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            handshake_timeout: default_handshake_timeout(),
            connect_timeout: default_connect_timeout(),
            chunk_size: default_chunk_size(),
            max_message_size: default_max_message_size(),
        }
    }
}

/// `[crypto]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct CryptoSection {
    #[serde(default)]
    pub mode: CipherMode,
    #[serde(default = "default_secret")]
    pub secret: String,
}

impl Default for CryptoSection {
    fn default() -> Self {
        Self {
            mode: CipherMode::default(),
            secret: default_secret(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    9999
}
fn default_ws_path() -> String {
    "/ws".to_string()
}
fn default_handshake_timeout() -> u64 {
    30
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_max_message_size() -> usize {
    10 * 1024 * 1024
}
fn default_secret() -> String {
    DEFAULT_SECRET.to_string()
}

/// Values supplied on the command line or through the environment.
/// `None` leaves the file (or default) value in place.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub secret: Option<String>,
    pub mode: Option<CipherMode>,
    pub ws_path: Option<String>,
    pub handshake_timeout: Option<u64>,
    pub connect_timeout: Option<u64>,
}

/// Resolved server configuration (file loaded, overrides applied, validated).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub ws_path: String,
    pub handshake_timeout: Duration,
    pub connect_timeout: Duration,
    pub chunk_size: usize,
    pub max_message_size: usize,
    pub mode: CipherMode,
    pub secret: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_file(ConfigFile::default(), &ConfigOverrides::default())
    }
}

impl ServerConfig {
    /// Load config from a TOML file (if it exists), then apply overrides.
    pub fn load(config_path: Option<&Path>, overrides: &ConfigOverrides) -> WstResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    toml::from_str::<ConfigFile>(&content)
                        .map_err(|e| WstError::Config(format!("config parse error: {e}")))?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        let config = Self::from_file(file_config, overrides);
        config.validate()?;
        Ok(config)
    }

    fn from_file(file: ConfigFile, overrides: &ConfigOverrides) -> Self {
        let server = file.server;
        let crypto = file.crypto;
        Self {
            host: overrides.host.clone().unwrap_or(server.host),
            port: overrides.port.unwrap_or(server.port),
            ws_path: overrides.ws_path.clone().unwrap_or(server.ws_path),
            handshake_timeout: Duration::from_secs(
                overrides.handshake_timeout.unwrap_or(server.handshake_timeout),
            ),
            connect_timeout: Duration::from_secs(
                overrides.connect_timeout.unwrap_or(server.connect_timeout),
            ),
            chunk_size: server.chunk_size,
            max_message_size: server.max_message_size,
            mode: overrides.mode.unwrap_or(crypto.mode),
            secret: overrides.secret.clone().unwrap_or(crypto.secret),
        }
    }

    pub fn validate(&self) -> WstResult<()> {
        if !self.ws_path.starts_with('/') {
            return Err(WstError::Config(format!(
                "ws_path must start with '/': {}",
                self.ws_path
            )));
        }
        if self.ws_path == "/" {
            return Err(WstError::Config(
                "ws_path cannot be '/', it is reserved for the health check".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(WstError::Config("chunk_size must be > 0".into()));
        }
        if self.max_message_size < self.chunk_size + 64 {
            return Err(WstError::Config(format!(
                "max_message_size {} cannot hold an encrypted chunk of {} bytes",
                self.max_message_size, self.chunk_size
            )));
        }
        if self.connect_timeout.is_zero() || self.handshake_timeout.is_zero() {
            return Err(WstError::Config("timeouts must be > 0".into()));
        }
        Ok(())
    }

    /// `host:port` to bind, with IPv6 literals bracketed.
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn uses_default_secret(&self) -> bool {
        self.mode == CipherMode::Encrypted && self.secret == DEFAULT_SECRET
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

//! Client configuration at `~/.wst/config.toml`.
//!
//! Provides the default server URL, cipher mode and shared secret.
//! CLI flags and environment variables always override config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use wst_core::CipherMode;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub default: DefaultConfig,
}

/// Default connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultConfig {
    /// Server WebSocket URL, including the tunnel path.
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default)]
    pub mode: CipherMode,

    /// Shared secret. Unset means it must come from `--key` or `WST_KEY`.
    #[serde(default)]
    pub key: Option<String>,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            mode: CipherMode::default(),
            key: None,
        }
    }
}

fn default_url() -> String {
    "ws://127.0.0.1:9999/ws".to_string()
}

impl Config {
    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

/// Parse a `host:port` target. IPv6 literals must be bracketed: `[::1]:22`.
pub fn parse_target(target: &str) -> Result<(String, u16)> {
    let (host, port) = target
        .rsplit_once(':')
        .with_context(|| format!("target '{target}' must be host:port"))?;

    let host = match host.strip_prefix('[') {
        Some(inner) => inner
            .strip_suffix(']')
            .with_context(|| format!("unbalanced brackets in target '{target}'"))?,
        None if host.contains(':') => {
            anyhow::bail!("IPv6 target '{target}' must be written as [addr]:port")
        }
        None => host,
    };
    if host.is_empty() {
        anyhow::bail!("empty host in target '{target}'");
    }

    let port: u16 = port
        .parse()
        .with_context(|| format!("invalid port in target '{target}'"))?;
    if port == 0 {
        anyhow::bail!("port 0 is not a valid target port");
    }

    Ok((host.to_string(), port))
}

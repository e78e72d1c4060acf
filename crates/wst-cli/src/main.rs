//! wst: WebSocket tunnel client CLI.
//!
//! Reaches TCP services behind a wst server: forward a local port to a
//! target, or pipe stdin/stdout to one.

mod commands;
mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::error;
use wst_client::{ConnectConfig, TunnelClient};
use wst_core::CipherMode;

use crate::config::{parse_target, Config};

/// wst: WebSocket tunnel client
#[derive(Parser)]
#[command(name = "wst", version, about = "Tunnel TCP connections through a wst server")]
struct Cli {
    /// Server WebSocket URL (e.g. wss://host/ws)
    #[arg(short, long, global = true, env = "WST_URL")]
    url: Option<String>,

    /// Shared secret
    #[arg(short, long, global = true, env = "WST_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Frame cipher: encrypted or plaintext
    #[arg(long, global = true, env = "WST_MODE")]
    mode: Option<CipherMode>,

    /// Seconds allowed for connect + handshake
    #[arg(long, global = true, default_value_t = 10)]
    connect_timeout: u64,

    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Forward a local TCP port to a target through the tunnel
    Forward {
        /// Local address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        listen: String,
        /// Target as host:port (reachable from the server)
        target: String,
    },

    /// Connect stdin/stdout to a target through the tunnel
    Pipe {
        /// Target as host:port (reachable from the server)
        target: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("wst=debug,wst_cli=debug,wst_client=debug,wst_core=debug")
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("wst=warn,wst_cli=warn,wst_client=warn")
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("wst: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_default()
            .join(".wst")
            .join("config.toml")
    });
    let cfg = Config::load(&config_path)?;

    // CLI and environment override the config file.
    let url = cli.url.unwrap_or(cfg.default.url);
    let mode = cli.mode.unwrap_or(cfg.default.mode);
    let key = match (cli.key.or(cfg.default.key), mode) {
        (Some(key), _) => key,
        (None, CipherMode::Plaintext) => String::new(),
        (None, CipherMode::Encrypted) => {
            anyhow::bail!("no shared secret: pass --key, set WST_KEY or add `key` to the config")
        }
    };

    let connect = ConnectConfig::new(mode, &key)
        .with_timeout(Duration::from_secs(cli.connect_timeout.max(1)));
    let client = TunnelClient::new(url, connect);

    match cli.command {
        Command::Forward { listen, target } => {
            let (host, port) = parse_target(&target)?;
            commands::forward::run(client, &listen, &host, port).await
        }
        Command::Pipe { target } => {
            let (host, port) = parse_target(&target)?;
            commands::pipe::run(client, &host, port)
                .await
                .context("pipe failed")
        }
    }
}

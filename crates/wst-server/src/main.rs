//! wst-server: WebSocket tunnel server.
//!
//! Serves a health check on `/` and tunnels on the WebSocket path, all on
//! one port.

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use wst_core::CipherMode;
use wst_server::{ConfigOverrides, ServerConfig, TunnelServer};

/// wst-server: WebSocket tunnel server
#[derive(Parser, Debug)]
#[command(name = "wst-server", version, about = "WebSocket tunnel server")]
struct Cli {
    /// Listen address
    #[arg(long, env = "WST_HOST")]
    host: Option<String>,

    /// Listen port
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Shared secret the session key is derived from
    #[arg(short, long, env = "WST_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Frame cipher mode (encrypted, plaintext)
    #[arg(long, env = "WST_MODE")]
    mode: Option<CipherMode>,

    /// WebSocket endpoint path
    #[arg(long)]
    ws_path: Option<String>,

    /// Seconds to wait for the HTTP request and handshake frame
    #[arg(long)]
    handshake_timeout: Option<u64>,

    /// Seconds to wait for the target connection
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Config file path
    #[arg(long, default_value = "~/.wst/server.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting wst-server");

    let overrides = ConfigOverrides {
        host: cli.host,
        port: cli.port,
        secret: cli.key,
        mode: cli.mode,
        ws_path: cli.ws_path,
        handshake_timeout: cli.handshake_timeout,
        connect_timeout: cli.connect_timeout,
    };
    let config_path = PathBuf::from(&cli.config);
    let server_config = match ServerConfig::load(Some(&config_path), &overrides) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let server = match TunnelServer::bind(server_config).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    info!("wst-server stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}

//! rsh Server Daemon
//!
//! Accepts reverse tunnels from agents, keeps the fleet registry, and
//! exposes the HTTP dispatch surface.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rsh_core::config::{self, ServerConfig};
use rsh_core::tls;
use rsh_server::http::{router, AppState};
use rsh_server::listener::{run_listener, run_unix_listener};
use rsh_server::FleetRegistry;

#[derive(Parser)]
#[command(name = "rsh-server")]
#[command(about = "rsh reverse-tunnel server")]
#[command(version)]
struct Args {
    /// Listen address for tunnels (host, or unix://path)
    #[arg(short = 'a', long, default_value = "127.0.0.1")]
    address: String,

    /// Listen port for tunnels
    #[arg(short = 'p', long, default_value_t = 22222)]
    port: u16,

    /// Listen address for the HTTP surface
    #[arg(long, default_value = "127.0.0.1:8080")]
    http: String,

    /// CA certificate file
    #[arg(long)]
    ca: Option<PathBuf>,

    /// Server certificate file
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Server key file
    #[arg(long)]
    key: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("rsh server starting...");

    let mut config = if let Some(config_path) = &args.config {
        config::load_config::<ServerConfig>(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        ServerConfig::default()
    };

    // Command-line flags override the file for anything explicitly set
    if args.address != "127.0.0.1" || config.address.is_empty() {
        config.address = args.address;
    }
    if args.port != 22222 {
        config.port = args.port;
    }
    if args.http != "127.0.0.1:8080" || config.http.is_empty() {
        config.http = args.http;
    }
    if let Some(ca) = args.ca {
        config.tls.ca = Some(ca);
    }
    if let Some(cert) = args.cert {
        config.tls.cert = Some(cert);
    }
    if let Some(key) = args.key {
        config.tls.key = Some(key);
    }

    let acceptor = if config.tls.is_configured() {
        Some(tls::acceptor(&config.tls).context("Failed to build TLS acceptor")?)
    } else {
        tracing::warn!("no TLS material configured, accepting tunnels in the clear");
        None
    };

    let registry = Arc::new(FleetRegistry::new());
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                cancel.cancel();
            }
        });
    }

    // Tunnel listener: unix socket or TCP
    if let Some(path) = config.address.strip_prefix("unix://") {
        let listener = tokio::net::UnixListener::bind(path)
            .with_context(|| format!("Failed to bind unix socket {}", path))?;
        tracing::info!(%path, "accepting tunnels on unix socket");
        let registry = Arc::clone(&registry);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = run_unix_listener(listener, acceptor, registry, cancel).await {
                tracing::error!(error = %e, "tunnel listener failed");
            }
        });
    } else {
        let listen_addr = config.listen_addr();
        let listener = tokio::net::TcpListener::bind(&listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", listen_addr))?;
        tracing::info!(%listen_addr, "accepting tunnels");
        let registry = Arc::clone(&registry);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = run_listener(listener, acceptor, registry, cancel).await {
                tracing::error!(error = %e, "tunnel listener failed");
            }
        });
    }

    // HTTP surface
    let app = router(AppState {
        registry: Arc::clone(&registry),
    });
    let http_listener = tokio::net::TcpListener::bind(&config.http)
        .await
        .with_context(|| format!("Failed to bind HTTP listener {}", config.http))?;
    tracing::info!(http = %config.http, "serving HTTP");

    axum::serve(http_listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("HTTP server failed")?;

    Ok(())
}

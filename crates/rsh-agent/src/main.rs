//! rsh Agent Daemon
//!
//! Runs on target machines, dials out to one or more rsh servers and serves
//! shell sessions over the resulting reverse tunnels. Can additionally serve
//! sessions on a listening socket with `--listen`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rsh_agent::session::ShellDefaults;
use rsh_core::config::{self, AgentConfig, DEFAULT_SERVER_ADDRESSES, LAST_RESORT_SHELL};

#[derive(Parser)]
#[command(name = "rsh-agent")]
#[command(about = "rsh agent daemon")]
#[command(version)]
struct Args {
    /// Comma-separated server addresses to dial
    #[arg(short = 'a', long = "addresses", default_value = DEFAULT_SERVER_ADDRESSES)]
    addresses: String,

    /// Default shell for sessions that start with an empty command
    #[arg(short = 's', long)]
    shell: Option<String>,

    /// CA certificate file
    #[arg(long)]
    ca: Option<PathBuf>,

    /// Client certificate file
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Client key file
    #[arg(long)]
    key: Option<PathBuf>,

    /// Serve sessions directly on this address as well
    #[arg(short = 'l', long)]
    listen: Option<String>,

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

    tracing::info!("rsh agent starting...");

    // Load configuration, then apply command-line overrides
    let mut config = if let Some(config_path) = &args.config {
        config::load_config::<AgentConfig>(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        AgentConfig::default()
    };

    if args.addresses != DEFAULT_SERVER_ADDRESSES || config.servers.is_empty() {
        config.servers = args.addresses.clone();
    }
    if let Some(shell) = args.shell {
        config.shell = shell;
    }
    if config.shell.is_empty() {
        config.shell = LAST_RESORT_SHELL.to_string();
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
    if args.listen.is_some() {
        config.listen = args.listen;
    }

    tracing::info!(servers = %config.servers, shell = %config.shell, "configuration loaded");

    let cancel = CancellationToken::new();

    // Ctrl-C triggers a clean shutdown
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                cancel.cancel();
            }
        });
    }

    // Optional direct listener (forward topology)
    if let Some(listen) = &config.listen {
        let listener = tokio::net::TcpListener::bind(listen)
            .await
            .with_context(|| format!("Failed to bind direct listener on {}", listen))?;
        tracing::info!(%listen, "serving direct sessions");
        let defaults = Arc::new(ShellDefaults::new(
            config.shell.clone(),
            config.shell_args.clone(),
        ));
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = rsh_agent::direct::serve_listener(listener, defaults, cancel).await {
                tracing::error!(error = %e, "direct listener failed");
            }
        });
    }

    rsh_agent::tunnel::run(config, cancel)
        .await
        .context("tunnel loop failed")?;

    Ok(())
}

//! rsh interactive client
//!
//! Runs a command on a directly reachable session host (an agent with
//! `--listen`), optionally under a remote PTY with the local terminal in raw
//! mode.

mod exec;
mod terminal;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rsh_core::config::TlsPaths;
use rsh_core::net::parse_target;
use rsh_core::tls;

use exec::ExecOptions;

#[derive(Parser)]
#[command(name = "rsh")]
#[command(about = "Run a command on a remote rsh session host")]
#[command(version)]
struct Args {
    /// Session host address (host:port, tls://, https://, or unix://path)
    #[arg(short = 'a', long, default_value = "127.0.0.1:22222")]
    address: String,

    /// Allocate a remote pseudo-terminal and run interactively
    #[arg(short = 't', long)]
    terminal: bool,

    /// Merge stdout+stderr and print them once on completion
    #[arg(long)]
    combined: bool,

    /// CA certificate file
    #[arg(long)]
    ca: Option<PathBuf>,

    /// Client certificate file
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Client key file
    #[arg(long)]
    key: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Command and arguments (empty runs the host's default shell)
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let target = parse_target(&args.address).context("parse address")?;

    let tls_paths = TlsPaths {
        ca: args.ca,
        cert: args.cert,
        key: args.key,
    };
    let connector = if tls_paths.ca.is_some() {
        Some(tls::connector(&tls_paths).context("build TLS connector")?)
    } else {
        None
    };

    let mut command = args.command.into_iter();
    let opts = ExecOptions {
        terminal: args.terminal,
        combined_output: args.combined,
        command: command.next().unwrap_or_default(),
        args: command.collect(),
    };

    let exit_code = exec::exec(&target, connector.as_ref(), opts).await?;
    std::process::exit(exit_code);
}

//! Tunnel accept loop
//!
//! Accepts inbound connections over TCP or a unix socket, performs the TLS
//! handshake when configured, applies the certificate admission check, and
//! hands each connection to the tunnel driver.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, UnixListener};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use rsh_core::net::SessionIo;
use rsh_core::{tls, ConnectionError};

use crate::registry::FleetRegistry;
use crate::tunnel::run_tunnel;

/// Subject CN an authenticated peer must present.
pub const REQUIRED_PEER_CN: &str = "root";

/// TLS handshake deadline per connection.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept tunnels on a TCP listener until cancelled.
pub async fn run_listener(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    registry: Arc<FleetRegistry>,
    cancel: CancellationToken,
) -> Result<(), ConnectionError> {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                let acceptor = acceptor.clone();
                let registry = Arc::clone(&registry);
                let cancel = cancel.child_token();
                tokio::spawn(handle_connection(
                    stream,
                    peer.to_string(),
                    acceptor,
                    registry,
                    cancel,
                ));
            }
            Err(e) => tracing::warn!(error = %e, "accept failed"),
        }
    }
}

/// Accept tunnels on a unix socket listener until cancelled.
pub async fn run_unix_listener(
    listener: UnixListener,
    acceptor: Option<TlsAcceptor>,
    registry: Arc<FleetRegistry>,
    cancel: CancellationToken,
) -> Result<(), ConnectionError> {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, _)) => {
                let acceptor = acceptor.clone();
                let registry = Arc::clone(&registry);
                let cancel = cancel.child_token();
                tokio::spawn(handle_connection(
                    stream,
                    "unix".to_string(),
                    acceptor,
                    registry,
                    cancel,
                ));
            }
            Err(e) => tracing::warn!(error = %e, "accept failed"),
        }
    }
}

/// Handshake and admission for one inbound connection, then run the tunnel.
async fn handle_connection<S: SessionIo + 'static>(
    stream: S,
    peer: String,
    acceptor: Option<TlsAcceptor>,
    registry: Arc<FleetRegistry>,
    cancel: CancellationToken,
) {
    match serve_peer(stream, peer.clone(), acceptor, registry, cancel).await {
        Ok(()) => {}
        Err(ConnectionError::Auth(peer_cn)) => {
            tracing::warn!(
                peer = %peer,
                peer_cn = ?peer_cn,
                "tunnel rejected: unauthorized certificate CN"
            );
        }
        Err(ConnectionError::HandshakeTimeout) => {
            tracing::warn!(peer = %peer, "connection closed: handshake or hello timed out");
        }
        Err(e) => tracing::warn!(peer = %peer, error = %e, "tunnel connection failed"),
    }
}

async fn serve_peer<S: SessionIo + 'static>(
    stream: S,
    peer: String,
    acceptor: Option<TlsAcceptor>,
    registry: Arc<FleetRegistry>,
    cancel: CancellationToken,
) -> Result<(), ConnectionError> {
    match acceptor {
        Some(acceptor) => {
            let tls_stream = tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream))
                .await
                .map_err(|_| ConnectionError::HandshakeTimeout)?
                .map_err(ConnectionError::Transport)?;

            // An auth failure returns here, dropping the stream and closing
            // the tunnel before any registration happens
            let peer_cn = admit(&tls_stream)?;

            run_tunnel(Box::new(tls_stream), registry, peer, peer_cn, cancel).await
        }
        None => run_tunnel(Box::new(stream), registry, peer, None, cancel).await,
    }
}

/// Admission check: a presented certificate chain must lead with a
/// certificate whose Subject CN is [`REQUIRED_PEER_CN`]. Connections
/// without a client certificate pass and stay anonymous at the TLS layer.
fn admit<S>(
    tls_stream: &tokio_rustls::server::TlsStream<S>,
) -> Result<Option<String>, ConnectionError> {
    let conn = &tls_stream.get_ref().1;
    match conn.peer_certificates() {
        Some(chain) if !chain.is_empty() => {
            let peer_cn = tls::peer_common_name(chain);
            if peer_cn.as_deref() == Some(REQUIRED_PEER_CN) {
                Ok(peer_cn)
            } else {
                Err(ConnectionError::Auth(peer_cn))
            }
        }
        _ => Ok(None),
    }
}

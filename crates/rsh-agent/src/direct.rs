//! Direct session listener (forward topology)
//!
//! Serves the session protocol on an inbound socket for agents that are
//! directly reachable, reusing the same per-connection loop the reverse
//! tunnels use.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use rsh_core::ConnectionError;

use crate::serve::serve_connection;
use crate::session::ShellDefaults;

/// Accept direct session connections until cancelled.
pub async fn serve_listener(
    listener: TcpListener,
    defaults: Arc<ShellDefaults>,
    cancel: CancellationToken,
) -> Result<(), ConnectionError> {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                tracing::info!(%peer, "direct session connection");
                let defaults = Arc::clone(&defaults);
                let conn_cancel = cancel.child_token();
                tokio::spawn(async move {
                    if let Err(e) =
                        serve_connection(Box::new(stream), defaults, conn_cancel, None).await
                    {
                        tracing::warn!(%peer, error = %e, "direct connection failed");
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
            }
        }
    }
}

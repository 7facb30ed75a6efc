//! Outbound connection management
//!
//! Tracks live server connections deduplicated by address string. Dialing
//! and scheme parsing live in `rsh_core::net`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;

use rsh_core::net::{dial, parse_target, Target};
use rsh_core::{BoxedIo, ConnectionError};

/// A live connection tracked by the manager.
pub struct TrackedConnection {
    pub address: String,
    pub target: Target,
    /// Cancelling tears the connection's serve loop down
    pub cancel: CancellationToken,
}

/// Deduplicates outbound connections by address string.
pub struct ConnectionManager {
    tls: Option<TlsConnector>,
    parent: CancellationToken,
    conns: Mutex<HashMap<String, Arc<TrackedConnection>>>,
}

impl ConnectionManager {
    pub fn new(tls: Option<TlsConnector>, parent: CancellationToken) -> Self {
        Self {
            tls,
            parent,
            conns: Mutex::new(HashMap::new()),
        }
    }

    /// Connect to an address, deduplicating by the address string.
    ///
    /// A fresh dial returns the tracked handle together with the established
    /// stream; if a live connection already exists its handle is returned
    /// with no new stream.
    pub async fn connect(
        &self,
        address: &str,
    ) -> Result<(Arc<TrackedConnection>, Option<BoxedIo>), ConnectionError> {
        let target = parse_target(address)?;

        let mut conns = self.conns.lock().await;
        if let Some(existing) = conns.get(address) {
            return Ok((Arc::clone(existing), None));
        }

        let io = dial(&target, self.tls.as_ref()).await?;
        let tracked = Arc::new(TrackedConnection {
            address: address.to_string(),
            target,
            cancel: self.parent.child_token(),
        });
        conns.insert(address.to_string(), Arc::clone(&tracked));
        Ok((tracked, Some(io)))
    }

    /// Tear down exactly one connection. Returns whether it existed.
    pub async fn close_connection(&self, address: &str) -> bool {
        if let Some(conn) = self.conns.lock().await.remove(address) {
            conn.cancel.cancel();
            true
        } else {
            false
        }
    }

    /// Tear down all connections and empty the map.
    pub async fn close(&self) {
        for (_, conn) in self.conns.lock().await.drain() {
            conn.cancel.cancel();
        }
    }

    /// Number of tracked connections.
    pub async fn len(&self) -> usize {
        self.conns.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conns.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manager_dedup_and_close() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("{}", listener.local_addr().unwrap());

        // Keep accepting so dials complete
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });

        let manager = ConnectionManager::new(None, CancellationToken::new());

        let (first, io) = manager.connect(&addr).await.unwrap();
        assert!(io.is_some(), "fresh dial yields a stream");
        assert_eq!(manager.len().await, 1);

        let (second, io) = manager.connect(&addr).await.unwrap();
        assert!(io.is_none(), "second connect reuses the live connection");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.len().await, 1);

        assert!(manager.close_connection(&addr).await);
        assert!(first.cancel.is_cancelled());
        assert!(manager.is_empty().await);
        assert!(!manager.close_connection(&addr).await);
    }

    #[tokio::test]
    async fn test_manager_connect_refused() {
        let manager = ConnectionManager::new(None, CancellationToken::new());
        // Nothing listens on this port of the discard range
        let result = manager.connect("127.0.0.1:1").await;
        assert!(matches!(result, Err(ConnectionError::Transport(_))));
        assert!(manager.is_empty().await, "failed dial leaves no entry");
    }
}

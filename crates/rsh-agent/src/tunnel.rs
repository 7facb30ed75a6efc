//! Reverse tunnel dialing
//!
//! One independent dial loop per configured server address. Each loop
//! connects, announces the agent's identity, serves sessions until the
//! transport dies, and reconnects forever with fixed-base jittered backoff.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use rsh_core::{tls, AgentConfig, ConnectionError, RshError};
use rsh_protocol::{Frame, Message};

use crate::conn::ConnectionManager;
use crate::serve::serve_connection;
use crate::session::ShellDefaults;

/// Reconnect policy: fixed 2s base, jitter up to 3s, capped at 5s,
/// unbounded retries.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: Duration,
}

impl Backoff {
    /// Create a backoff with custom parameters
    pub fn new(base: Duration, max: Duration, jitter: Duration) -> Self {
        Self { base, max, jitter }
    }

    /// The policy used for server reconnects
    pub fn default_policy() -> Self {
        Self::new(
            Duration::from_secs(2),
            Duration::from_secs(5),
            Duration::from_secs(3),
        )
    }

    /// Get the next delay
    pub fn next_delay(&self) -> Duration {
        let jitter = self.jitter.mul_f64(rand::random::<f64>());
        std::cmp::min(self.base + jitter, self.max)
    }
}

/// Dial every configured server and serve sessions over the resulting
/// tunnels until cancelled. An empty address list returns immediately.
pub async fn run(config: AgentConfig, cancel: CancellationToken) -> Result<(), RshError> {
    let addresses: Vec<String> = config
        .servers
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if addresses.is_empty() {
        return Ok(());
    }

    let tls = if config.tls.ca.is_some() {
        Some(tls::connector(&config.tls)?)
    } else {
        None
    };

    let manager = Arc::new(ConnectionManager::new(tls, cancel.clone()));
    let defaults = Arc::new(ShellDefaults::new(
        config.shell.clone(),
        config.shell_args.clone(),
    ));
    let agent_id = rsh_core::identity::node_id();
    tracing::info!(%agent_id, "agent identity resolved");

    let mut tasks = JoinSet::new();
    for address in addresses {
        let manager = Arc::clone(&manager);
        let defaults = Arc::clone(&defaults);
        let agent_id = agent_id.clone();
        let cancel = cancel.clone();
        tasks.spawn(dial_loop(manager, address, agent_id, defaults, cancel));
    }
    while tasks.join_next().await.is_some() {}

    manager.close().await;
    Ok(())
}

/// Connect to a single address and serve it, reconnecting forever.
async fn dial_loop(
    manager: Arc<ConnectionManager>,
    address: String,
    agent_id: String,
    defaults: Arc<ShellDefaults>,
    cancel: CancellationToken,
) {
    let backoff = Backoff::default_policy();

    loop {
        if cancel.is_cancelled() {
            return;
        }

        match manager.connect(&address).await {
            Ok((tracked, Some(io))) => {
                tracing::info!(%address, "connected to server");
                let hello = Frame::control(Message::Hello {
                    agent_id: Some(agent_id.clone()),
                });
                match serve_connection(
                    io,
                    Arc::clone(&defaults),
                    tracked.cancel.clone(),
                    Some(hello),
                )
                .await
                {
                    Ok(()) => tracing::info!(%address, "tunnel closed"),
                    Err(e) => tracing::warn!(%address, error = %e, "tunnel failed"),
                }
                manager.close_connection(&address).await;
            }
            Ok((_, None)) => {
                // Another loop owns a live connection to this address
                tracing::debug!(%address, "address already connected");
            }
            Err(ConnectionError::UnknownScheme(scheme)) => {
                tracing::error!(%address, %scheme, "unknown scheme, giving up on address");
                return;
            }
            Err(e) => {
                tracing::warn!(%address, error = %e, "dial failed");
            }
        }

        let delay = backoff.next_delay();
        tracing::debug!(%address, ?delay, "reconnecting after delay");
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_within_bounds() {
        let backoff = Backoff::default_policy();
        for _ in 0..100 {
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_secs(2));
            assert!(delay <= Duration::from_secs(5));
        }
    }

    #[test]
    fn test_backoff_no_jitter_is_fixed() {
        let backoff = Backoff::new(
            Duration::from_secs(2),
            Duration::from_secs(5),
            Duration::ZERO,
        );
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_backoff_capped_at_max() {
        let backoff = Backoff::new(
            Duration::from_secs(4),
            Duration::from_secs(5),
            Duration::from_secs(10),
        );
        for _ in 0..100 {
            assert!(backoff.next_delay() <= Duration::from_secs(5));
        }
    }

    #[tokio::test]
    async fn test_run_with_no_targets_returns_immediately() {
        let config = AgentConfig {
            servers: String::new(),
            ..AgentConfig::default()
        };
        run(config, CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_run_with_blank_targets_returns_immediately() {
        let config = AgentConfig {
            servers: " , ,".to_string(),
            ..AgentConfig::default()
        };
        run(config, CancellationToken::new()).await.unwrap();
    }
}

//! Tunnel fleet registry
//!
//! Concurrent mapping from agent identity to its open reverse tunnel.
//! Re-registration overwrites; removal is guarded by the tunnel sequence
//! number so a superseded tunnel's close cannot evict its replacement.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::tunnel::TunnelHandle;

/// Registry of open tunnels keyed by agent id.
pub struct FleetRegistry {
    tunnels: DashMap<String, Arc<TunnelHandle>>,
    next_seq: AtomicU64,
}

impl FleetRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            tunnels: DashMap::new(),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Allocate a sequence number for a fresh tunnel.
    pub fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Register a tunnel, overwriting any prior entry for the same id.
    pub fn insert(&self, agent_id: String, handle: Arc<TunnelHandle>) {
        if let Some(replaced) = self.tunnels.insert(agent_id, handle) {
            tracing::info!(
                agent_id = ?replaced.agent_id,
                old_seq = replaced.seq,
                "tunnel re-registration replaced prior entry"
            );
        }
    }

    /// Remove the entry for an id, but only if it still belongs to the
    /// closing tunnel. Returns whether an entry was removed.
    pub fn remove(&self, agent_id: &str, seq: u64) -> bool {
        self.tunnels
            .remove_if(agent_id, |_, handle| handle.seq == seq)
            .is_some()
    }

    /// Look up the current tunnel for an agent.
    pub fn get(&self, agent_id: &str) -> Option<Arc<TunnelHandle>> {
        self.tunnels.get(agent_id).map(|r| Arc::clone(&r))
    }

    /// List all registered tunnels.
    pub fn list(&self) -> Vec<Arc<TunnelHandle>> {
        self.tunnels.iter().map(|r| Arc::clone(&r)).collect()
    }

    /// Number of registered tunnels.
    pub fn len(&self) -> usize {
        self.tunnels.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tunnels.is_empty()
    }
}

impl Default for FleetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn test_tunnel(seq: u64, id: &str) -> Arc<TunnelHandle> {
        let (frame_tx, _frame_rx) = mpsc::channel(1);
        Arc::new(TunnelHandle::new(
            seq,
            Some(id.to_string()),
            format!("{}.local:1", id),
            Some("root".to_string()),
            frame_tx,
        ))
    }

    #[test]
    fn test_registry_new() {
        let registry = FleetRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_insert_and_get() {
        let registry = FleetRegistry::new();
        registry.insert("agent-1".to_string(), test_tunnel(1, "agent-1"));

        assert_eq!(registry.len(), 1);
        let found = registry.get("agent-1").unwrap();
        assert_eq!(found.seq, 1);
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_overwrite_keeps_latest() {
        let registry = FleetRegistry::new();
        registry.insert("agent-1".to_string(), test_tunnel(1, "agent-1"));
        registry.insert("agent-1".to_string(), test_tunnel(2, "agent-1"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("agent-1").unwrap().seq, 2);
    }

    #[test]
    fn test_stale_close_does_not_evict_replacement() {
        let registry = FleetRegistry::new();
        registry.insert("agent-1".to_string(), test_tunnel(1, "agent-1"));
        registry.insert("agent-1".to_string(), test_tunnel(2, "agent-1"));

        // The first tunnel closing must not remove the second
        assert!(!registry.remove("agent-1", 1));
        assert_eq!(registry.get("agent-1").unwrap().seq, 2);

        // The second tunnel closing removes its own entry
        assert!(registry.remove("agent-1", 2));
        assert!(registry.get("agent-1").is_none());
    }

    #[test]
    fn test_remove_nonexistent() {
        let registry = FleetRegistry::new();
        assert!(!registry.remove("nonexistent", 1));
    }

    #[test]
    fn test_list() {
        let registry = FleetRegistry::new();
        registry.insert("a".to_string(), test_tunnel(1, "a"));
        registry.insert("b".to_string(), test_tunnel(2, "b"));
        registry.insert("c".to_string(), test_tunnel(3, "c"));

        let ids: Vec<String> = registry
            .list()
            .iter()
            .filter_map(|t| t.agent_id.clone())
            .collect();
        assert_eq!(ids.len(), 3);
        for id in ["a", "b", "c"] {
            assert!(ids.iter().any(|i| i == id));
        }
    }
}

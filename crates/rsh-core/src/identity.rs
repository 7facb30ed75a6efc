//! Agent identity resolution
//!
//! Resolution order (first non-empty wins): `NODE_ID` environment variable,
//! OS hostname, the platform machine-id, a fresh UUID.

use std::path::Path;

/// Resolve this node's identity.
pub fn node_id() -> String {
    if let Ok(id) = std::env::var("NODE_ID") {
        if !id.is_empty() {
            return id;
        }
    }

    let hostname = gethostname::gethostname().to_string_lossy().into_owned();
    if !hostname.is_empty() {
        return hostname;
    }

    if let Some(id) = machine_id() {
        return id;
    }

    uuid::Uuid::new_v4().to_string()
}

/// Read the platform machine-id, if present.
fn machine_id() -> Option<String> {
    for path in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
        if let Ok(content) = std::fs::read_to_string(Path::new(path)) {
            let id = content.trim();
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_resolution() {
        // Single test to avoid races on the process environment.
        std::env::set_var("NODE_ID", "test-node-id");
        assert_eq!(node_id(), "test-node-id");

        std::env::remove_var("NODE_ID");
        assert!(!node_id().is_empty());
    }
}

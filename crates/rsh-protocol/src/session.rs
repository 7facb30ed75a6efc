//! Session identification and allocation
//!
//! Frames are multiplexed over one connection by session id. Id 0 is the
//! control channel (`Hello`, `Ping`, `Pong`); shell sessions get non-zero
//! ids handed out by the peer that initiates them — the server on a reverse
//! tunnel, the client on a direct connection. Ids grow monotonically, which
//! the session host relies on to tell a mis-started session from late input
//! racing a finished one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Identifier of one shell session within a connection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SessionId(pub u32);

impl SessionId {
    /// The control channel: identity announcements and liveness probes.
    /// Never assigned to a shell session.
    pub const CONTROL: SessionId = SessionId(0);

    /// Create a session ID from its raw value
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Whether this is the control channel rather than a shell session.
    pub fn is_control(&self) -> bool {
        *self == Self::CONTROL
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SessionId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Hands out session ids for one connection, starting at 1 and never
/// returning the control id.
#[derive(Debug, Default)]
pub struct SessionIdAllocator {
    next: AtomicU32,
}

impl SessionIdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    /// Allocate the next session id.
    pub fn next(&self) -> SessionId {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            // Skip the control id if the counter ever wraps
            if id != 0 {
                return SessionId::new(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_id() {
        assert!(SessionId::CONTROL.is_control());
        assert!(!SessionId::new(1).is_control());
        assert_eq!(SessionId::CONTROL.as_u32(), 0);
    }

    #[test]
    fn test_ids_are_ordered() {
        // The session host tracks its high-water mark with plain comparison
        let mut high_water = SessionId::CONTROL;
        for raw in [1u32, 2, 5] {
            let id = SessionId::new(raw);
            assert!(id > high_water);
            high_water = high_water.max(id);
        }
        assert_eq!(high_water, SessionId::new(5));
    }

    #[test]
    fn test_allocator_starts_past_control() {
        let allocator = SessionIdAllocator::new();
        assert_eq!(allocator.next(), SessionId::new(1));
        assert_eq!(allocator.next(), SessionId::new(2));
    }

    #[test]
    fn test_allocator_skips_control_on_wrap() {
        let allocator = SessionIdAllocator {
            next: AtomicU32::new(u32::MAX),
        };
        assert_eq!(allocator.next(), SessionId::new(u32::MAX));
        // The counter wraps onto 0 here; the control id must not escape
        assert_eq!(allocator.next(), SessionId::new(1));
    }
}

//! rsh-server: Reverse-tunnel server for rsh
//!
//! Accepts outbound tunnels from agents, keeps an addressable registry of
//! them keyed by agent identity, and dispatches shell sessions down the
//! tunnels. A small HTTP surface demonstrates dispatch.

pub mod dispatch;
pub mod http;
pub mod listener;
pub mod registry;
pub mod tunnel;

pub use dispatch::{dispatch, OutputChunk};
pub use registry::FleetRegistry;
pub use tunnel::{SessionEvent, SessionStream, TunnelHandle};

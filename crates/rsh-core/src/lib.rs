//! rsh-core: Core abstractions and configuration for rsh
//!
//! This crate provides the shared error taxonomy, configuration structures,
//! agent identity resolution, and TLS material loading used by the agent,
//! server, and CLI components.

pub mod config;
pub mod error;
pub mod identity;
pub mod net;
pub mod tls;

pub use config::{AgentConfig, ServerConfig};
pub use error::{ConnectionError, DispatchError, RshError, SessionError};
pub use identity::node_id;
pub use net::BoxedIo;

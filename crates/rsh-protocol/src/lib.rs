//! rsh-protocol: Wire protocol for rsh session multiplexing
//!
//! This crate defines the binary protocol spoken on every rsh transport:
//! reverse tunnels from agents to servers, and direct connections from the
//! interactive client to an agent.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod session;

pub use codec::{Frame, FrameCodec};
pub use error::ProtocolError;
pub use frame::{FrameHeader, HEADER_SIZE, MAX_CONTROL_PAYLOAD, MAX_PAYLOAD_SIZE};
pub use message::{ErrorCode, Input, Message, MessageType, Output};
pub use session::{SessionId, SessionIdAllocator};

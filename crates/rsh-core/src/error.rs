//! Core error types for rsh

use rsh_protocol::{ErrorCode, ProtocolError};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the rsh ecosystem
#[derive(Error, Debug)]
pub enum RshError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Dispatch error
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connection-related errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Transport failure while dialing, accepting, or on an open stream
    #[error("Transport error: {0}")]
    Transport(#[source] std::io::Error),

    /// Peer certificate failed admission (wrong Subject CN)
    #[error("Peer rejected: certificate CN {0:?} is not authorized")]
    Auth(Option<String>),

    /// The peer never completed the opening handshake
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// Address carries a scheme this build does not understand
    #[error("Unknown address scheme: {0}")]
    UnknownScheme(String),

    /// Protocol violation on the connection
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Session-related errors.
///
/// Command-not-found is deliberately absent: it is a normal session outcome
/// (exit code 127), not an error.
#[derive(Error, Debug)]
pub enum SessionError {
    /// First input did not set `start`, or set contradictory flags
    #[error("Invalid session start: {0}")]
    InvalidStart(String),

    /// PTY pair allocation failed
    #[error("PTY allocation failed: {0}")]
    PtyOpen(String),

    /// Child spawn failed for a reason other than executable-not-found
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    /// SIGWINCH payload was too short or structurally unparsable
    #[error("Malformed window-size payload: {0}")]
    MalformedSignal(String),

    /// Internal I/O or signalling failure within the session
    #[error("Session failed: {0}")]
    Internal(String),
}

impl SessionError {
    /// Map to the wire-level error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::InvalidStart(_) => ErrorCode::InvalidStart,
            SessionError::PtyOpen(_) => ErrorCode::PtyOpen,
            SessionError::SpawnFailed(_) => ErrorCode::SpawnFailed,
            SessionError::MalformedSignal(_) => ErrorCode::MalformedSignal,
            SessionError::Internal(_) => ErrorCode::Internal,
        }
    }
}

/// Dispatch-related errors
#[derive(Error, Debug)]
pub enum DispatchError {
    /// No registered tunnel for the requested agent id
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// The command line could not be split into words
    #[error("Invalid command line: {0}")]
    InvalidCommand(String),

    /// The tunnel died mid-session
    #[error("Tunnel transport failed: {0}")]
    Transport(String),

    /// The remote session aborted with an error
    #[error("Remote session failed: {0}")]
    Remote(String),

    /// The caller's deadline expired before the session finished
    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// TLS material could not be loaded or assembled
    #[error("TLS error: {0}")]
    Tls(String),
}

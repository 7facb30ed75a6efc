//! Message types for the rsh protocol

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Message type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Identity announcement (agent → server, first frame on a tunnel)
    Hello = 0x01,
    /// Session input: invocation, stdin bytes, or a signal
    Input = 0x02,
    /// Session output: stdout/stderr chunks or the terminal exit report
    Output = 0x03,
    /// Abort a session (initiator → host)
    Cancel = 0x04,
    /// Liveness probe
    Ping = 0x05,
    /// Liveness probe acknowledgment
    Pong = 0x06,
    /// Session aborted with an error
    Error = 0xFF,
}

impl MessageType {
    /// Convert to u8
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Hello),
            0x02 => Some(Self::Input),
            0x03 => Some(Self::Output),
            0x04 => Some(Self::Cancel),
            0x05 => Some(Self::Ping),
            0x06 => Some(Self::Pong),
            0xFF => Some(Self::Error),
            _ => None,
        }
    }

    /// Whether this type rides the control channel (session 0) rather than
    /// a shell session.
    pub fn is_control(&self) -> bool {
        matches!(self, Self::Hello | Self::Ping | Self::Pong)
    }
}

/// Error codes carried by error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    /// First input of a session did not set `start`, or set contradictory flags
    InvalidStart = 1,
    /// PTY pair allocation failed
    PtyOpen = 2,
    /// Child process spawn failed (other than executable-not-found)
    SpawnFailed = 3,
    /// SIGWINCH payload was too short or structurally unparsable
    MalformedSignal = 4,
    /// Internal session failure
    Internal = 5,
}

/// A single client → host message within a session.
///
/// The first input of a session must have `start = true` and carries the
/// invocation; every later input carries either stdin bytes (`signal == 0`)
/// or a signal number. When `signal` is SIGWINCH, `bytes` holds the ASCII
/// window size `"<cols> <rows> <xpixels> <ypixels>"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub start: bool,
    pub command: String,
    pub args: Vec<String>,
    /// Request a pseudo-terminal for the session
    pub terminal: bool,
    /// Batch mode: merge stdout+stderr into one final output
    pub combined_output: bool,
    pub bytes: Bytes,
    /// POSIX signal number; 0 means no signal
    pub signal: i32,
}

impl Input {
    /// Build the initial message of a session.
    pub fn start(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            start: true,
            command: command.into(),
            args,
            ..Self::default()
        }
    }

    /// Build a stdin payload message.
    pub fn bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            ..Self::default()
        }
    }

    /// Build a signal message.
    pub fn signal(signal: i32) -> Self {
        Self {
            signal,
            ..Self::default()
        }
    }
}

/// A single host → client message within a session.
///
/// `exited = true` marks the terminal message; nothing follows it. In
/// combined mode the terminal message is also the only message, carrying the
/// merged output. In PTY mode stdout and stderr are merged into the PTY
/// stream and delivered as `stdout`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub stdout: Bytes,
    pub stderr: Bytes,
    pub combined_output: Bytes,
    /// Meaningful only when `exited` is set
    pub exit_code: i32,
    pub exited: bool,
}

impl Output {
    /// Build an incremental stdout chunk.
    pub fn stdout(bytes: impl Into<Bytes>) -> Self {
        Self {
            stdout: bytes.into(),
            ..Self::default()
        }
    }

    /// Build an incremental stderr chunk.
    pub fn stderr(bytes: impl Into<Bytes>) -> Self {
        Self {
            stderr: bytes.into(),
            ..Self::default()
        }
    }

    /// Build the terminal exit message.
    pub fn exited(exit_code: i32) -> Self {
        Self {
            exit_code,
            exited: true,
            ..Self::default()
        }
    }
}

/// Protocol messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Identity announcement. An agent without an id is accepted but cannot
    /// be addressed by dispatch.
    Hello {
        agent_id: Option<String>,
    },

    /// Session input
    Input(Input),

    /// Session output
    Output(Output),

    /// Abort the session; the host kills the child and sends nothing further
    Cancel,

    /// Liveness probe
    Ping {
        /// Timestamp for latency measurement
        timestamp: u64,
    },

    /// Liveness probe acknowledgment
    Pong {
        /// Echo of the original timestamp
        timestamp: u64,
    },

    /// Session aborted with an error
    Error {
        code: ErrorCode,
        message: String,
    },
}

impl Message {
    /// Get the message type for this message
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Hello { .. } => MessageType::Hello,
            Message::Input(_) => MessageType::Input,
            Message::Output(_) => MessageType::Output,
            Message::Cancel => MessageType::Cancel,
            Message::Ping { .. } => MessageType::Ping,
            Message::Pong { .. } => MessageType::Pong,
            Message::Error { .. } => MessageType::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_roundtrip() {
        for msg_type in [
            MessageType::Hello,
            MessageType::Input,
            MessageType::Output,
            MessageType::Cancel,
            MessageType::Ping,
            MessageType::Pong,
            MessageType::Error,
        ] {
            let byte = msg_type.as_u8();
            let recovered = MessageType::from_u8(byte).unwrap();
            assert_eq!(recovered, msg_type);
        }
    }

    #[test]
    fn test_unknown_message_type() {
        assert!(MessageType::from_u8(0x7E).is_none());
    }

    #[test]
    fn test_control_types() {
        for msg_type in [MessageType::Hello, MessageType::Ping, MessageType::Pong] {
            assert!(msg_type.is_control());
        }
        for msg_type in [
            MessageType::Input,
            MessageType::Output,
            MessageType::Cancel,
            MessageType::Error,
        ] {
            assert!(!msg_type.is_control());
        }
    }

    #[test]
    fn test_input_constructors() {
        let start = Input::start("/bin/echo", vec!["hi".to_string()]);
        assert!(start.start);
        assert_eq!(start.command, "/bin/echo");
        assert_eq!(start.signal, 0);

        let data = Input::bytes(&b"abc"[..]);
        assert!(!data.start);
        assert_eq!(data.bytes.as_ref(), b"abc");

        let sig = Input::signal(15);
        assert_eq!(sig.signal, 15);
        assert!(sig.bytes.is_empty());
    }

    #[test]
    fn test_output_exited() {
        let out = Output::exited(127);
        assert!(out.exited);
        assert_eq!(out.exit_code, 127);
        assert!(out.stdout.is_empty() && out.stderr.is_empty());
    }
}

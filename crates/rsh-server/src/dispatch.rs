//! Session dispatch
//!
//! Runs a command on a specific agent over its registered tunnel: looks the
//! tunnel up, splits the command line, opens a session, and pumps output
//! chunks to the caller until the exit report arrives or the deadline
//! expires.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use rsh_core::DispatchError;
use rsh_protocol::Input;

use crate::registry::FleetRegistry;
use crate::tunnel::{SessionEvent, SessionStream};

/// One chunk of remote output.
#[derive(Debug)]
pub enum OutputChunk {
    Stdout(Bytes),
    Stderr(Bytes),
}

impl OutputChunk {
    /// The raw bytes, whichever stream they came from.
    pub fn into_bytes(self) -> Bytes {
        match self {
            OutputChunk::Stdout(bytes) | OutputChunk::Stderr(bytes) => bytes,
        }
    }
}

/// Execute `command_line` on the agent and stream its output.
///
/// The command line is split with POSIX-shell-like word rules (quoted words
/// stay together). Returns the session exit code. Deadline expiry cancels
/// the remote session.
pub async fn dispatch(
    registry: &FleetRegistry,
    agent_id: &str,
    command_line: &str,
    deadline: Duration,
    chunks: mpsc::Sender<OutputChunk>,
) -> Result<i32, DispatchError> {
    let tunnel = registry
        .get(agent_id)
        .ok_or_else(|| DispatchError::UnknownAgent(agent_id.to_string()))?;

    let words = shlex::split(command_line)
        .ok_or_else(|| DispatchError::InvalidCommand(command_line.to_string()))?;
    let mut words = words.into_iter();
    let command = words
        .next()
        .ok_or_else(|| DispatchError::InvalidCommand("empty command".to_string()))?;
    let args: Vec<String> = words.collect();

    tracing::info!(%agent_id, %command, "dispatching session");

    let mut session = tunnel.open_session();
    session.send(Input::start(command, args)).await?;

    match tokio::time::timeout(deadline, pump(&mut session, &chunks)).await {
        Ok(result) => result,
        Err(_) => {
            session.cancel().await;
            Err(DispatchError::DeadlineExceeded)
        }
    }
}

/// Forward session output to the caller until the terminal message.
async fn pump(
    session: &mut SessionStream,
    chunks: &mpsc::Sender<OutputChunk>,
) -> Result<i32, DispatchError> {
    loop {
        match session.recv().await {
            Some(SessionEvent::Output(output)) => {
                if !output.stdout.is_empty() {
                    let _ = chunks.send(OutputChunk::Stdout(output.stdout)).await;
                }
                if !output.stderr.is_empty() {
                    let _ = chunks.send(OutputChunk::Stderr(output.stderr)).await;
                }
                if !output.combined_output.is_empty() {
                    let _ = chunks
                        .send(OutputChunk::Stdout(output.combined_output))
                        .await;
                }
                if output.exited {
                    return Ok(output.exit_code);
                }
            }
            Some(SessionEvent::Failed(message)) => return Err(DispatchError::Remote(message)),
            None => return Err(DispatchError::Transport("tunnel closed".to_string())),
        }
    }
}

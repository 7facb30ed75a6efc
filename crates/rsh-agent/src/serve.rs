//! Per-connection session host loop
//!
//! One connection carries any number of multiplexed sessions. This loop
//! demultiplexes inbound frames to per-session input channels, spawns the
//! session engine for fresh session ids, and funnels all outbound frames
//! through a single writer task that owns the sink half.

use std::collections::HashMap;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use rsh_core::{BoxedIo, ConnectionError};
use rsh_protocol::{ErrorCode, Frame, FrameCodec, Input, Message, Output, SessionId};

use crate::session::{self, ShellDefaults};

/// Outbound frame queue depth per connection.
const FRAME_CHANNEL_CAPACITY: usize = 256;

/// Per-session input queue depth.
const INPUT_CHANNEL_CAPACITY: usize = 64;

struct SessionEntry {
    input_tx: mpsc::Sender<Input>,
    cancel: CancellationToken,
}

/// Serve sessions on an established connection until it closes, errors, or
/// is cancelled. `hello` is sent first when present (reverse tunnels
/// announce their identity; direct connections don't).
pub async fn serve_connection(
    io: BoxedIo,
    defaults: Arc<ShellDefaults>,
    cancel: CancellationToken,
    hello: Option<Frame>,
) -> Result<(), ConnectionError> {
    let mut framed = Framed::new(io, FrameCodec::new());
    if let Some(frame) = hello {
        framed.send(frame).await.map_err(ConnectionError::Protocol)?;
    }
    let (mut sink, mut stream) = framed.split();

    // Single writer owns the sink; sessions and the demux loop all feed it
    let (frame_tx, mut frame_rx) = mpsc::channel::<Frame>(FRAME_CHANNEL_CAPACITY);
    let writer = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    let sessions: Arc<Mutex<HashMap<SessionId, SessionEntry>>> =
        Arc::new(Mutex::new(HashMap::new()));
    // Session ids are allocated monotonically by the initiator; anything at
    // or below this high-water mark is a session we have already seen.
    let mut last_started = SessionId::CONTROL;

    let result = loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            frame = stream.next() => frame,
        };
        let Some(frame) = frame else { break Ok(()) };
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => break Err(ConnectionError::Protocol(e)),
        };

        match frame.message {
            Message::Input(input) => {
                handle_input(
                    frame.session_id,
                    input,
                    &sessions,
                    &mut last_started,
                    &frame_tx,
                    &defaults,
                    &cancel,
                )
                .await;
            }
            Message::Cancel => {
                if let Some(entry) = sessions.lock().await.get(&frame.session_id) {
                    entry.cancel.cancel();
                }
            }
            Message::Ping { timestamp } => {
                let _ = frame_tx
                    .send(Frame::control(Message::Pong { timestamp }))
                    .await;
            }
            other => {
                tracing::warn!(
                    session = %frame.session_id,
                    message = ?other.message_type(),
                    "unexpected message on session host"
                );
            }
        }
    };

    // Teardown: stop every session without sending further output
    for (_, entry) in sessions.lock().await.drain() {
        entry.cancel.cancel();
    }
    drop(frame_tx);
    let _ = writer.await;
    result
}

async fn handle_input(
    id: SessionId,
    input: Input,
    sessions: &Arc<Mutex<HashMap<SessionId, SessionEntry>>>,
    last_started: &mut SessionId,
    frame_tx: &mpsc::Sender<Frame>,
    defaults: &Arc<ShellDefaults>,
    conn_cancel: &CancellationToken,
) {
    let mut map = sessions.lock().await;

    // Route to an existing session; clone the sender so the map lock is not
    // held across the send
    if let Some(input_tx) = map.get(&id).map(|entry| entry.input_tx.clone()) {
        drop(map);
        if input_tx.send(input).await.is_err() {
            tracing::debug!(session = %id, "input for finished session dropped");
        }
        return;
    }

    if !input.start {
        if id <= *last_started {
            // Late input racing the session's teardown; the exited message
            // already closed the stream, so stay silent.
            tracing::debug!(session = %id, "input for closed session dropped");
        } else {
            let _ = frame_tx
                .send(Frame::new(
                    id,
                    Message::Error {
                        code: ErrorCode::InvalidStart,
                        message: "first input does not set start".to_string(),
                    },
                ))
                .await;
        }
        return;
    }

    *last_started = (*last_started).max(id);

    let (input_tx, input_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
    let (output_tx, mut output_rx) = mpsc::channel::<Output>(INPUT_CHANNEL_CAPACITY);
    let session_cancel = conn_cancel.child_token();
    map.insert(
        id,
        SessionEntry {
            input_tx,
            cancel: session_cancel.clone(),
        },
    );
    drop(map);

    // Wrap session outputs into frames for the shared writer
    let out_frames = frame_tx.clone();
    let out_task = tokio::spawn(async move {
        while let Some(output) = output_rx.recv().await {
            if out_frames
                .send(Frame::new(id, Message::Output(output)))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let frame_tx = frame_tx.clone();
    let defaults = Arc::clone(defaults);
    let sessions = Arc::clone(sessions);
    tokio::spawn(async move {
        tracing::info!(session = %id, command = %input.command, "session opened");
        let result =
            session::run_session(input, input_rx, output_tx, session_cancel, &defaults).await;

        // Flush queued outputs before any error report so frame order holds
        let _ = out_task.await;

        match result {
            Ok(()) => tracing::info!(session = %id, "session closed"),
            Err(e) => {
                tracing::warn!(session = %id, error = %e, "session failed");
                let _ = frame_tx
                    .send(Frame::new(
                        id,
                        Message::Error {
                            code: e.code(),
                            message: e.to_string(),
                        },
                    ))
                    .await;
            }
        }
        sessions.lock().await.remove(&id);
    });
}

//! Server half of a reverse tunnel
//!
//! Each accepted connection becomes a [`TunnelHandle`]: a writer task owns
//! the sink, inbound output frames are demultiplexed to per-session
//! channels, and the control session carries liveness pings.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use rsh_core::{BoxedIo, ConnectionError, DispatchError};
use rsh_protocol::{Frame, FrameCodec, Input, Message, Output, SessionId, SessionIdAllocator};

use crate::registry::FleetRegistry;

/// How long a fresh connection has to send its `Hello`.
const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between liveness pings on the control session.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Outbound frame queue depth per tunnel.
const FRAME_CHANNEL_CAPACITY: usize = 256;

/// Per-session event queue depth.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Something the agent sent back for a session.
#[derive(Debug)]
pub enum SessionEvent {
    /// An output message (incremental or terminal)
    Output(Output),
    /// The agent aborted the session with an error
    Failed(String),
}

/// Handle to an open reverse tunnel, usable to open sessions on the agent.
pub struct TunnelHandle {
    /// Monotonic tunnel sequence number; distinguishes a tunnel from its
    /// replacement under the same agent id
    pub seq: u64,
    /// Identity the agent announced, if any
    pub agent_id: Option<String>,
    /// Remote address of the tunnel transport
    pub peer_addr: String,
    /// Subject CN of the peer certificate, when one was presented
    pub peer_common_name: Option<String>,
    opened_at: Instant,
    last_heartbeat_millis: AtomicU64,
    session_ids: SessionIdAllocator,
    frame_tx: mpsc::Sender<Frame>,
    sessions: Arc<DashMap<SessionId, mpsc::Sender<SessionEvent>>>,
    /// Cancelling tears the tunnel down
    pub cancel: CancellationToken,
}

impl TunnelHandle {
    pub fn new(
        seq: u64,
        agent_id: Option<String>,
        peer_addr: String,
        peer_common_name: Option<String>,
        frame_tx: mpsc::Sender<Frame>,
    ) -> Self {
        Self {
            seq,
            agent_id,
            peer_addr,
            peer_common_name,
            opened_at: Instant::now(),
            last_heartbeat_millis: AtomicU64::new(now_millis()),
            session_ids: SessionIdAllocator::new(),
            frame_tx,
            sessions: Arc::new(DashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Open a fresh session stream on this tunnel.
    pub fn open_session(&self) -> SessionStream {
        let id = self.session_ids.next();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        self.sessions.insert(id, event_tx);
        SessionStream {
            id,
            frame_tx: self.frame_tx.clone(),
            events: event_rx,
            sessions: Arc::clone(&self.sessions),
            finished: false,
        }
    }

    /// Record a heartbeat acknowledgment.
    pub fn record_heartbeat(&self) {
        self.last_heartbeat_millis
            .store(now_millis(), Ordering::SeqCst);
    }

    /// Last heartbeat timestamp (epoch millis).
    pub fn last_heartbeat_millis(&self) -> u64 {
        self.last_heartbeat_millis.load(Ordering::SeqCst)
    }

    /// How long the tunnel has been open.
    pub fn uptime(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

/// One session opened over a tunnel: inputs go down, events come back.
pub struct SessionStream {
    id: SessionId,
    frame_tx: mpsc::Sender<Frame>,
    events: mpsc::Receiver<SessionEvent>,
    sessions: Arc<DashMap<SessionId, mpsc::Sender<SessionEvent>>>,
    finished: bool,
}

impl SessionStream {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Send an input down the tunnel.
    pub async fn send(&self, input: Input) -> Result<(), DispatchError> {
        self.frame_tx
            .send(Frame::new(self.id, Message::Input(input)))
            .await
            .map_err(|_| DispatchError::Transport("tunnel closed".to_string()))
    }

    /// Receive the next session event.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        let event = self.events.recv().await;
        match &event {
            Some(SessionEvent::Output(output)) if output.exited => self.finished = true,
            Some(SessionEvent::Failed(_)) | None => self.finished = true,
            _ => {}
        }
        event
    }

    /// Abort the session on the agent.
    pub async fn cancel(&mut self) {
        self.finished = true;
        let _ = self
            .frame_tx
            .send(Frame::new(self.id, Message::Cancel))
            .await;
    }
}

impl Drop for SessionStream {
    fn drop(&mut self) {
        self.sessions.remove(&self.id);
        // A dropped caller aborts the remote session; a finished session
        // needs nothing further.
        if !self.finished {
            let _ = self
                .frame_tx
                .try_send(Frame::new(self.id, Message::Cancel));
        }
    }
}

/// Drive an accepted tunnel connection: register it, demultiplex output,
/// ping for liveness, and deregister on close.
pub async fn run_tunnel(
    io: BoxedIo,
    registry: Arc<FleetRegistry>,
    peer_addr: String,
    peer_common_name: Option<String>,
    cancel: CancellationToken,
) -> Result<(), ConnectionError> {
    let mut framed = Framed::new(io, FrameCodec::new());

    // The opening frame must be the agent's identity announcement
    let hello = tokio::time::timeout(HELLO_TIMEOUT, framed.next())
        .await
        .map_err(|_| ConnectionError::HandshakeTimeout)?;
    let Some(hello) = hello else {
        return Err(ConnectionError::Transport(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "closed before hello",
        )));
    };
    let hello = hello.map_err(ConnectionError::Protocol)?;
    let agent_id = match hello.message {
        Message::Hello { agent_id } => agent_id,
        other => {
            return Err(ConnectionError::Transport(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("expected hello, got {:?}", other.message_type()),
            )))
        }
    };

    let (mut sink, mut stream) = framed.split();
    let (frame_tx, mut frame_rx) = mpsc::channel::<Frame>(FRAME_CHANNEL_CAPACITY);
    let writer = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    let handle = Arc::new(TunnelHandle::new(
        registry.next_seq(),
        agent_id.clone(),
        peer_addr.clone(),
        peer_common_name,
        frame_tx.clone(),
    ));
    let seq = handle.seq;
    let sessions = Arc::clone(&handle.sessions);

    match &agent_id {
        Some(id) => {
            tracing::info!(agent_id = %id, peer = %peer_addr, "tunnel registered");
            registry.insert(id.clone(), Arc::clone(&handle));
        }
        None => tracing::info!(peer = %peer_addr, "anonymous tunnel opened (unaddressable)"),
    }

    // Liveness pings on the control session
    let ping_tx = frame_tx.clone();
    let ping_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(PING_INTERVAL);
        interval.tick().await; // immediate first tick
        loop {
            interval.tick().await;
            let ping = Frame::control(Message::Ping {
                timestamp: now_millis(),
            });
            if ping_tx.send(ping).await.is_err() {
                break;
            }
        }
    });

    let result = loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            _ = handle.cancel.cancelled() => break Ok(()),
            frame = stream.next() => frame,
        };
        let Some(frame) = frame else { break Ok(()) };
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => break Err(ConnectionError::Protocol(e)),
        };

        match frame.message {
            Message::Output(output) => {
                deliver(&sessions, frame.session_id, SessionEvent::Output(output)).await;
            }
            Message::Error { code, message } => {
                deliver(
                    &sessions,
                    frame.session_id,
                    SessionEvent::Failed(format!("{:?}: {}", code, message)),
                )
                .await;
            }
            Message::Pong { .. } => handle.record_heartbeat(),
            Message::Hello { .. } => {
                tracing::warn!(peer = %peer_addr, "duplicate hello ignored");
            }
            other => {
                tracing::warn!(
                    peer = %peer_addr,
                    message = ?other.message_type(),
                    "unexpected message from agent"
                );
            }
        }
    };

    // Teardown: deregister this tunnel (and only this tunnel; a
    // replacement under the same id stays registered), wake pending
    // sessions, then release every sender so the writer drains and stops
    ping_task.abort();
    if let Some(id) = &agent_id {
        if registry.remove(id, seq) {
            tracing::info!(agent_id = %id, peer = %peer_addr, "tunnel deregistered");
        }
    }
    sessions.clear();
    drop(handle);
    drop(frame_tx);
    let _ = writer.await;
    result
}

async fn deliver(
    sessions: &DashMap<SessionId, mpsc::Sender<SessionEvent>>,
    id: SessionId,
    event: SessionEvent,
) {
    let Some(tx) = sessions.get(&id).map(|entry| entry.value().clone()) else {
        tracing::debug!(session = %id, "event for closed session dropped");
        return;
    };
    if tx.send(event).await.is_err() {
        tracing::debug!(session = %id, "session consumer gone");
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_handle(seq: u64, id: &str) -> (TunnelHandle, mpsc::Receiver<Frame>) {
        let (frame_tx, frame_rx) = mpsc::channel(16);
        let handle = TunnelHandle::new(
            seq,
            Some(id.to_string()),
            "127.0.0.1:9".to_string(),
            Some("root".to_string()),
            frame_tx,
        );
        (handle, frame_rx)
    }

    #[tokio::test]
    async fn test_open_session_allocates_monotonic_ids() {
        let (handle, _rx) = test_handle(1, "a");
        let first = handle.open_session();
        let second = handle.open_session();
        assert_eq!(first.id().as_u32(), 1);
        assert_eq!(second.id().as_u32(), 2);
    }

    #[tokio::test]
    async fn test_session_send_produces_input_frame() {
        let (handle, mut rx) = test_handle(1, "a");
        let mut session = handle.open_session();
        session
            .send(Input::start("/bin/true", vec![]))
            .await
            .unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.session_id, session.id());
        assert!(matches!(frame.message, Message::Input(i) if i.start));
        session.finished = true; // suppress the drop-cancel for this test
    }

    #[tokio::test]
    async fn test_dropped_unfinished_session_sends_cancel() {
        let (handle, mut rx) = test_handle(1, "a");
        let session = handle.open_session();
        let id = session.id();
        drop(session);

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.session_id, id);
        assert!(matches!(frame.message, Message::Cancel));
    }

    #[tokio::test]
    async fn test_finished_session_drop_is_silent() {
        let (handle, mut rx) = test_handle(1, "a");
        let mut session = handle.open_session();
        let event_tx = handle.sessions.get(&session.id()).unwrap().value().clone();
        event_tx
            .send(SessionEvent::Output(Output::exited(0)))
            .await
            .unwrap();

        match session.recv().await.unwrap() {
            SessionEvent::Output(output) => assert!(output.exited),
            other => panic!("unexpected event: {other:?}"),
        }
        drop(session);
        drop(handle);
        assert!(rx.recv().await.is_none(), "no cancel after clean finish");
    }

    #[tokio::test]
    async fn test_heartbeat_recording() {
        let (handle, _rx) = test_handle(1, "a");
        let before = handle.last_heartbeat_millis();
        tokio::time::sleep(Duration::from_millis(5)).await;
        handle.record_heartbeat();
        assert!(handle.last_heartbeat_millis() >= before);
    }
}

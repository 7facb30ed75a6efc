//! End-to-end tests over loopback TCP: a real listener, a real agent
//! connection, and dispatch through the registry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use rsh_agent::session::ShellDefaults;
use rsh_agent::serve_connection;
use rsh_core::DispatchError;
use rsh_protocol::{Frame, Message};
use rsh_server::listener::run_listener;
use rsh_server::{dispatch, FleetRegistry, OutputChunk};

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

struct Harness {
    registry: Arc<FleetRegistry>,
    server_addr: String,
    cancel: CancellationToken,
}

impl Harness {
    /// Start a plain-TCP tunnel listener on an ephemeral port.
    async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server_addr = listener.local_addr().unwrap().to_string();
        let registry = Arc::new(FleetRegistry::new());
        let cancel = CancellationToken::new();

        {
            let registry = Arc::clone(&registry);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let _ = run_listener(listener, None, registry, cancel).await;
            });
        }

        Self {
            registry,
            server_addr,
            cancel,
        }
    }

    /// Connect an agent with the given id; returns the connection's cancel
    /// token.
    async fn connect_agent(&self, agent_id: &str) -> CancellationToken {
        let stream = tokio::net::TcpStream::connect(&self.server_addr)
            .await
            .unwrap();
        let defaults = Arc::new(ShellDefaults::new("/bin/sh", vec![]));
        let conn_cancel = self.cancel.child_token();
        let hello = Frame::control(Message::Hello {
            agent_id: Some(agent_id.to_string()),
        });

        {
            let conn_cancel = conn_cancel.clone();
            tokio::spawn(async move {
                let _ = serve_connection(Box::new(stream), defaults, conn_cancel, Some(hello)).await;
            });
        }

        self.wait_registered(agent_id).await;
        conn_cancel
    }

    /// Poll until the agent shows up in the registry.
    async fn wait_registered(&self, agent_id: &str) {
        timeout(TEST_TIMEOUT, async {
            while self.registry.get(agent_id).is_none() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("agent never registered");
    }
}

/// Run a dispatch and collect its output chunks.
async fn dispatch_collect(
    registry: &FleetRegistry,
    agent_id: &str,
    command_line: &str,
    deadline: Duration,
) -> (Result<i32, DispatchError>, Vec<u8>, Vec<u8>) {
    let (chunk_tx, mut chunk_rx) = mpsc::channel(64);
    let result = timeout(
        TEST_TIMEOUT,
        dispatch(registry, agent_id, command_line, deadline, chunk_tx),
    )
    .await
    .expect("dispatch hung");

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    while let Some(chunk) = chunk_rx.recv().await {
        match chunk {
            OutputChunk::Stdout(bytes) => stdout.extend_from_slice(&bytes),
            OutputChunk::Stderr(bytes) => stderr.extend_from_slice(&bytes),
        }
    }
    (result, stdout, stderr)
}

#[tokio::test]
async fn test_dispatch_echo_roundtrip() {
    let harness = Harness::start().await;
    harness.connect_agent("agent-echo").await;

    let (result, stdout, stderr) = dispatch_collect(
        &harness.registry,
        "agent-echo",
        "/bin/echo hi",
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(result.unwrap(), 0);
    assert_eq!(stdout, b"hi\n");
    assert!(stderr.is_empty());
}

#[tokio::test]
async fn test_dispatch_quoted_arguments() {
    let harness = Harness::start().await;
    harness.connect_agent("agent-quotes").await;

    let (result, stdout, _) = dispatch_collect(
        &harness.registry,
        "agent-quotes",
        "/bin/echo 'hello world'",
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(result.unwrap(), 0);
    assert_eq!(stdout, b"hello world\n");
}

#[tokio::test]
async fn test_dispatch_unknown_agent() {
    let harness = Harness::start().await;

    let (result, _, _) = dispatch_collect(
        &harness.registry,
        "no-such-agent",
        "/bin/echo hi",
        Duration::from_secs(5),
    )
    .await;

    assert!(matches!(result, Err(DispatchError::UnknownAgent(_))));
}

#[tokio::test]
async fn test_dispatch_command_not_found_is_exit_127() {
    let harness = Harness::start().await;
    harness.connect_agent("agent-127").await;

    let (result, _, stderr) = dispatch_collect(
        &harness.registry,
        "agent-127",
        "/no/such/bin",
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(result.unwrap(), 127);
    assert!(!stderr.is_empty());
}

#[tokio::test]
async fn test_dispatch_deadline_cancels_session() {
    let harness = Harness::start().await;
    harness.connect_agent("agent-slow").await;

    let (result, _, _) = dispatch_collect(
        &harness.registry,
        "agent-slow",
        "/bin/sleep 30",
        Duration::from_millis(300),
    )
    .await;

    assert!(matches!(result, Err(DispatchError::DeadlineExceeded)));
}

#[tokio::test]
async fn test_reregistration_overwrites_and_stale_close_is_noop() {
    let harness = Harness::start().await;

    let first_cancel = harness.connect_agent("agent-dup").await;
    let first = harness.registry.get("agent-dup").unwrap();

    // Second tunnel under the same id overwrites the entry
    let _second_cancel = harness.connect_agent("agent-dup").await;
    let second = timeout(TEST_TIMEOUT, async {
        loop {
            let current = harness.registry.get("agent-dup").unwrap();
            if current.seq != first.seq {
                break current;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("entry never replaced");
    assert!(!Arc::ptr_eq(&first, &second));

    // Closing the superseded tunnel must not evict the replacement
    first_cancel.cancel();
    sleep(Duration::from_millis(200)).await;
    let current = harness
        .registry
        .get("agent-dup")
        .expect("replacement evicted by stale close");
    assert_eq!(current.seq, second.seq);

    // Dispatch still reaches the live tunnel
    let (result, stdout, _) = dispatch_collect(
        &harness.registry,
        "agent-dup",
        "/bin/echo alive",
        Duration::from_secs(5),
    )
    .await;
    assert_eq!(result.unwrap(), 0);
    assert_eq!(stdout, b"alive\n");
}

#[tokio::test]
async fn test_agent_disconnect_deregisters() {
    let harness = Harness::start().await;
    let conn_cancel = harness.connect_agent("agent-gone").await;

    conn_cancel.cancel();
    timeout(TEST_TIMEOUT, async {
        while harness.registry.get("agent-gone").is_some() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("entry never removed after disconnect");
}

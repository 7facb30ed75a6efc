//! Shell session engine
//!
//! One invocation of [`run_session`] drives a single child process: it
//! consumes an ordered stream of [`Input`]s, produces [`Output`]s, and
//! terminates deterministically on child exit, cancellation, or error.
//!
//! Three concurrent activities cooperate per session: the input router (the
//! body of the select loop), the output forwarder task(s), and the process
//! waiter task that owns the child. Cancellation kills the child and stops
//! all of them without emitting further output.

pub mod pty;

use bytes::{Bytes, BytesMut};
use nix::pty::Winsize;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use rsh_core::SessionError;
use rsh_protocol::{Input, Output};

/// Shell substituted when a session starts with an empty command.
#[derive(Debug, Clone)]
pub struct ShellDefaults {
    pub command: String,
    pub args: Vec<String>,
}

impl ShellDefaults {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

/// Exit code reported for a command whose executable could not be found.
pub const EXIT_NOT_FOUND: i32 = 127;

/// Read-buffer size for output forwarding.
const READ_CHUNK: usize = 4096;

/// Run one session to completion.
///
/// `first` is the opening input and must have `start = true`. Exactly one
/// `Output { exited: true }` is sent on every path that ends the session
/// normally; cancellation and errors send nothing further (the caller
/// surfaces errors to the peer).
pub async fn run_session(
    first: Input,
    inputs: mpsc::Receiver<Input>,
    outputs: mpsc::Sender<Output>,
    cancel: CancellationToken,
    defaults: &ShellDefaults,
) -> Result<(), SessionError> {
    if !first.start {
        return Err(SessionError::InvalidStart(
            "first input does not set start".to_string(),
        ));
    }
    if first.terminal && first.combined_output {
        return Err(SessionError::InvalidStart(
            "terminal and combined_output are mutually exclusive".to_string(),
        ));
    }

    let (command, args) = if first.command.is_empty() {
        (defaults.command.clone(), defaults.args.clone())
    } else {
        (first.command.clone(), first.args.clone())
    };

    if first.terminal {
        run_pty(&command, &args, inputs, outputs, cancel).await
    } else if first.combined_output {
        run_combined(&command, &args, inputs, outputs, cancel).await
    } else {
        run_streamed(&command, &args, inputs, outputs, cancel).await
    }
}

/// Streamed exec: separate stdout/stderr forwarded incrementally, stdin and
/// signals routed live.
async fn run_streamed(
    command: &str,
    args: &[String],
    mut inputs: mpsc::Receiver<Input>,
    outputs: mpsc::Sender<Output>,
    cancel: CancellationToken,
) -> Result<(), SessionError> {
    let mut cmd = isolated_command(command, args);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return send_not_found(&outputs, command, &e).await;
        }
        Err(e) => return Err(SessionError::SpawnFailed(e.to_string())),
    };

    let pid = child_pid(&child);
    let mut stdin = child.stdin.take();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SessionError::Internal("missing stdout pipe".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| SessionError::Internal("missing stderr pipe".to_string()))?;

    let out_task = tokio::spawn(forward_stream(stdout, outputs.clone(), StreamKind::Stdout));
    let err_task = tokio::spawn(forward_stream(stderr, outputs.clone(), StreamKind::Stderr));

    let mut exit_rx = spawn_waiter(child);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                kill_pid(pid, libc::SIGKILL);
                return Ok(());
            }

            status = &mut exit_rx => {
                let code = exit_code(status)?;
                // Drain remaining output before the terminal message
                let _ = out_task.await;
                let _ = err_task.await;
                let _ = outputs.send(Output::exited(code)).await;
                return Ok(());
            }

            input = inputs.recv() => {
                let Some(input) = input else {
                    // Peer went away; treat like cancellation
                    kill_pid(pid, libc::SIGKILL);
                    return Ok(());
                };
                if let Err(e) = apply_piped_input(&mut stdin, pid, input).await {
                    kill_pid(pid, libc::SIGKILL);
                    return Err(e);
                }
            }
        }
    }
}

/// Batch exec: stdout and stderr merged in arrival order, delivered in one
/// terminal message.
async fn run_combined(
    command: &str,
    args: &[String],
    mut inputs: mpsc::Receiver<Input>,
    outputs: mpsc::Sender<Output>,
    cancel: CancellationToken,
) -> Result<(), SessionError> {
    let mut cmd = isolated_command(command, args);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return send_not_found(&outputs, command, &e).await;
        }
        Err(e) => return Err(SessionError::SpawnFailed(e.to_string())),
    };

    let pid = child_pid(&child);
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SessionError::Internal("missing stdout pipe".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| SessionError::Internal("missing stderr pipe".to_string()))?;

    // Merge chunks from both pipes in arrival order
    let (chunk_tx, mut chunk_rx) = mpsc::channel::<Bytes>(64);
    let out_task = tokio::spawn(collect_chunks(stdout, chunk_tx.clone()));
    let err_task = tokio::spawn(collect_chunks(stderr, chunk_tx));

    let mut merged = BytesMut::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                kill_pid(pid, libc::SIGKILL);
                return Ok(());
            }

            chunk = chunk_rx.recv() => {
                match chunk {
                    Some(chunk) => merged.extend_from_slice(&chunk),
                    // Both pipes closed: the child is done writing
                    None => break,
                }
            }

            input = inputs.recv() => {
                // Batch mode has no live input; drop anything the peer sends,
                // but a closed channel means the peer is gone.
                if input.is_none() {
                    kill_pid(pid, libc::SIGKILL);
                    return Ok(());
                }
            }
        }
    }

    let _ = out_task.await;
    let _ = err_task.await;

    let mut exit_rx = spawn_waiter(child);
    let status = tokio::select! {
        _ = cancel.cancelled() => {
            kill_pid(pid, libc::SIGKILL);
            return Ok(());
        }
        status = &mut exit_rx => status,
    };
    let code = exit_code(status)?;

    let _ = outputs
        .send(Output {
            combined_output: merged.freeze(),
            exit_code: code,
            exited: true,
            ..Output::default()
        })
        .await;
    Ok(())
}

/// PTY exec: the child runs under a pseudo-terminal; stdout and stderr are
/// merged into the single PTY stream and delivered as `stdout`.
async fn run_pty(
    command: &str,
    args: &[String],
    mut inputs: mpsc::Receiver<Input>,
    outputs: mpsc::Sender<Output>,
    cancel: CancellationToken,
) -> Result<(), SessionError> {
    let pair = pty::allocate(&pty::default_winsize())
        .map_err(|e| SessionError::PtyOpen(e.to_string()))?;

    let child = match pty::spawn_on_slave(&pair, command, args) {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return send_not_found(&outputs, command, &e).await;
        }
        Err(e) => return Err(SessionError::SpawnFailed(e.to_string())),
    };

    // The child holds the slave end; release our copy so the master sees EOF
    // once the child is gone.
    let pty::PtyPair { master, slave } = pair;
    drop(slave);

    let pid = child_pid(&child);
    let (master_read, mut master_write) =
        pty::split_master(&master).map_err(|e| SessionError::Internal(e.to_string()))?;

    let out_task = tokio::spawn(forward_stream(
        master_read,
        outputs.clone(),
        StreamKind::Stdout,
    ));

    let mut exit_rx = spawn_waiter(child);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                kill_pid(pid, libc::SIGKILL);
                return Ok(());
            }

            status = &mut exit_rx => {
                let code = exit_code(status)?;
                // Graceful drain: keep copying PTY output until EOF so the
                // last burst is not truncated, then report the exit.
                let _ = out_task.await;
                drop(master_write);
                drop(master);
                let _ = outputs.send(Output::exited(code)).await;
                return Ok(());
            }

            input = inputs.recv() => {
                let Some(input) = input else {
                    kill_pid(pid, libc::SIGKILL);
                    return Ok(());
                };
                if input.start {
                    kill_pid(pid, libc::SIGKILL);
                    return Err(SessionError::InvalidStart(
                        "session already started".to_string(),
                    ));
                }
                if input.signal == libc::SIGWINCH {
                    let winsize = match parse_winsize(&input.bytes) {
                        Ok(winsize) => winsize,
                        Err(e) => {
                            kill_pid(pid, libc::SIGKILL);
                            return Err(e);
                        }
                    };
                    if let Err(e) = pty::resize(&master, &winsize) {
                        kill_pid(pid, libc::SIGKILL);
                        return Err(SessionError::Internal(format!("pty resize: {}", e)));
                    }
                } else if input.signal != 0 {
                    if let Err(e) = deliver_signal(pid, input.signal) {
                        kill_pid(pid, libc::SIGKILL);
                        return Err(e);
                    }
                } else if !input.bytes.is_empty() {
                    if let Err(e) = master_write.write_all(&input.bytes).await {
                        kill_pid(pid, libc::SIGKILL);
                        return Err(SessionError::Internal(format!("pty write: {}", e)));
                    }
                }
            }
        }
    }
}

/// Parse a SIGWINCH payload: four space-separated decimal fields
/// `<cols> <rows> <xpixels> <ypixels>`. Fields that overflow or fail to
/// parse become 0; structural problems reject the payload.
pub fn parse_winsize(bytes: &[u8]) -> Result<Winsize, SessionError> {
    if bytes.len() < 6 {
        return Err(SessionError::MalformedSignal(format!(
            "payload too short: {} bytes",
            bytes.len()
        )));
    }
    let text = std::str::from_utf8(bytes)
        .map_err(|_| SessionError::MalformedSignal("payload is not valid UTF-8".to_string()))?;

    let fields: Vec<&str> = text.split(' ').collect();
    if fields.len() != 4 {
        return Err(SessionError::MalformedSignal(format!(
            "expected 4 fields, got {}",
            fields.len()
        )));
    }

    let field = |s: &str| s.parse::<u16>().unwrap_or(0);
    Ok(Winsize {
        ws_col: field(fields[0]),
        ws_row: field(fields[1]),
        ws_xpixel: field(fields[2]),
        ws_ypixel: field(fields[3]),
    })
}

/// Build a command whose child runs in its own session, so signals aimed at
/// the agent process do not fan out to session children.
fn isolated_command(command: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(command);
    cmd.args(args).kill_on_drop(true);
    // SAFETY: setsid is async-signal-safe per POSIX.
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
    cmd
}

enum StreamKind {
    Stdout,
    Stderr,
}

/// Copy chunks from a child stream into the output channel, one frame per
/// read.
async fn forward_stream(
    mut reader: impl AsyncRead + Unpin + Send,
    outputs: mpsc::Sender<Output>,
    kind: StreamKind,
) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            // A PTY master read errors with EIO once the slave side is
            // fully closed; treat it like EOF.
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let chunk = Bytes::copy_from_slice(&buf[..n]);
                let output = match kind {
                    StreamKind::Stdout => Output::stdout(chunk),
                    StreamKind::Stderr => Output::stderr(chunk),
                };
                if outputs.send(output).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Copy chunks from a child stream into a collector channel.
async fn collect_chunks(mut reader: impl AsyncRead + Unpin + Send, chunks: mpsc::Sender<Bytes>) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if chunks
                    .send(Bytes::copy_from_slice(&buf[..n]))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    }
}

/// Route one non-start input to a pipe-backed child.
async fn apply_piped_input(
    stdin: &mut Option<ChildStdin>,
    pid: i32,
    input: Input,
) -> Result<(), SessionError> {
    if input.start {
        return Err(SessionError::InvalidStart(
            "session already started".to_string(),
        ));
    }
    if input.signal != 0 {
        // No PTY to resize here; SIGWINCH is forwarded like any other signal
        return deliver_signal(pid, input.signal);
    }
    if !input.bytes.is_empty() {
        if let Some(writer) = stdin.as_mut() {
            writer
                .write_all(&input.bytes)
                .await
                .map_err(|e| SessionError::Internal(format!("stdin write: {}", e)))?;
            writer
                .flush()
                .await
                .map_err(|e| SessionError::Internal(format!("stdin flush: {}", e)))?;
        }
    }
    Ok(())
}

/// Deliver a POSIX signal to the child process.
fn deliver_signal(pid: i32, signo: i32) -> Result<(), SessionError> {
    let signal = Signal::try_from(signo)
        .map_err(|e| SessionError::Internal(format!("invalid signal {}: {}", signo, e)))?;
    kill(Pid::from_raw(pid), signal)
        .map_err(|e| SessionError::Internal(format!("signal {}: {}", signo, e)))
}

fn kill_pid(pid: i32, signo: i32) {
    if pid > 0 {
        // SAFETY: plain kill(2) on a pid we spawned
        unsafe {
            libc::kill(pid, signo);
        }
    }
}

fn child_pid(child: &Child) -> i32 {
    child.id().map(|pid| pid as i32).unwrap_or(0)
}

/// Move the child into a dedicated waiter task; its exit status comes back
/// on the returned channel.
fn spawn_waiter(mut child: Child) -> oneshot::Receiver<std::io::Result<std::process::ExitStatus>> {
    let (exit_tx, exit_rx) = oneshot::channel();
    tokio::spawn(async move {
        let _ = exit_tx.send(child.wait().await);
    });
    exit_rx
}

/// Map a waiter result to the session exit code: the child's code as-is, or
/// -1 when it was terminated by a signal and reports none.
fn exit_code(
    status: Result<std::io::Result<std::process::ExitStatus>, oneshot::error::RecvError>,
) -> Result<i32, SessionError> {
    let status = status
        .map_err(|_| SessionError::Internal("process waiter vanished".to_string()))?
        .map_err(|e| SessionError::Internal(format!("wait: {}", e)))?;
    Ok(status.code().unwrap_or(-1))
}

/// Executable-not-found is a normal session outcome: exit 127 with the
/// reason on stderr.
async fn send_not_found(
    outputs: &mpsc::Sender<Output>,
    command: &str,
    err: &std::io::Error,
) -> Result<(), SessionError> {
    let _ = outputs
        .send(Output {
            stderr: Bytes::from(format!("{}: {}", command, err)),
            exit_code: EXIT_NOT_FOUND,
            exited: true,
            ..Output::default()
        })
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const TEST_TIMEOUT: Duration = Duration::from_secs(10);

    fn defaults() -> ShellDefaults {
        ShellDefaults::new("/bin/sh", vec![])
    }

    /// Drive a session to completion, returning every output it produced.
    async fn run_collect(
        first: Input,
        extra: Vec<Input>,
        shell: ShellDefaults,
    ) -> (Result<(), SessionError>, Vec<Output>) {
        let (input_tx, input_rx) = mpsc::channel(16);
        let (output_tx, mut output_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        let engine = tokio::spawn(async move {
            run_session(first, input_rx, output_tx, cancel, &shell).await
        });

        for input in extra {
            input_tx.send(input).await.unwrap();
        }

        let mut outputs = Vec::new();
        while let Ok(Some(output)) = timeout(TEST_TIMEOUT, output_rx.recv()).await {
            outputs.push(output);
        }
        let result = timeout(TEST_TIMEOUT, engine).await.unwrap().unwrap();
        (result, outputs)
    }

    fn stdout_concat(outputs: &[Output]) -> Vec<u8> {
        outputs
            .iter()
            .flat_map(|o| o.stdout.iter().copied())
            .collect()
    }

    #[tokio::test]
    async fn test_plain_echo() {
        let (result, outputs) = run_collect(
            Input::start("/bin/echo", vec!["hi".to_string()]),
            vec![],
            defaults(),
        )
        .await;

        result.unwrap();
        assert_eq!(stdout_concat(&outputs), b"hi\n");

        let last = outputs.last().unwrap();
        assert!(last.exited);
        assert_eq!(last.exit_code, 0);

        // exited is the strict last message
        assert_eq!(outputs.iter().filter(|o| o.exited).count(), 1);
    }

    #[tokio::test]
    async fn test_command_not_found() {
        let (result, outputs) =
            run_collect(Input::start("/no/such/bin", vec![]), vec![], defaults()).await;

        result.unwrap();
        assert_eq!(outputs.len(), 1);
        let out = &outputs[0];
        assert!(out.exited);
        assert_eq!(out.exit_code, EXIT_NOT_FOUND);
        assert!(!out.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_combined_mode_single_output() {
        let mut first = Input::start(
            "/bin/sh",
            vec!["-c".to_string(), "echo a; echo b 1>&2".to_string()],
        );
        first.combined_output = true;

        let (result, outputs) = run_collect(first, vec![], defaults()).await;

        result.unwrap();
        assert_eq!(outputs.len(), 1, "combined mode sends exactly one output");
        let out = &outputs[0];
        assert!(out.exited);
        assert_eq!(out.exit_code, 0);

        let merged = String::from_utf8(out.combined_output.to_vec()).unwrap();
        assert!(merged == "a\nb\n" || merged == "b\na\n", "merged: {merged:?}");
    }

    #[tokio::test]
    async fn test_default_shell_substitution() {
        let shell = ShellDefaults::new("/bin/echo", vec!["fallback".to_string()]);
        let (result, outputs) = run_collect(Input::start("", vec![]), vec![], shell).await;

        result.unwrap();
        assert_eq!(stdout_concat(&outputs), b"fallback\n");
        assert_eq!(outputs.last().unwrap().exit_code, 0);
    }

    #[tokio::test]
    async fn test_stdin_byte_order() {
        // head -c exits after exactly 7 bytes, so the session terminates
        // without an explicit stdin close.
        let (result, outputs) = run_collect(
            Input::start("/bin/sh", vec!["-c".to_string(), "head -c 7".to_string()]),
            vec![Input::bytes(&b"one "[..]), Input::bytes(&b"two"[..])],
            defaults(),
        )
        .await;

        result.unwrap();
        assert_eq!(stdout_concat(&outputs), b"one two");
        assert_eq!(outputs.last().unwrap().exit_code, 0);
    }

    #[tokio::test]
    async fn test_signal_terminates_child() {
        let (result, outputs) = run_collect(
            Input::start("/bin/sleep", vec!["30".to_string()]),
            vec![Input::signal(libc::SIGTERM)],
            defaults(),
        )
        .await;

        result.unwrap();
        let last = outputs.last().unwrap();
        assert!(last.exited);
        assert_ne!(last.exit_code, 0);
    }

    #[tokio::test]
    async fn test_invalid_start_flags() {
        let mut first = Input::start("/bin/echo", vec![]);
        first.terminal = true;
        first.combined_output = true;

        let (result, outputs) = run_collect(first, vec![], defaults()).await;
        assert!(matches!(result, Err(SessionError::InvalidStart(_))));
        assert!(outputs.is_empty());
    }

    #[tokio::test]
    async fn test_first_input_must_start() {
        let (result, outputs) =
            run_collect(Input::bytes(&b"data"[..]), vec![], defaults()).await;
        assert!(matches!(result, Err(SessionError::InvalidStart(_))));
        assert!(outputs.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_sends_nothing() {
        let (_input_tx, input_rx) = mpsc::channel::<Input>(16);
        let (output_tx, mut output_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let shell = defaults();

        let engine = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                run_session(
                    Input::start("/bin/sleep", vec!["30".to_string()]),
                    input_rx,
                    output_tx,
                    cancel,
                    &shell,
                )
                .await
            })
        };

        // Give the child a moment to spawn, then cancel
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        timeout(TEST_TIMEOUT, engine).await.unwrap().unwrap().unwrap();
        assert!(output_rx.recv().await.is_none(), "no output after cancel");
    }

    #[tokio::test]
    async fn test_pty_echo_and_interrupt() {
        let mut first = Input::start("/bin/cat", vec![]);
        first.terminal = true;

        let (input_tx, input_rx) = mpsc::channel(16);
        let (output_tx, mut output_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let shell = defaults();

        let engine = tokio::spawn(async move {
            run_session(first, input_rx, output_tx, cancel, &shell).await
        });

        input_tx
            .send(Input {
                signal: libc::SIGWINCH,
                bytes: Bytes::from_static(b"80 24 0 0"),
                ..Input::default()
            })
            .await
            .unwrap();
        input_tx.send(Input::bytes(&b"hello\n"[..])).await.unwrap();

        // The PTY echoes the line back; wait for it before interrupting
        let mut seen = Vec::new();
        while !String::from_utf8_lossy(&seen).contains("hello") {
            let output = timeout(TEST_TIMEOUT, output_rx.recv())
                .await
                .unwrap()
                .expect("pty output before exit");
            assert!(!output.exited, "exit before echo");
            seen.extend_from_slice(&output.stdout);
        }

        input_tx.send(Input::signal(libc::SIGINT)).await.unwrap();

        let mut last = None;
        while let Ok(Some(output)) = timeout(TEST_TIMEOUT, output_rx.recv()).await {
            last = Some(output);
        }
        let last = last.expect("terminal output");
        assert!(last.exited);
        assert_ne!(last.exit_code, 0);

        timeout(TEST_TIMEOUT, engine).await.unwrap().unwrap().unwrap();
    }

    #[test]
    fn test_parse_winsize_full() {
        let winsize = parse_winsize(b"200 50 0 0").unwrap();
        assert_eq!(winsize.ws_col, 200);
        assert_eq!(winsize.ws_row, 50);
        assert_eq!(winsize.ws_xpixel, 0);
        assert_eq!(winsize.ws_ypixel, 0);
    }

    #[test]
    fn test_parse_winsize_pixels() {
        let winsize = parse_winsize(b"132 43 1280 860").unwrap();
        assert_eq!(winsize.ws_xpixel, 1280);
        assert_eq!(winsize.ws_ypixel, 860);
    }

    #[test]
    fn test_parse_winsize_too_short() {
        assert!(matches!(
            parse_winsize(b"x"),
            Err(SessionError::MalformedSignal(_))
        ));
    }

    #[test]
    fn test_parse_winsize_wrong_field_count() {
        assert!(matches!(
            parse_winsize(b"200 50 0"),
            Err(SessionError::MalformedSignal(_))
        ));
    }

    #[test]
    fn test_parse_winsize_garbage_field_is_zero() {
        let winsize = parse_winsize(b"abc 50 0 0").unwrap();
        assert_eq!(winsize.ws_col, 0);
        assert_eq!(winsize.ws_row, 50);
    }

    #[test]
    fn test_parse_winsize_overflow_is_zero() {
        let winsize = parse_winsize(b"99999 50 0 0").unwrap();
        assert_eq!(winsize.ws_col, 0);
    }
}

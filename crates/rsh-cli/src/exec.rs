//! Session execution against a directly reachable session host

use anyhow::{anyhow, bail, Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;

use rsh_core::net::{dial, Target};
use rsh_protocol::{Frame, FrameCodec, Input, Message, Output, SessionId};

use crate::terminal::{winsize_payload, RawModeGuard};

/// Options for one session invocation.
pub struct ExecOptions {
    pub terminal: bool,
    pub combined_output: bool,
    pub command: String,
    pub args: Vec<String>,
}

/// Execute a command on the session host and return its exit code.
pub async fn exec(
    target: &Target,
    tls: Option<&TlsConnector>,
    opts: ExecOptions,
) -> Result<i32> {
    if opts.terminal && opts.combined_output {
        bail!("terminal and combined output are mutually exclusive");
    }

    let io = dial(target, tls)
        .await
        .with_context(|| format!("dial {}", target.address))?;
    let mut framed = Framed::new(io, FrameCodec::new());
    let id = SessionId::new(1);

    let start = Input {
        start: true,
        command: opts.command,
        args: opts.args,
        terminal: opts.terminal,
        combined_output: opts.combined_output,
        ..Input::default()
    };
    framed
        .send(Frame::new(id, Message::Input(start)))
        .await
        .context("send start")?;

    if opts.terminal {
        run_terminal(framed, id).await
    } else if opts.combined_output {
        run_combined(framed, id).await
    } else {
        run_plain(framed, id).await
    }
}

type Transport = Framed<rsh_core::BoxedIo, FrameCodec>;

/// Plain mode: copy stdout/stderr frames to the local streams.
async fn run_plain(mut framed: Transport, id: SessionId) -> Result<i32> {
    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();

    while let Some(frame) = framed.next().await {
        let frame = frame.context("read stream")?;
        if frame.session_id != id {
            continue;
        }
        match frame.message {
            Message::Output(output) => {
                write_output(&mut stdout, &mut stderr, &output).await?;
                if output.exited {
                    return Ok(output.exit_code);
                }
            }
            Message::Error { code, message } => {
                bail!("session failed: {:?}: {}", code, message);
            }
            _ => {}
        }
    }
    Err(anyhow!("connection closed before exit"))
}

/// Combined mode: a single terminal message carries everything.
async fn run_combined(mut framed: Transport, id: SessionId) -> Result<i32> {
    while let Some(frame) = framed.next().await {
        let frame = frame.context("read stream")?;
        if frame.session_id != id {
            continue;
        }
        match frame.message {
            Message::Output(output) if output.exited => {
                let mut stdout = tokio::io::stdout();
                stdout.write_all(&output.combined_output).await?;
                stdout.flush().await?;
                return Ok(output.exit_code);
            }
            Message::Output(_) => {}
            Message::Error { code, message } => {
                bail!("session failed: {:?}: {}", code, message);
            }
            _ => {}
        }
    }
    Err(anyhow!("connection closed before exit"))
}

/// Terminal mode: raw local terminal, stdin bytes and signals forwarded,
/// PTY output rendered as it arrives.
async fn run_terminal(framed: Transport, id: SessionId) -> Result<i32> {
    // Raw mode is restored on every exit path by the guard's drop,
    // including error returns and panics below.
    let _raw = RawModeGuard::new().context("enable raw mode")?;

    let (mut sink, mut stream) = framed.split();

    // stdin bytes arrive over a channel fed by a dedicated reader task
    let (stdin_tx, mut stdin_rx) = mpsc::channel::<Vec<u8>>(64);
    tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if stdin_tx.send(buf[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut winch = signal(SignalKind::window_change()).context("install SIGWINCH handler")?;
    let mut hangup = signal(SignalKind::hangup()).context("install SIGHUP handler")?;
    let mut interrupt = signal(SignalKind::interrupt()).context("install SIGINT handler")?;
    let mut quit = signal(SignalKind::quit()).context("install SIGQUIT handler")?;
    let mut terminate = signal(SignalKind::terminate()).context("install SIGTERM handler")?;

    let mut stdout = tokio::io::stdout();

    // Tell the remote PTY our size right away
    sink.send(winch_frame(id)).await.context("send winsize")?;

    loop {
        tokio::select! {
            frame = stream.next() => {
                let Some(frame) = frame else {
                    return Err(anyhow!("connection closed before exit"));
                };
                let frame = frame.context("read stream")?;
                if frame.session_id != id {
                    continue;
                }
                match frame.message {
                    Message::Output(output) => {
                        if !output.stdout.is_empty() {
                            stdout.write_all(&output.stdout).await?;
                            stdout.flush().await?;
                        }
                        if output.exited {
                            return Ok(output.exit_code);
                        }
                    }
                    Message::Error { code, message } => {
                        bail!("session failed: {:?}: {}", code, message);
                    }
                    _ => {}
                }
            }

            data = stdin_rx.recv() => {
                let Some(data) = data else {
                    return Err(anyhow!("stdin closed"));
                };
                sink.send(Frame::new(id, Message::Input(Input::bytes(data))))
                    .await
                    .context("send stdin")?;
            }

            _ = winch.recv() => {
                sink.send(winch_frame(id)).await.context("send winsize")?;
            }
            _ = hangup.recv() => {
                sink.send(signal_frame(id, libc::SIGHUP)).await.context("send signal")?;
            }
            _ = interrupt.recv() => {
                sink.send(signal_frame(id, libc::SIGINT)).await.context("send signal")?;
            }
            _ = quit.recv() => {
                sink.send(signal_frame(id, libc::SIGQUIT)).await.context("send signal")?;
            }
            _ = terminate.recv() => {
                sink.send(signal_frame(id, libc::SIGTERM)).await.context("send signal")?;
            }
        }
    }
}

fn winch_frame(id: SessionId) -> Frame {
    Frame::new(
        id,
        Message::Input(Input {
            signal: libc::SIGWINCH,
            bytes: winsize_payload().into_bytes().into(),
            ..Input::default()
        }),
    )
}

fn signal_frame(id: SessionId, signo: i32) -> Frame {
    Frame::new(id, Message::Input(Input::signal(signo)))
}

async fn write_output(
    stdout: &mut tokio::io::Stdout,
    stderr: &mut tokio::io::Stderr,
    output: &Output,
) -> Result<()> {
    if !output.stdout.is_empty() {
        stdout.write_all(&output.stdout).await?;
        stdout.flush().await?;
    }
    if !output.stderr.is_empty() {
        stderr.write_all(&output.stderr).await?;
        stderr.flush().await?;
    }
    Ok(())
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exec channels over a pooled master connection.
//!
//! A remote command is an `ssh -S <control>` child. The ssh stack can close
//! the channel streams before the exit status is observable, so the wait
//! path records whichever arrives first and applies a short grace window on
//! stream-close-without-exit before synthesizing a status.

use crate::pool::{AcquireOptions, Connection, ConnectionPool};
use mux_core::{RuntimeError, SshConnectionConfig};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// How long to wait for the real exit status after both streams closed.
const CLOSE_WITHOUT_EXIT_GRACE: Duration = Duration::from_millis(250);

/// Options for spawning one remote command.
#[derive(Default)]
pub struct SpawnOptions {
    /// Allocate a remote PTY (`ssh -tt`).
    pub force_pty: bool,
    /// Connect timeout for the pre-flight acquisition, usually derived from
    /// the caller's exec timeout.
    pub connect_timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

/// Raw exit of a remote command's transport process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

/// Classify a transport-level break as opposed to an application exit.
///
/// ssh reports its own failures as exit 255; a remote command may exit 255
/// too, so the stderr tail must look transport-flavored before the pool is
/// told to fail the connection.
pub fn is_connection_failure(code: i32, stderr_tail: &str) -> bool {
    if code != 255 {
        return false;
    }
    const PATTERNS: &[&str] = &[
        "connection closed",
        "connection refused",
        "connection reset",
        "connection timed out",
        "broken pipe",
        "no route to host",
        "could not resolve hostname",
        "control socket",
        "mux_client",
        "kex_exchange",
        "host key verification failed",
        "permission denied",
        "lost connection",
    ];
    let lower = stderr_tail.to_lowercase();
    PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Acquire a connection and open an exec channel for `command`.
///
/// The command string is passed to the remote shell verbatim; callers are
/// expected to hand over a fully composed `bash -c` expression.
pub async fn spawn_remote_process(
    pool: &ConnectionPool,
    config: &SshConnectionConfig,
    command: &str,
    options: SpawnOptions,
) -> Result<RemoteChild, RuntimeError> {
    let connection = pool
        .acquire(
            config,
            AcquireOptions {
                cancel: options.cancel.clone(),
                timeout: options.connect_timeout,
                max_wait: None,
                on_wait: None,
            },
        )
        .await?;
    spawn_on_connection(&connection, command, options.force_pty)
}

/// Open an exec channel on an already-acquired connection.
pub fn spawn_on_connection(
    connection: &Connection,
    command: &str,
    force_pty: bool,
) -> Result<RemoteChild, RuntimeError> {
    let mut ssh = tokio::process::Command::new("ssh");
    ssh.arg("-o")
        .arg(format!("ControlPath={}", connection.control_path().display()))
        .arg("-o")
        .arg("BatchMode=yes");
    if force_pty {
        ssh.arg("-tt");
    } else {
        ssh.arg("-T");
    }
    ssh.arg(connection.destination())
        .arg("--")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child =
        ssh.spawn().map_err(|e| RuntimeError::Network(format!("failed to spawn ssh: {}", e)))?;
    Ok(RemoteChild::new(child))
}

/// Both stdio read streams reporting EOF approximates "channel closed".
struct StreamsClosed {
    remaining: AtomicUsize,
    notify: Notify,
}

impl StreamsClosed {
    fn new(streams: usize) -> Arc<Self> {
        Arc::new(Self { remaining: AtomicUsize::new(streams), notify: Notify::new() })
    }

    fn mark_one(&self) {
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }

    async fn all_closed(&self) {
        loop {
            if self.remaining.load(Ordering::SeqCst) == 0 {
                return;
            }
            let notified = self.notify.notified();
            if self.remaining.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Read stream wrapper that marks the close tracker at EOF.
struct EofTap<R> {
    inner: R,
    closed: Option<Arc<StreamsClosed>>,
}

impl<R: AsyncRead + Unpin> AsyncRead for EofTap<R> {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = std::pin::Pin::new(&mut this.inner).poll_read(cx, buf);
        if let std::task::Poll::Ready(Ok(())) = &poll {
            if buf.filled().len() == before {
                if let Some(closed) = this.closed.take() {
                    closed.mark_one();
                }
            }
        }
        poll
    }
}

/// Child-process-shaped handle for one remote command.
pub struct RemoteChild {
    child: tokio::process::Child,
    streams_closed: Arc<StreamsClosed>,
    recorded_exit: Option<RemoteExit>,
}

impl RemoteChild {
    pub fn new(child: tokio::process::Child) -> Self {
        Self { child, streams_closed: StreamsClosed::new(2), recorded_exit: None }
    }

    pub fn take_stdin(&mut self) -> Option<Box<dyn AsyncWrite + Send + Unpin>> {
        self.child.stdin.take().map(|s| Box::new(s) as Box<dyn AsyncWrite + Send + Unpin>)
    }

    pub fn take_stdout(&mut self) -> Option<Box<dyn AsyncRead + Send + Unpin>> {
        let closed = Arc::clone(&self.streams_closed);
        self.child.stdout.take().map(move |s| {
            Box::new(EofTap { inner: s, closed: Some(closed) })
                as Box<dyn AsyncRead + Send + Unpin>
        })
    }

    pub fn take_stderr(&mut self) -> Option<Box<dyn AsyncRead + Send + Unpin>> {
        let closed = Arc::clone(&self.streams_closed);
        self.child.stderr.take().map(move |s| {
            Box::new(EofTap { inner: s, closed: Some(closed) })
                as Box<dyn AsyncRead + Send + Unpin>
        })
    }

    /// Wait for the remote command to finish.
    ///
    /// Records the exit from whichever signal arrives first: the process
    /// status, or both streams closing. On close-without-exit, a grace
    /// window gives the status a chance to arrive before `-1` is
    /// synthesized.
    pub async fn wait(&mut self) -> std::io::Result<RemoteExit> {
        if let Some(exit) = self.recorded_exit {
            return Ok(exit);
        }

        enum First {
            Exited(std::io::Result<std::process::ExitStatus>),
            StreamsClosed,
        }

        let closed = Arc::clone(&self.streams_closed);
        let first = tokio::select! {
            status = self.child.wait() => First::Exited(status),
            _ = closed.all_closed() => First::StreamsClosed,
        };

        let exit = match first {
            First::Exited(status) => from_status(status?),
            First::StreamsClosed => {
                match tokio::time::timeout(CLOSE_WITHOUT_EXIT_GRACE, self.child.wait()).await {
                    Ok(status) => from_status(status?),
                    Err(_) => {
                        // Channel closed but the transport never produced a
                        // status; reap and report a synthesized failure.
                        let _ = self.child.start_kill();
                        let _ = self.child.wait().await;
                        RemoteExit { code: None, signal: None }
                    }
                }
            }
        };
        self.recorded_exit = Some(exit);
        Ok(exit)
    }

    pub fn kill(&mut self) {
        let _ = self.child.start_kill();
    }
}

fn from_status(status: std::process::ExitStatus) -> RemoteExit {
    #[cfg(unix)]
    let signal = std::os::unix::process::ExitStatusExt::signal(&status);
    #[cfg(not(unix))]
    let signal = None;
    RemoteExit { code: status.code(), signal }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;

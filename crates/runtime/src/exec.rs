// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exec stream types: options, exit classification, stdio handles.
//!
//! An [`ExecStream`] is what every backend hands back from `exec`: byte
//! readers for stdout/stderr, a write handle for stdin whose close is
//! idempotent on every exit path, and an outcome handle resolving exactly
//! once to the classified exit plus elapsed duration.

use mux_core::RuntimeError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

/// Boxed byte read stream (child stdout/stderr or a bridged pipe).
pub type ByteReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed byte write stream (child stdin).
pub type ByteWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Bytes of stderr retained for diagnostics on non-zero exits.
pub(crate) const STDERR_TAIL_LIMIT: usize = 8 * 1024;

/// Options for a single `exec` call.
#[derive(Clone, Default)]
pub struct ExecOptions {
    /// Working directory (required; `~` is expanded by the remote shell).
    pub cwd: String,
    /// Environment exported before the command.
    pub env: HashMap<String, String>,
    /// Stream-level timeout; also enforced remotely via a `timeout` wrapper.
    pub timeout_secs: Option<f64>,
    /// Cancellation: pre-spawn fires "aborted before execution", post-spawn
    /// kills the child and resolves the exit to [`ExecExit::Aborted`].
    pub cancel: Option<CancellationToken>,
    /// Request a PTY (interactive tools that refuse pipes).
    pub force_pty: bool,
}

impl ExecOptions {
    pub fn new(cwd: impl Into<String>) -> Self {
        Self { cwd: cwd.into(), ..Self::default() }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout_secs(mut self, secs: f64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Classified exit of an exec'd command.
///
/// The sentinels are distinct from any real child exit: a timed-out or
/// aborted command never reports the code the child would have produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecExit {
    /// Real child exit (`-1` when a signal terminated the child).
    Code(i32),
    /// The local timer fired (and the remote `timeout` wrapper killed it).
    Timeout,
    /// The caller's cancellation token fired.
    Aborted,
}

impl ExecExit {
    pub fn success(&self) -> bool {
        matches!(self, Self::Code(0))
    }

    /// Display-only integer form; sentinels map to reserved negatives that
    /// no real exit can produce (signal deaths are `-1`).
    pub fn as_code(&self) -> i32 {
        match self {
            Self::Code(code) => *code,
            Self::Timeout => -124,
            Self::Aborted => -125,
        }
    }
}

/// Final outcome of an exec: classified exit plus monotonic elapsed time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    pub exit: ExecExit,
    pub duration: Duration,
}

/// Receiver side of the single-resolution outcome.
#[derive(Clone)]
pub struct OutcomeHandle {
    rx: watch::Receiver<Option<Result<ExecOutcome, RuntimeError>>>,
}

impl OutcomeHandle {
    /// Wait for the outcome. Resolves exactly once internally; every caller
    /// observes the same value.
    pub async fn wait(&self) -> Result<ExecOutcome, RuntimeError> {
        let mut rx = self.rx.clone();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(outcome) = current {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return Err(RuntimeError::Exec("exit listener dropped".to_string()));
            }
        }
    }

    pub async fn exit(&self) -> Result<ExecExit, RuntimeError> {
        Ok(self.wait().await?.exit)
    }

    /// Elapsed time; by construction available only after `exit` resolves.
    pub async fn duration(&self) -> Result<Duration, RuntimeError> {
        Ok(self.wait().await?.duration)
    }
}

/// Sender side; resolves the outcome at most once.
pub(crate) struct OutcomeSender {
    tx: watch::Sender<Option<Result<ExecOutcome, RuntimeError>>>,
}

impl OutcomeSender {
    pub(crate) fn resolve(&self, outcome: Result<ExecOutcome, RuntimeError>) {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        });
    }
}

pub(crate) fn outcome_channel() -> (OutcomeSender, OutcomeHandle) {
    let (tx, rx) = watch::channel(None);
    (OutcomeSender { tx }, OutcomeHandle { rx })
}

/// A live exec'd command.
pub struct ExecStream {
    pub stdout: ByteReader,
    pub stderr: ByteReader,
    pub stdin: StdinHandle,
    pub outcome: OutcomeHandle,
    pub(crate) stderr_tail: StderrTail,
}

impl ExecStream {
    /// Snapshot of the retained stderr tail (diagnostics on failure).
    pub fn stderr_tail(&self) -> String {
        self.stderr_tail.snapshot()
    }
}

impl std::fmt::Debug for ExecStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecStream").finish_non_exhaustive()
    }
}

enum StdinCommand {
    Write(Vec<u8>),
    Close(oneshot::Sender<()>),
    Abort,
}

/// Write handle for a child's stdin.
///
/// Writes to a dead pipe are silently dropped; `close` is idempotent and
/// waits for the shutdown to flush (or fail) without re-raising
/// already-closed errors; `abort` destroys the pipe immediately.
#[derive(Clone)]
pub struct StdinHandle {
    tx: mpsc::Sender<StdinCommand>,
}

impl StdinHandle {
    /// Stdin pump for a child without a stdin pipe: every operation no-ops.
    pub fn disconnected() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self { tx }
    }

    pub async fn write(&self, bytes: impl Into<Vec<u8>>) {
        let _ = self.tx.send(StdinCommand::Write(bytes.into())).await;
    }

    pub async fn close(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(StdinCommand::Close(ack_tx)).await.is_err() {
            // Pump already gone: the pipe is closed, which is what we wanted.
            return;
        }
        let _ = ack_rx.await;
    }

    pub fn abort(&self) {
        let _ = self.tx.try_send(StdinCommand::Abort);
    }
}

/// Spawn the task that owns the child's stdin pipe.
pub(crate) fn spawn_stdin_pump(writer: ByteWriter) -> StdinHandle {
    let (tx, mut rx) = mpsc::channel::<StdinCommand>(64);
    tokio::spawn(async move {
        let mut writer = Some(writer);
        while let Some(command) = rx.recv().await {
            match command {
                StdinCommand::Write(bytes) => {
                    if let Some(w) = writer.as_mut() {
                        if w.write_all(&bytes).await.is_err() || w.flush().await.is_err() {
                            // Broken pipe: drop the writer, keep draining so
                            // later writes and closes stay no-ops.
                            writer = None;
                        }
                    }
                }
                StdinCommand::Close(ack) => {
                    if let Some(mut w) = writer.take() {
                        let _ = w.shutdown().await;
                    }
                    let _ = ack.send(());
                }
                StdinCommand::Abort => {
                    writer = None;
                }
            }
        }
    });
    StdinHandle { tx }
}

/// Bounded ring of the most recent stderr bytes.
#[derive(Clone, Default)]
pub(crate) struct StderrTail {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl StderrTail {
    pub(crate) fn append(&self, bytes: &[u8]) {
        let mut buf = self.buf.lock();
        buf.extend_from_slice(bytes);
        let len = buf.len();
        if len > STDERR_TAIL_LIMIT {
            buf.drain(..len - STDERR_TAIL_LIMIT);
        }
    }

    pub(crate) fn snapshot(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).into_owned()
    }
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;

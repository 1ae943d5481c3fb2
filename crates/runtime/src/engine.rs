// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared remote-execution engine.
//!
//! Every backend that reaches its filesystem through a transport (SSH,
//! Docker, and the local shell itself) delegates here. The engine owns
//! command composition, stdio bridging, exit classification, and the
//! timeout/abort machinery; the backend contributes a [`RemoteSpawner`].

use crate::exec::{
    outcome_channel, spawn_stdin_pump, ByteReader, ExecExit, ExecOptions, ExecOutcome, ExecStream,
    StderrTail, StdinHandle,
};
use crate::fileio;
use async_trait::async_trait;
use mux_core::path::{quote, quote_cwd};
use mux_core::RuntimeError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Non-interactive overrides exported after the caller's environment, so a
/// remote command never stalls on a pager or an editor prompt.
pub const NON_INTERACTIVE_ENV: &[(&str, &str)] = &[
    ("CI", "true"),
    ("GIT_PAGER", "cat"),
    ("PAGER", "cat"),
    ("GIT_TERMINAL_PROMPT", "0"),
    ("GIT_EDITOR", "true"),
    ("TERM", "dumb"),
];

/// Raw exit of a spawned transport process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ProcessExit {
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;
        Self { code: status.code(), signal }
    }
}

/// A spawned transport process: three stdio streams plus wait/kill.
///
/// Implemented directly by `tokio::process::Child` for local-ish backends;
/// the SSH transport wraps its child to resolve the close-vs-exit race.
#[async_trait]
pub trait SpawnedProcess: Send {
    fn take_stdin(&mut self) -> Option<crate::exec::ByteWriter>;
    fn take_stdout(&mut self) -> Option<ByteReader>;
    fn take_stderr(&mut self) -> Option<ByteReader>;
    /// Wait for termination. Must be safe to call again after [`kill`](Self::kill).
    async fn wait(&mut self) -> std::io::Result<ProcessExit>;
    /// Best-effort immediate kill.
    fn kill(&mut self);
}

#[async_trait]
impl SpawnedProcess for tokio::process::Child {
    fn take_stdin(&mut self) -> Option<crate::exec::ByteWriter> {
        self.stdin.take().map(|s| Box::new(s) as crate::exec::ByteWriter)
    }

    fn take_stdout(&mut self) -> Option<ByteReader> {
        self.stdout.take().map(|s| Box::new(s) as ByteReader)
    }

    fn take_stderr(&mut self) -> Option<ByteReader> {
        self.stderr.take().map(|s| Box::new(s) as ByteReader)
    }

    async fn wait(&mut self) -> std::io::Result<ProcessExit> {
        let status = tokio::process::Child::wait(self).await?;
        Ok(ProcessExit::from_status(status))
    }

    fn kill(&mut self) {
        let _ = self.start_kill();
    }
}

/// Backend-specific spawn primitive plus the hooks the engine calls around it.
#[async_trait]
pub trait RemoteSpawner: Send + Sync + 'static {
    /// Launch the fully composed command string under the backend.
    async fn spawn_remote_process(
        &self,
        command: &str,
        options: &ExecOptions,
    ) -> Result<Box<dyn SpawnedProcess>, RuntimeError>;

    /// Called on every exit so the backend can update transport health.
    fn on_exit_code(&self, _exit: &ExecExit, _options: &ExecOptions, _stderr_tail: &str) {}

    /// Compound command used by `write_file`; SSH overrides it to preserve
    /// symlink targets.
    fn write_file_command(&self, path: &str, tmp_path: &str) -> String {
        fileio::default_write_command(path, tmp_path)
    }
}

/// Compose the final shell expression dispatched to the backend:
/// `cd` + env exports + non-interactive overrides + the command, joined with
/// `&&`, wrapped in `bash -c`, optionally under a remote-side kill timeout.
pub fn compose_command(command: &str, options: &ExecOptions) -> String {
    let mut parts = Vec::with_capacity(options.env.len() + NON_INTERACTIVE_ENV.len() + 2);
    parts.push(format!("cd {}", quote_cwd(&options.cwd)));

    let mut keys: Vec<&String> = options.env.keys().collect();
    keys.sort();
    for key in keys {
        if let Some(value) = options.env.get(key) {
            parts.push(format!("export {}={}", key, quote(value)));
        }
    }
    for (key, value) in NON_INTERACTIVE_ENV {
        if *key == "TERM" && options.force_pty {
            continue;
        }
        parts.push(format!("export {}={}", key, value));
    }

    parts.push(command.to_string());
    let wrapped = format!("bash -c {}", quote(&parts.join(" && ")));

    match options.timeout_secs {
        // Remote-side kill one second past the requested deadline, so a lost
        // local timer never leaves an orphan.
        Some(secs) => format!("timeout -s KILL {} {}", secs.max(0.0).ceil() as u64 + 1, wrapped),
        None => wrapped,
    }
}

/// The shared engine, parameterized by a backend spawner.
#[derive(Clone)]
pub struct RemoteEngine {
    spawner: Arc<dyn RemoteSpawner>,
}

/// Captured output of a fully drained exec.
pub struct Captured {
    pub exit: ExecExit,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl Captured {
    pub fn stdout_utf8(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

impl RemoteEngine {
    pub fn new(spawner: Arc<dyn RemoteSpawner>) -> Self {
        Self { spawner }
    }

    pub fn spawner(&self) -> &Arc<dyn RemoteSpawner> {
        &self.spawner
    }

    /// Launch `command` under the backend and bridge its stdio.
    pub async fn exec(
        &self,
        command: &str,
        options: ExecOptions,
    ) -> Result<ExecStream, RuntimeError> {
        if let Some(cancel) = &options.cancel {
            if cancel.is_cancelled() {
                return Err(RuntimeError::Exec("aborted before execution".to_string()));
            }
        }

        let final_command = compose_command(command, &options);
        tracing::debug!(command = %final_command, cwd = %options.cwd, "exec");

        let start = Instant::now();
        let mut process = self.spawner.spawn_remote_process(&final_command, &options).await?;

        let stdin = match process.take_stdin() {
            Some(writer) => spawn_stdin_pump(writer),
            None => StdinHandle::disconnected(),
        };
        let stdout: ByteReader =
            process.take_stdout().unwrap_or_else(|| Box::new(tokio::io::empty()));
        let tail = StderrTail::default();
        let stderr: ByteReader = match process.take_stderr() {
            Some(reader) => tap_stderr(reader, tail.clone()),
            None => Box::new(tokio::io::empty()),
        };

        let (outcome_tx, outcome) = outcome_channel();
        let spawner = Arc::clone(&self.spawner);
        let hook_options = options.clone();
        let exit_tail = tail.clone();
        tokio::spawn(async move {
            let resolved = wait_for_exit(&mut process, &hook_options).await;
            match resolved {
                Ok(exit) => {
                    spawner.on_exit_code(&exit, &hook_options, &exit_tail.snapshot());
                    outcome_tx.resolve(Ok(ExecOutcome { exit, duration: start.elapsed() }));
                }
                Err(error) => outcome_tx.resolve(Err(error)),
            }
        });

        Ok(ExecStream { stdout, stderr, stdin, outcome, stderr_tail: tail })
    }

    /// Exec, close stdin, drain both streams, and wait for the exit.
    pub async fn run_capture(
        &self,
        command: &str,
        options: ExecOptions,
    ) -> Result<Captured, RuntimeError> {
        let mut stream = self.exec(command, options).await?;
        stream.stdin.close().await;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let _ = tokio::join!(
            stream.stdout.read_to_end(&mut stdout),
            stream.stderr.read_to_end(&mut stderr),
        );

        let outcome = stream.outcome.wait().await?;
        Ok(Captured {
            exit: outcome.exit,
            stdout,
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

enum Waited {
    Interrupted(ExecExit),
    Done(std::io::Result<ProcessExit>),
}

/// Single listener resolving the exit: abort beats timeout beats the child's
/// own status; the timer is implicitly cleared on any resolution.
async fn wait_for_exit(
    process: &mut Box<dyn SpawnedProcess>,
    options: &ExecOptions,
) -> Result<ExecExit, RuntimeError> {
    let cancel = options.cancel.clone();
    let cancelled = async {
        match &cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    };
    let timer = async {
        match options.timeout_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs_f64(secs.max(0.0))).await,
            None => std::future::pending().await,
        }
    };

    let waited = tokio::select! {
        biased;
        _ = cancelled => Waited::Interrupted(ExecExit::Aborted),
        _ = timer => Waited::Interrupted(ExecExit::Timeout),
        result = process.wait() => Waited::Done(result),
    };

    match waited {
        Waited::Interrupted(exit) => {
            process.kill();
            let _ = process.wait().await;
            Ok(exit)
        }
        Waited::Done(Ok(exit)) => Ok(classify_exit(exit)),
        Waited::Done(Err(error)) => {
            Err(RuntimeError::Exec(format!("failed to reap process: {}", error)))
        }
    }
}

fn classify_exit(exit: ProcessExit) -> ExecExit {
    match exit.code {
        Some(code) => ExecExit::Code(code),
        None => ExecExit::Code(-1),
    }
}

/// Bridge stderr through a duplex pipe, tapping a bounded tail for
/// diagnostics. If the caller drops their half we keep draining so the tail
/// stays current and the child never blocks on a full pipe.
fn tap_stderr(mut reader: ByteReader, tail: StderrTail) -> ByteReader {
    let (writer, read_half) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        let mut writer = Some(writer);
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    tail.append(&buf[..n]);
                    if let Some(w) = writer.as_mut() {
                        if w.write_all(&buf[..n]).await.is_err() {
                            writer = None;
                        }
                    }
                }
            }
        }
    });
    Box::new(read_half)
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;

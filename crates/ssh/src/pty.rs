// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interactive PTY sessions over a pooled connection.
//!
//! The interactive `ssh -tt` child runs inside a local PTY so `resize`
//! works end to end. PTY I/O is blocking, so a reader thread and a waiter
//! thread bridge into async channels.

use crate::pool::Connection;
use mux_core::path::quote_cwd;
use mux_core::RuntimeError;
use parking_lot::Mutex;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, oneshot};

/// Geometry and target for one interactive session.
#[derive(Debug, Clone)]
pub struct PtySessionConfig {
    pub workspace_path: String,
    pub cols: u16,
    pub rows: u16,
}

/// Subscription side of a PTY session.
pub struct PtyEvents {
    pub data: mpsc::UnboundedReceiver<Vec<u8>>,
    pub exit: oneshot::Receiver<i32>,
}

/// A live interactive session.
///
/// Writes after close are no-ops; pipe-closure write errors close the
/// session silently.
pub struct PtySession {
    master: Mutex<Box<dyn MasterPty + Send>>,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    closed: AtomicBool,
}

impl PtySession {
    pub fn write(&self, data: &[u8]) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let mut writer = self.writer.lock();
        let Some(w) = writer.as_mut() else {
            return;
        };
        let result = w.write_all(data).and_then(|_| w.flush());
        if let Err(error) = result {
            if is_ignorable_pipe_closure(&error) {
                *writer = None;
                self.closed.store(true, Ordering::SeqCst);
            } else {
                tracing::warn!(error = %error, "pty write failed");
            }
        }
    }

    pub fn resize(&self, cols: u16, rows: u16) {
        let size = PtySize { rows, cols, pixel_width: 0, pixel_height: 0 };
        if let Err(error) = self.master.lock().resize(size) {
            tracing::debug!(error = %error, "pty resize failed");
        }
    }

    pub fn kill(&self) {
        self.closed.store(true, Ordering::SeqCst);
        *self.writer.lock() = None;
        if let Err(error) = self.killer.lock().kill() {
            tracing::debug!(error = %error, "pty kill failed");
        }
    }
}

/// The PTY reports EIO (or a plain broken pipe) once the child side is gone.
fn is_ignorable_pipe_closure(error: &std::io::Error) -> bool {
    matches!(error.kind(), std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::WriteZero)
        || error.raw_os_error() == Some(5)
}

/// Open an interactive channel on `connection` configured as
/// `xterm-256color`, entering the workspace before handing over control.
pub fn create_pty_session(
    connection: &Connection,
    config: &PtySessionConfig,
) -> Result<(PtySession, PtyEvents), RuntimeError> {
    let mut command = CommandBuilder::new("ssh");
    command.arg("-o");
    command.arg(format!("ControlPath={}", connection.control_path().display()));
    command.arg("-o");
    command.arg("BatchMode=yes");
    command.arg("-tt");
    command.arg(connection.destination());
    spawn_pty_session(command, config)
}

/// Host an arbitrary command inside a local PTY (the ssh path above, a
/// plain shell in tests).
pub(crate) fn spawn_pty_session(
    mut command: CommandBuilder,
    config: &PtySessionConfig,
) -> Result<(PtySession, PtyEvents), RuntimeError> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows: config.rows,
            cols: config.cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| RuntimeError::Exec(format!("failed to allocate pty: {}", e)))?;

    command.env("TERM", "xterm-256color");

    let mut child = pair
        .slave
        .spawn_command(command)
        .map_err(|e| RuntimeError::Network(format!("failed to spawn interactive ssh: {}", e)))?;
    drop(pair.slave);

    let killer = child.clone_killer();
    let mut reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| RuntimeError::Exec(format!("failed to open pty reader: {}", e)))?;
    let writer = pair
        .master
        .take_writer()
        .map_err(|e| RuntimeError::Exec(format!("failed to open pty writer: {}", e)))?;

    let (data_tx, data_rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if data_tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let (exit_tx, exit_rx) = oneshot::channel();
    std::thread::spawn(move || {
        let code = match child.wait() {
            Ok(status) => status.exit_code() as i32,
            Err(_) => -1,
        };
        let _ = exit_tx.send(code);
    });

    let session = PtySession {
        master: Mutex::new(pair.master),
        writer: Mutex::new(Some(writer)),
        killer: Mutex::new(killer),
        closed: AtomicBool::new(false),
    };

    // Enter the workspace before the caller sees the stream; a missing
    // directory ends the session instead of leaving a shell elsewhere.
    session.write(format!("cd {} || exit 1\n", quote_cwd(&config.workspace_path)).as_bytes());

    Ok((session, PtyEvents { data: data_rx, exit: exit_rx }))
}

#[cfg(test)]
#[path = "pty_tests.rs"]
mod tests;

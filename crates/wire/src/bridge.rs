// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child-process stdio bridge.
//!
//! Reads the child's stdout line by line, parses each non-empty line, and
//! delivers events on a channel. Writes serialize one message per line.
//! `close` shuts stdin and cancels the read loop, idempotently; the child's
//! exit always produces a final `Closed` event.

use crate::codec::{decode_line, encode_line, ProtocolError};
use crate::message::RpcMessage;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// What the read side produces.
#[derive(Debug)]
pub enum BridgeEvent {
    Message(RpcMessage),
    /// A line that was not valid JSON-RPC; the stream continues.
    ParseError { line: String, error: String },
    /// The child exited (or the bridge was closed and the child reaped).
    Closed { exit_code: i32 },
}

/// Write/control half of a stdio bridge.
pub struct StdioBridge {
    stdin: Mutex<Option<tokio::process::ChildStdin>>,
    cancel: CancellationToken,
}

impl StdioBridge {
    /// Take over a spawned child's stdio. The child must have piped stdin
    /// and stdout.
    pub fn spawn(
        mut child: tokio::process::Child,
    ) -> (Self, mpsc::UnboundedReceiver<BridgeEvent>) {
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let cancel = CancellationToken::new();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let read_cancel = cancel.clone();
        tokio::spawn(async move {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                loop {
                    let next = tokio::select! {
                        _ = read_cancel.cancelled() => break,
                        next = lines.next_line() => next,
                    };
                    match next {
                        Ok(Some(line)) => {
                            let trimmed = line.trim();
                            if trimmed.is_empty() {
                                continue;
                            }
                            let event = match decode_line(trimmed) {
                                Ok(message) => BridgeEvent::Message(message),
                                Err(error) => BridgeEvent::ParseError {
                                    line: line.clone(),
                                    error: error.to_string(),
                                },
                            };
                            if event_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Ok(None) | Err(_) => break,
                    }
                }
            }

            // Reap the child and propagate the exit. After a close, a server
            // that ignores its closed stdin gets a short grace, then a kill.
            let exit_code = match child.try_wait() {
                Ok(Some(status)) => status.code().unwrap_or(-1),
                _ => {
                    if read_cancel.is_cancelled() {
                        match tokio::time::timeout(
                            std::time::Duration::from_secs(3),
                            child.wait(),
                        )
                        .await
                        {
                            Ok(Ok(status)) => status.code().unwrap_or(-1),
                            _ => {
                                let _ = child.start_kill();
                                child.wait().await.map(|s| s.code().unwrap_or(-1)).unwrap_or(-1)
                            }
                        }
                    } else {
                        child.wait().await.map(|s| s.code().unwrap_or(-1)).unwrap_or(-1)
                    }
                }
            };
            let _ = event_tx.send(BridgeEvent::Closed { exit_code });
        });

        (Self { stdin: Mutex::new(stdin), cancel }, event_rx)
    }

    /// Serialize and write one message.
    pub async fn send(&self, message: &RpcMessage) -> Result<(), ProtocolError> {
        let bytes = encode_line(message)?;
        let mut stdin = self.stdin.lock().await;
        let writer = stdin.as_mut().ok_or(ProtocolError::Closed)?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Close stdin, then cancel the stdout read loop. Idempotent.
    pub async fn close(&self) {
        if let Some(mut stdin) = self.stdin.lock().await.take() {
            let _ = stdin.shutdown().await;
        }
        self.cancel.cancel();
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;

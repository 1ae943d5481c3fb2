// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File I/O layered on top of `exec`.
//!
//! Remote backends have no filesystem API of their own: reads are `cat`,
//! writes are an atomic temp-file-then-`mv`, stat is `stat -c`. The local
//! backend bypasses all of this with direct OS calls but shares the same
//! reader/writer surface.

use crate::engine::RemoteEngine;
use crate::exec::{ByteReader, ExecExit, ExecOptions, ExecOutcome, OutcomeHandle, StdinHandle, StderrTail};
use async_trait::async_trait;
use mux_core::path::quote;
use mux_core::RuntimeError;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};
use tokio_util::sync::CancellationToken;

/// Remote `cat` gets a generous but bounded deadline.
const READ_FILE_TIMEOUT_SECS: f64 = 300.0;

/// Byte read stream for file contents.
pub type FileReader = Box<dyn AsyncRead + Send + Unpin>;

/// Byte write stream for file contents; `close` commits the write.
pub type FileWriter = Box<dyn FileWrite>;

/// Stat result, uniform across backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub modified_ms: u64,
    pub is_directory: bool,
}

/// Write half of a file operation.
#[async_trait]
pub trait FileWrite: Send {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), RuntimeError>;
    /// Commit the write. Idempotent; later calls return the first result's
    /// success without redoing work.
    async fn close(&mut self) -> Result<(), RuntimeError>;
    /// Destroy the underlying stream without committing.
    fn abort(&mut self);
}

/// Default remote write: create parents, stream into a temp sibling, then
/// rename over the target so a crash never leaves a truncated file.
pub fn default_write_command(path: &str, tmp_path: &str) -> String {
    let q_path = quote(path);
    let q_tmp = quote(tmp_path);
    format!("mkdir -p \"$(dirname {q_path})\" && cat > {q_tmp} && mv {q_tmp} {q_path}")
}

pub(crate) fn tmp_sibling(path: &str) -> String {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    format!("{}.tmp.{}", path, millis)
}

/// Parse `stat -c '%s %Y %F'` output.
pub(crate) fn parse_stat_output(output: &str) -> Result<FileStat, RuntimeError> {
    let trimmed = output.trim();
    let mut parts = trimmed.splitn(3, ' ');
    let size = parts
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| RuntimeError::FileIo(format!("unparseable stat output: {:?}", trimmed)))?;
    let modified_secs = parts
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| RuntimeError::FileIo(format!("unparseable stat output: {:?}", trimmed)))?;
    let kind = parts.next().unwrap_or_default();
    Ok(FileStat {
        size,
        modified_ms: modified_secs * 1000,
        is_directory: kind == "directory",
    })
}

pub(crate) async fn remote_read_file(
    engine: &RemoteEngine,
    path: &str,
    cancel: Option<CancellationToken>,
) -> Result<FileReader, RuntimeError> {
    let mut options = ExecOptions::new("/").timeout_secs(READ_FILE_TIMEOUT_SECS);
    options.cancel = cancel;

    let stream = engine.exec(&format!("cat {}", quote(path)), options).await?;
    stream.stdin.close().await;

    // stderr is dropped here; the engine keeps draining it into the tail.
    Ok(Box::new(RemoteFileReader::new(stream.stdout, stream.outcome, stream.stderr_tail)))
}

pub(crate) async fn remote_write_file(
    engine: &RemoteEngine,
    path: &str,
    cancel: Option<CancellationToken>,
) -> Result<FileWriter, RuntimeError> {
    let tmp = tmp_sibling(path);
    let command = engine.spawner().write_file_command(path, &tmp);

    let mut options = ExecOptions::new("/");
    options.cancel = cancel;
    let stream = engine.exec(&command, options).await?;

    Ok(Box::new(RemoteFileWriter {
        stdin: stream.stdin,
        outcome: stream.outcome,
        tail: stream.stderr_tail,
        closed: None,
    }))
}

pub(crate) async fn remote_stat(engine: &RemoteEngine, path: &str) -> Result<FileStat, RuntimeError> {
    let command = format!("stat -c '%s %Y %F' {}", quote(path));
    let captured =
        engine.run_capture(&command, ExecOptions::new("/").timeout_secs(60.0)).await?;
    match captured.exit {
        ExecExit::Code(0) => parse_stat_output(&captured.stdout_utf8()),
        ExecExit::Code(code) => Err(RuntimeError::file_io_from_exit(code, &captured.stderr)),
        ExecExit::Timeout => Err(RuntimeError::Timeout),
        ExecExit::Aborted => Err(RuntimeError::Aborted),
    }
}

pub(crate) async fn remote_ensure_dir(
    engine: &RemoteEngine,
    path: &str,
) -> Result<(), RuntimeError> {
    let command = format!("mkdir -p {}", quote(path));
    let captured =
        engine.run_capture(&command, ExecOptions::new("/").timeout_secs(60.0)).await?;
    match captured.exit {
        ExecExit::Code(0) => Ok(()),
        ExecExit::Code(code) => Err(RuntimeError::file_io_from_exit(code, &captured.stderr)),
        ExecExit::Timeout => Err(RuntimeError::Timeout),
        ExecExit::Aborted => Err(RuntimeError::Aborted),
    }
}

type OutcomeFuture = Pin<Box<dyn Future<Output = Result<ExecOutcome, RuntimeError>> + Send>>;

enum ReadState {
    Streaming,
    Finishing(OutcomeFuture),
    Done,
}

/// Reader that forwards `cat` stdout and converts a non-zero exit into a
/// `FILE_IO` error at EOF instead of reporting a silently short file.
struct RemoteFileReader {
    inner: ByteReader,
    outcome: Option<OutcomeHandle>,
    tail: StderrTail,
    state: ReadState,
}

impl RemoteFileReader {
    fn new(inner: ByteReader, outcome: OutcomeHandle, tail: StderrTail) -> Self {
        Self { inner, outcome: Some(outcome), tail, state: ReadState::Streaming }
    }
}

impl AsyncRead for RemoteFileReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                ReadState::Streaming => {
                    let before = buf.filled().len();
                    match Pin::new(&mut this.inner).poll_read(cx, buf) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(error)) => return Poll::Ready(Err(error)),
                        Poll::Ready(Ok(())) => {
                            if buf.filled().len() > before {
                                return Poll::Ready(Ok(()));
                            }
                            // EOF on the pipe: verify the exit before
                            // reporting end-of-file to the caller.
                            let handle = match this.outcome.take() {
                                Some(handle) => handle,
                                None => {
                                    this.state = ReadState::Done;
                                    return Poll::Ready(Ok(()));
                                }
                            };
                            this.state = ReadState::Finishing(Box::pin(async move {
                                handle.wait().await
                            }));
                        }
                    }
                }
                ReadState::Finishing(future) => {
                    let outcome = match future.as_mut().poll(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(outcome) => outcome,
                    };
                    this.state = ReadState::Done;
                    let error = match outcome {
                        Ok(ExecOutcome { exit: ExecExit::Code(0), .. }) => {
                            return Poll::Ready(Ok(()));
                        }
                        Ok(ExecOutcome { exit: ExecExit::Code(code), .. }) => {
                            RuntimeError::file_io_from_exit(code, &this.tail.snapshot())
                        }
                        Ok(ExecOutcome { exit: ExecExit::Timeout, .. }) => RuntimeError::Timeout,
                        Ok(ExecOutcome { exit: ExecExit::Aborted, .. }) => RuntimeError::Aborted,
                        Err(error) => error,
                    };
                    return Poll::Ready(Err(io::Error::other(error.to_string())));
                }
                ReadState::Done => return Poll::Ready(Ok(())),
            }
        }
    }
}

/// Writer streaming into the remote temp-then-rename pipeline.
struct RemoteFileWriter {
    stdin: StdinHandle,
    outcome: OutcomeHandle,
    tail: StderrTail,
    closed: Option<Result<(), RuntimeError>>,
}

#[async_trait]
impl FileWrite for RemoteFileWriter {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), RuntimeError> {
        if self.closed.is_some() {
            return Err(RuntimeError::FileIo("write after close".to_string()));
        }
        self.stdin.write(bytes.to_vec()).await;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), RuntimeError> {
        if let Some(result) = &self.closed {
            return result.clone();
        }
        self.stdin.close().await;
        let result = match self.outcome.wait().await {
            Ok(ExecOutcome { exit: ExecExit::Code(0), .. }) => Ok(()),
            Ok(ExecOutcome { exit: ExecExit::Code(code), .. }) => {
                Err(RuntimeError::file_io_from_exit(code, &self.tail.snapshot()))
            }
            Ok(ExecOutcome { exit: ExecExit::Timeout, .. }) => Err(RuntimeError::Timeout),
            Ok(ExecOutcome { exit: ExecExit::Aborted, .. }) => Err(RuntimeError::Aborted),
            Err(error) => Err(error),
        };
        self.closed = Some(result.clone());
        result
    }

    fn abort(&mut self) {
        self.stdin.abort();
        self.closed = Some(Err(RuntimeError::Aborted));
    }
}

/// Local writer: temp sibling in the same directory, committed by rename.
pub(crate) struct LocalFileWriter {
    file: Option<tokio::fs::File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    closed: Option<Result<(), RuntimeError>>,
}

impl LocalFileWriter {
    pub(crate) async fn create(path: PathBuf) -> Result<Self, RuntimeError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RuntimeError::FileIo(e.to_string()))?;
        }
        let tmp_path = PathBuf::from(tmp_sibling(&path.to_string_lossy()));
        let file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| RuntimeError::FileIo(e.to_string()))?;
        Ok(Self { file: Some(file), tmp_path, final_path: path, closed: None })
    }
}

#[async_trait]
impl FileWrite for LocalFileWriter {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), RuntimeError> {
        match self.file.as_mut() {
            Some(file) => {
                file.write_all(bytes).await.map_err(|e| RuntimeError::FileIo(e.to_string()))
            }
            None => Err(RuntimeError::FileIo("write after close".to_string())),
        }
    }

    async fn close(&mut self) -> Result<(), RuntimeError> {
        if let Some(result) = &self.closed {
            return result.clone();
        }
        let result = match self.file.take() {
            Some(mut file) => {
                let flushed = async {
                    file.flush().await.map_err(|e| RuntimeError::FileIo(e.to_string()))?;
                    file.sync_all().await.map_err(|e| RuntimeError::FileIo(e.to_string()))?;
                    drop(file);
                    tokio::fs::rename(&self.tmp_path, &self.final_path)
                        .await
                        .map_err(|e| RuntimeError::FileIo(e.to_string()))
                };
                flushed.await
            }
            None => Ok(()),
        };
        self.closed = Some(result.clone());
        result
    }

    fn abort(&mut self) {
        self.file = None;
        self.closed = Some(Err(RuntimeError::Aborted));
        let tmp = self.tmp_path.clone();
        tokio::spawn(async move {
            let _ = tokio::fs::remove_file(tmp).await;
        });
    }
}

#[cfg(test)]
#[path = "fileio_tests.rs"]
mod tests;

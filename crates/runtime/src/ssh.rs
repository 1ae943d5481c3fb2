// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSH-backed runtime (plain and managed-cloud variants).
//!
//! Glues the shared remote core onto the mux-ssh transport: the spawner
//! routes composed commands over the pooled master connection, exits feed
//! pool health, and the write path preserves symlink targets.

use crate::engine::{ProcessExit, RemoteEngine, RemoteSpawner, SpawnedProcess};
use crate::exec::{ByteReader, ByteWriter, ExecExit, ExecOptions, ExecStream};
use crate::fileio::{FileReader, FileStat, FileWriter};
use crate::lifecycle::{
    CreateResult, DeleteResult, ForkResult, InitLogger, InitResult, RenameResult,
};
use crate::remote::RemoteRuntimeCore;
use crate::runtime::Runtime;
use async_trait::async_trait;
use mux_core::path::quote;
use mux_core::{RuntimeError, RuntimeKind, SshConnectionConfig};
use mux_ssh::pool::{AcquireOptions, ConnectionPool};
use mux_ssh::process::{is_connection_failure, RemoteChild, SpawnOptions};
use mux_ssh::pty::{PtyEvents, PtySession, PtySessionConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Adapter: a mux-ssh remote child as an engine process.
struct SshProcess(RemoteChild);

#[async_trait]
impl SpawnedProcess for SshProcess {
    fn take_stdin(&mut self) -> Option<ByteWriter> {
        self.0.take_stdin()
    }

    fn take_stdout(&mut self) -> Option<ByteReader> {
        self.0.take_stdout()
    }

    fn take_stderr(&mut self) -> Option<ByteReader> {
        self.0.take_stderr()
    }

    async fn wait(&mut self) -> std::io::Result<ProcessExit> {
        let exit = self.0.wait().await?;
        Ok(ProcessExit { code: exit.code, signal: exit.signal })
    }

    fn kill(&mut self) {
        self.0.kill();
    }
}

struct SshSpawner {
    pool: Arc<ConnectionPool>,
    config: SshConnectionConfig,
}

#[async_trait]
impl RemoteSpawner for SshSpawner {
    async fn spawn_remote_process(
        &self,
        command: &str,
        options: &ExecOptions,
    ) -> Result<Box<dyn SpawnedProcess>, RuntimeError> {
        // Derive the pre-flight connect timeout from the exec timeout,
        // bounded to something sane.
        let connect_timeout = options
            .timeout_secs
            .map(|secs| Duration::from_secs_f64(secs.max(1.0)).min(MAX_CONNECT_TIMEOUT));
        let child = mux_ssh::process::spawn_remote_process(
            &self.pool,
            &self.config,
            command,
            SpawnOptions {
                force_pty: options.force_pty,
                connect_timeout,
                cancel: options.cancel.clone(),
            },
        )
        .await?;
        Ok(Box::new(SshProcess(child)))
    }

    fn on_exit_code(&self, exit: &ExecExit, _options: &ExecOptions, stderr_tail: &str) {
        if let ExecExit::Code(code) = exit {
            if is_connection_failure(*code, stderr_tail) {
                let reason = stderr_tail.trim();
                let reason = if reason.is_empty() { "ssh exited 255" } else { reason };
                self.pool.report_failure(&self.config, reason);
            } else {
                self.pool.mark_healthy(&self.config);
            }
        }
    }

    /// Like the default temp-then-rename, but when the target is a symlink
    /// the payload lands in the link's resolved target instead of replacing
    /// the link itself.
    fn write_file_command(&self, path: &str, tmp_path: &str) -> String {
        let q = quote(path);
        let q_tmp = quote(tmp_path);
        format!(
            "mkdir -p \"$(dirname {q})\" && cat > {q_tmp} && \
             if [ -L {q} ]; then mv {q_tmp} \"$(readlink -f {q})\"; else mv {q_tmp} {q}; fi"
        )
    }
}

/// Runtime over an SSH-reachable host.
pub struct SshRuntime {
    core: RemoteRuntimeCore,
    pool: Arc<ConnectionPool>,
    config: SshConnectionConfig,
    coder_suffix: Option<String>,
}

impl SshRuntime {
    pub fn new(
        pool: Arc<ConnectionPool>,
        config: SshConnectionConfig,
        remote_src_dir: String,
    ) -> Self {
        Self::build(pool, config, remote_src_dir, RuntimeKind::Ssh, None)
    }

    /// Managed-cloud variant: `ensure_ready` maintains the proxy block in
    /// `~/.ssh/config` before dialing.
    pub fn coder(
        pool: Arc<ConnectionPool>,
        config: SshConnectionConfig,
        remote_src_dir: String,
        hostname_suffix: String,
    ) -> Self {
        Self::build(pool, config, remote_src_dir, RuntimeKind::CoderSsh, Some(hostname_suffix))
    }

    fn build(
        pool: Arc<ConnectionPool>,
        config: SshConnectionConfig,
        remote_src_dir: String,
        kind: RuntimeKind,
        coder_suffix: Option<String>,
    ) -> Self {
        let spawner =
            Arc::new(SshSpawner { pool: Arc::clone(&pool), config: config.clone() });
        let engine = RemoteEngine::new(spawner);
        Self {
            core: RemoteRuntimeCore::new(kind, engine, remote_src_dir),
            pool,
            config,
            coder_suffix,
        }
    }

    pub fn connection_config(&self) -> &SshConnectionConfig {
        &self.config
    }

    /// Open an interactive PTY session rooted in `workspace_path`.
    pub async fn create_pty_session(
        &self,
        workspace_path: &str,
        cols: u16,
        rows: u16,
    ) -> Result<(PtySession, PtyEvents), RuntimeError> {
        let connection = self.pool.acquire(&self.config, AcquireOptions::default()).await?;
        let resolved = self.core.resolve_path(workspace_path).await?;
        mux_ssh::pty::create_pty_session(
            &connection,
            &PtySessionConfig { workspace_path: resolved, cols, rows },
        )
    }
}

#[async_trait]
impl Runtime for SshRuntime {
    fn kind(&self) -> RuntimeKind {
        self.core.kind()
    }

    async fn ensure_ready(&self) -> Result<(), RuntimeError> {
        if let Some(suffix) = &self.coder_suffix {
            let binary = std::env::current_exe()
                .map_err(|e| RuntimeError::Exec(format!("cannot locate mux binary: {}", e)))?;
            let config_path = dirs::home_dir()
                .ok_or_else(|| RuntimeError::Exec("no home directory".to_string()))?
                .join(".ssh")
                .join("config");
            mux_ssh::coder::write_coder_block(
                &config_path,
                &binary.to_string_lossy(),
                suffix,
            )
            .await?;
        }
        self.core.ensure_ready().await
    }

    async fn exec(&self, command: &str, options: ExecOptions) -> Result<ExecStream, RuntimeError> {
        self.core.exec(command, options).await
    }

    async fn read_file(
        &self,
        path: &str,
        cancel: Option<CancellationToken>,
    ) -> Result<FileReader, RuntimeError> {
        self.core.read_file(path, cancel).await
    }

    async fn write_file(
        &self,
        path: &str,
        cancel: Option<CancellationToken>,
    ) -> Result<FileWriter, RuntimeError> {
        self.core.write_file(path, cancel).await
    }

    async fn ensure_dir(&self, path: &str) -> Result<(), RuntimeError> {
        self.core.ensure_dir(path).await
    }

    async fn stat(&self, path: &str) -> Result<FileStat, RuntimeError> {
        self.core.stat(path).await
    }

    async fn resolve_path(&self, path: &str) -> Result<String, RuntimeError> {
        self.core.resolve_path(path).await
    }

    fn temp_dir(&self) -> String {
        self.core.temp_dir()
    }

    fn workspace_path(&self, project_path: &str, workspace_name: &str) -> String {
        self.core.workspace_path(project_path, workspace_name)
    }

    async fn create_workspace(
        &self,
        project_path: &str,
        workspace_name: &str,
        trunk_branch: &str,
        logger: &dyn InitLogger,
    ) -> CreateResult {
        self.core.create_workspace(project_path, workspace_name, trunk_branch, logger).await
    }

    async fn init_workspace(
        &self,
        project_path: &str,
        workspace_name: &str,
        logger: &dyn InitLogger,
    ) -> InitResult {
        self.core.init_workspace(project_path, workspace_name, logger).await
    }

    async fn rename_workspace(
        &self,
        project_path: &str,
        old_name: &str,
        new_name: &str,
        logger: &dyn InitLogger,
    ) -> RenameResult {
        self.core.rename_workspace(project_path, old_name, new_name, logger).await
    }

    async fn delete_workspace(
        &self,
        project_path: &str,
        workspace_name: &str,
        force: bool,
        logger: &dyn InitLogger,
    ) -> DeleteResult {
        self.core.delete_workspace(project_path, workspace_name, force, logger).await
    }

    async fn fork_workspace(
        &self,
        project_path: &str,
        source_name: &str,
        new_name: &str,
        logger: &dyn InitLogger,
    ) -> ForkResult {
        self.core.fork_workspace(project_path, source_name, new_name, logger).await
    }
}

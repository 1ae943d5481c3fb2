// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared capability implementation for transport-backed runtimes.
//!
//! SSH and Docker differ only in how a process is spawned; everything above
//! that — file I/O over exec, path resolution against the remote home,
//! directory-based workspace lifecycle — is identical and lives here.

use crate::engine::RemoteEngine;
use crate::exec::{ExecExit, ExecOptions, ExecStream};
use crate::fileio::{
    remote_ensure_dir, remote_read_file, remote_stat, remote_write_file, FileReader, FileStat,
    FileWriter,
};
use crate::lifecycle::{
    CreateResult, DeleteResult, ForkResult, InitLogger, InitResult, RenameResult, INIT_HOOK_PATH,
};
use mux_core::path::quote;
use mux_core::{normalize_path, RuntimeError, RuntimeKind};
use parking_lot::RwLock;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

const LIFECYCLE_TIMEOUT_SECS: f64 = 120.0;

/// Last path component of a POSIX path string.
fn project_name(project_path: &str) -> &str {
    project_path
        .trim_end_matches('/')
        .rsplit('/')
        .find(|part| !part.is_empty())
        .unwrap_or("project")
}

/// Transport-backed runtime core.
pub struct RemoteRuntimeCore {
    kind: RuntimeKind,
    engine: RemoteEngine,
    remote_src_dir: String,
    home: RwLock<Option<String>>,
}

impl RemoteRuntimeCore {
    pub fn new(kind: RuntimeKind, engine: RemoteEngine, remote_src_dir: String) -> Self {
        Self { kind, engine, remote_src_dir, home: RwLock::new(None) }
    }

    pub fn kind(&self) -> RuntimeKind {
        self.kind
    }

    pub fn engine(&self) -> &RemoteEngine {
        &self.engine
    }

    /// Fetch and cache the remote home directory.
    pub async fn ensure_ready(&self) -> Result<(), RuntimeError> {
        if self.home.read().is_some() {
            return Ok(());
        }
        let captured = self
            .engine
            .run_capture("echo \"$HOME\"", ExecOptions::new("/").timeout_secs(30.0))
            .await?;
        match captured.exit {
            ExecExit::Code(0) => {
                let home = captured.stdout_utf8().trim().to_string();
                if home.is_empty() {
                    return Err(RuntimeError::Exec("remote $HOME is empty".to_string()));
                }
                *self.home.write() = Some(home);
                Ok(())
            }
            ExecExit::Code(code) => Err(RuntimeError::Exec(format!(
                "failed to probe remote home (exit code {}): {}",
                code, captured.stderr
            ))),
            ExecExit::Timeout => Err(RuntimeError::Timeout),
            ExecExit::Aborted => Err(RuntimeError::Aborted),
        }
    }

    async fn home(&self) -> Result<String, RuntimeError> {
        if let Some(home) = self.home.read().clone() {
            return Ok(home);
        }
        self.ensure_ready().await?;
        self.home
            .read()
            .clone()
            .ok_or_else(|| RuntimeError::Exec("remote home unavailable".to_string()))
    }

    pub async fn exec(
        &self,
        command: &str,
        options: ExecOptions,
    ) -> Result<ExecStream, RuntimeError> {
        self.engine.exec(command, options).await
    }

    pub async fn read_file(
        &self,
        path: &str,
        cancel: Option<CancellationToken>,
    ) -> Result<FileReader, RuntimeError> {
        remote_read_file(&self.engine, path, cancel).await
    }

    pub async fn write_file(
        &self,
        path: &str,
        cancel: Option<CancellationToken>,
    ) -> Result<FileWriter, RuntimeError> {
        remote_write_file(&self.engine, path, cancel).await
    }

    pub async fn ensure_dir(&self, path: &str) -> Result<(), RuntimeError> {
        remote_ensure_dir(&self.engine, path).await
    }

    pub async fn stat(&self, path: &str) -> Result<FileStat, RuntimeError> {
        remote_stat(&self.engine, path).await
    }

    /// Expand `~` against the remote home and resolve relative paths against
    /// the remote source dir. Never checks existence.
    pub async fn resolve_path(&self, path: &str) -> Result<String, RuntimeError> {
        let path = path.trim();
        if path == "~" || path.starts_with("~/") {
            let home = self.home().await?;
            return Ok(mux_core::path::expand_tilde(path, &home).into_owned());
        }
        if path.starts_with('/') {
            return Ok(normalize_path(path, "/"));
        }
        let base = self.resolved_src_dir().await?;
        Ok(normalize_path(path, &base))
    }

    async fn resolved_src_dir(&self) -> Result<String, RuntimeError> {
        let dir = self.remote_src_dir.clone();
        if dir == "~" || dir.starts_with("~/") {
            let home = self.home().await?;
            Ok(mux_core::path::expand_tilde(&dir, &home).into_owned())
        } else {
            Ok(dir)
        }
    }

    pub fn temp_dir(&self) -> String {
        "/tmp".to_string()
    }

    /// `<remote_src_dir>/<project_name>/<workspace_name>`, the remote
    /// analogue of the worktree layout.
    pub fn workspace_path(&self, project_path: &str, workspace_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.remote_src_dir.trim_end_matches('/'),
            project_name(project_path),
            workspace_name
        )
    }

    async fn run_lifecycle_command(&self, command: &str) -> Result<(), String> {
        let captured = self
            .engine
            .run_capture(command, ExecOptions::new("/").timeout_secs(LIFECYCLE_TIMEOUT_SECS))
            .await
            .map_err(|error| error.to_string())?;
        match captured.exit {
            ExecExit::Code(0) => Ok(()),
            ExecExit::Code(code) => {
                let stderr = captured.stderr.trim();
                if stderr.is_empty() {
                    Err(format!("exit code {}", code))
                } else {
                    Err(stderr.to_string())
                }
            }
            ExecExit::Timeout => Err("timed out".to_string()),
            ExecExit::Aborted => Err("aborted".to_string()),
        }
    }

    pub async fn create_workspace(
        &self,
        project_path: &str,
        workspace_name: &str,
        _trunk_branch: &str,
        logger: &dyn InitLogger,
    ) -> CreateResult {
        let workspace = self.workspace_path(project_path, workspace_name);
        logger.log_step(&format!("creating remote workspace at {}", workspace));

        // Fail when the path already exists, then materialize the directory.
        let command = format!(
            "{{ ! test -e {q} || exit 21; }} && mkdir -p {q}",
            q = quote(&workspace)
        );
        match self.run_lifecycle_command(&command).await {
            Ok(()) => {
                logger.log_complete(0);
                CreateResult::ok(workspace)
            }
            Err(error) if error == "exit code 21" => {
                logger.log_complete(1);
                CreateResult::err(format!("workspace path already exists: {}", workspace))
            }
            Err(error) => {
                logger.log_complete(1);
                CreateResult::err(error)
            }
        }
    }

    pub async fn init_workspace(
        &self,
        project_path: &str,
        workspace_name: &str,
        logger: &dyn InitLogger,
    ) -> InitResult {
        let hook = format!("{}/{}", project_path.trim_end_matches('/'), INIT_HOOK_PATH);
        let present = self
            .engine
            .run_capture(
                &format!("test -x {}", quote(&hook)),
                ExecOptions::new("/").timeout_secs(30.0),
            )
            .await;
        match present {
            Ok(captured) if captured.exit.success() => {}
            Ok(_) => {
                logger.log_complete(0);
                return InitResult::ok();
            }
            Err(error) => {
                logger.log_complete(-1);
                return InitResult::err(error.to_string());
            }
        }

        logger.log_step(&format!("running {}", INIT_HOOK_PATH));
        let workspace = self.workspace_path(project_path, workspace_name);
        let options = ExecOptions::new(workspace)
            .env("MUX_PROJECT_PATH", project_path)
            .env("MUX_WORKSPACE_NAME", workspace_name)
            .env("MUX_RUNTIME", self.kind.as_str());

        let stream = match self.engine.exec(&quote(&hook), options).await {
            Ok(stream) => stream,
            Err(error) => {
                logger.log_complete(-1);
                return InitResult::err(error.to_string());
            }
        };
        stream.stdin.close().await;

        let mut stdout_lines = BufReader::new(stream.stdout).lines();
        let mut stderr_lines = BufReader::new(stream.stderr).lines();
        let relay_stdout = async {
            while let Ok(Some(line)) = stdout_lines.next_line().await {
                logger.log_step(&line);
            }
        };
        let relay_stderr = async {
            while let Ok(Some(line)) = stderr_lines.next_line().await {
                logger.log_stderr(&line);
            }
        };
        tokio::join!(relay_stdout, relay_stderr);

        let exit_code = match stream.outcome.exit().await {
            Ok(exit) => exit.as_code(),
            Err(_) => -1,
        };
        logger.log_complete(exit_code);

        if exit_code == 0 {
            InitResult::ok()
        } else {
            InitResult::err(format!("init hook exited with code {}", exit_code))
        }
    }

    pub async fn rename_workspace(
        &self,
        project_path: &str,
        old_name: &str,
        new_name: &str,
        logger: &dyn InitLogger,
    ) -> RenameResult {
        let old_path = self.workspace_path(project_path, old_name);
        let new_path = self.workspace_path(project_path, new_name);
        let command = format!("mv {} {}", quote(&old_path), quote(&new_path));
        match self.run_lifecycle_command(&command).await {
            Ok(()) => {
                logger.log_complete(0);
                RenameResult::ok(old_path, new_path)
            }
            Err(error) => {
                logger.log_complete(1);
                RenameResult::err(error)
            }
        }
    }

    /// `rm -rf` is already idempotent: a missing path succeeds.
    pub async fn delete_workspace(
        &self,
        project_path: &str,
        workspace_name: &str,
        _force: bool,
        logger: &dyn InitLogger,
    ) -> DeleteResult {
        let workspace = self.workspace_path(project_path, workspace_name);
        let command = format!("rm -rf {}", quote(&workspace));
        match self.run_lifecycle_command(&command).await {
            Ok(()) => {
                logger.log_complete(0);
                DeleteResult::ok(workspace)
            }
            Err(error) => {
                logger.log_complete(1);
                DeleteResult::err(error)
            }
        }
    }

    pub async fn fork_workspace(
        &self,
        project_path: &str,
        source_name: &str,
        new_name: &str,
        logger: &dyn InitLogger,
    ) -> ForkResult {
        let source = self.workspace_path(project_path, source_name);

        let branch_probe = self
            .engine
            .run_capture(
                &format!("git -C {} branch --show-current", quote(&source)),
                ExecOptions::new("/").timeout_secs(30.0),
            )
            .await;
        let source_branch = match branch_probe {
            Ok(captured) if captured.exit.success() => captured.stdout_utf8().trim().to_string(),
            Ok(captured) => {
                logger.log_complete(1);
                return ForkResult::err(format!(
                    "failed to resolve source branch: {}",
                    captured.stderr.trim()
                ));
            }
            Err(error) => {
                logger.log_complete(1);
                return ForkResult::err(error.to_string());
            }
        };
        if source_branch.is_empty() {
            logger.log_complete(1);
            return ForkResult::err(format!(
                "source workspace {} has no current branch",
                source_name
            ));
        }

        let target = self.workspace_path(project_path, new_name);
        logger.log_step(&format!("forking {} into {}", source, target));
        let command = format!(
            "{{ ! test -e {qt} || exit 21; }} && mkdir -p {qt} && cp -a {qs}/. {qt}/",
            qs = quote(&source),
            qt = quote(&target)
        );
        match self.run_lifecycle_command(&command).await {
            Ok(()) => {
                logger.log_complete(0);
                ForkResult::ok(target, source_branch)
            }
            Err(error) if error == "exit code 21" => {
                logger.log_complete(1);
                ForkResult::err(format!("workspace path already exists: {}", target))
            }
            Err(error) => {
                logger.log_complete(1);
                ForkResult::err(error)
            }
        }
    }
}

#[cfg(test)]
#[path = "remote_tests.rs"]
mod tests;

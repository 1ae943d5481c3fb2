// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local backend: direct OS calls for files, the shared engine for exec.
//!
//! The workspace is the project directory itself; lifecycle operations that
//! only make sense for materialized workspaces (rename, fork) report errors.

use crate::engine::{RemoteEngine, RemoteSpawner, SpawnedProcess};
use crate::exec::{ExecOptions, ExecStream};
use crate::fileio::{FileReader, FileStat, FileWriter, LocalFileWriter};
use crate::lifecycle::{
    run_local_init_hook, CreateResult, DeleteResult, ForkResult, InitLogger, InitResult,
    RenameResult,
};
use crate::runtime::Runtime;
use async_trait::async_trait;
use mux_core::{RuntimeError, RuntimeKind};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Spawns composed commands under a local shell.
pub(crate) struct LocalSpawner;

#[async_trait]
impl RemoteSpawner for LocalSpawner {
    async fn spawn_remote_process(
        &self,
        command: &str,
        _options: &ExecOptions,
    ) -> Result<Box<dyn SpawnedProcess>, RuntimeError> {
        let mut cmd = tokio::process::Command::new("bash");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let child =
            cmd.spawn().map_err(|e| RuntimeError::Exec(format!("failed to spawn shell: {}", e)))?;
        Ok(Box::new(child))
    }
}

/// Runtime backed by the local host.
pub struct LocalRuntime {
    project_path: PathBuf,
    engine: RemoteEngine,
}

impl LocalRuntime {
    pub fn new(project_path: PathBuf) -> Self {
        Self { project_path, engine: RemoteEngine::new(Arc::new(LocalSpawner)) }
    }

    pub(crate) fn resolve_local(&self, path: &str, base: &Path) -> String {
        let expanded = shellexpand::tilde(path).into_owned();
        if expanded.starts_with('/') {
            expanded
        } else {
            base.join(expanded).to_string_lossy().into_owned()
        }
    }
}

#[async_trait]
impl Runtime for LocalRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Local
    }

    async fn ensure_ready(&self) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn exec(&self, command: &str, options: ExecOptions) -> Result<ExecStream, RuntimeError> {
        self.engine.exec(command, options).await
    }

    async fn read_file(
        &self,
        path: &str,
        cancel: Option<CancellationToken>,
    ) -> Result<FileReader, RuntimeError> {
        if cancel.as_ref().is_some_and(|token| token.is_cancelled()) {
            return Err(RuntimeError::Aborted);
        }
        let resolved = self.resolve_local(path, &self.project_path);
        let file = tokio::fs::File::open(&resolved)
            .await
            .map_err(|e| RuntimeError::FileIo(format!("{}: {}", resolved, e)))?;
        Ok(Box::new(file))
    }

    async fn write_file(
        &self,
        path: &str,
        cancel: Option<CancellationToken>,
    ) -> Result<FileWriter, RuntimeError> {
        if cancel.as_ref().is_some_and(|token| token.is_cancelled()) {
            return Err(RuntimeError::Aborted);
        }
        let resolved = self.resolve_local(path, &self.project_path);
        Ok(Box::new(LocalFileWriter::create(PathBuf::from(resolved)).await?))
    }

    async fn ensure_dir(&self, path: &str) -> Result<(), RuntimeError> {
        let resolved = self.resolve_local(path, &self.project_path);
        tokio::fs::create_dir_all(&resolved)
            .await
            .map_err(|e| RuntimeError::FileIo(format!("{}: {}", resolved, e)))
    }

    async fn stat(&self, path: &str) -> Result<FileStat, RuntimeError> {
        let resolved = self.resolve_local(path, &self.project_path);
        let metadata = tokio::fs::metadata(&resolved)
            .await
            .map_err(|e| RuntimeError::FileIo(format!("{}: {}", resolved, e)))?;
        let modified_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Ok(FileStat { size: metadata.len(), modified_ms, is_directory: metadata.is_dir() })
    }

    async fn resolve_path(&self, path: &str) -> Result<String, RuntimeError> {
        Ok(self.resolve_local(path, &self.project_path))
    }

    fn temp_dir(&self) -> String {
        std::env::temp_dir().to_string_lossy().into_owned()
    }

    fn workspace_path(&self, project_path: &str, _workspace_name: &str) -> String {
        // No separation between project and workspace on the local backend.
        project_path.to_string()
    }

    async fn create_workspace(
        &self,
        project_path: &str,
        _workspace_name: &str,
        _trunk_branch: &str,
        logger: &dyn InitLogger,
    ) -> CreateResult {
        // The project directory is the workspace; nothing to materialize.
        logger.log_complete(0);
        CreateResult::ok(project_path)
    }

    async fn init_workspace(
        &self,
        project_path: &str,
        workspace_name: &str,
        logger: &dyn InitLogger,
    ) -> InitResult {
        let project = PathBuf::from(project_path);
        run_local_init_hook(&project, &project, workspace_name, RuntimeKind::Local, logger).await
    }

    async fn rename_workspace(
        &self,
        _project_path: &str,
        _old_name: &str,
        _new_name: &str,
        logger: &dyn InitLogger,
    ) -> RenameResult {
        logger.log_complete(1);
        RenameResult::err("local workspaces cannot be renamed")
    }

    async fn delete_workspace(
        &self,
        project_path: &str,
        _workspace_name: &str,
        _force: bool,
        logger: &dyn InitLogger,
    ) -> DeleteResult {
        // The project directory is never deleted out from under the user.
        logger.log_complete(0);
        DeleteResult::ok(project_path)
    }

    async fn fork_workspace(
        &self,
        _project_path: &str,
        _source_name: &str,
        _new_name: &str,
        logger: &dyn InitLogger,
    ) -> ForkResult {
        logger.log_complete(1);
        ForkResult::err("fork requires a worktree or remote runtime")
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;

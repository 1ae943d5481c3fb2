// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The polymorphic runtime handle.
//!
//! One trait, six backends. Every operation behaves identically from the
//! caller's view; only performance and failure modes differ. Paths are
//! POSIX strings so remote backends never round-trip through `PathBuf`.

use crate::exec::{ExecOptions, ExecStream};
use crate::fileio::{FileReader, FileStat, FileWriter};
use crate::lifecycle::{
    CreateResult, DeleteResult, ForkResult, InitLogger, InitResult, RenameResult,
};
use async_trait::async_trait;
use mux_core::{RuntimeError, RuntimeKind};
use tokio_util::sync::CancellationToken;

/// One backend for one workspace.
#[async_trait]
pub trait Runtime: Send + Sync {
    fn kind(&self) -> RuntimeKind;

    /// Verify the backend is reachable and capture per-connection facts
    /// (e.g. the remote home directory). Idempotent.
    async fn ensure_ready(&self) -> Result<(), RuntimeError>;

    /// Launch a shell fragment under the backend.
    async fn exec(&self, command: &str, options: ExecOptions) -> Result<ExecStream, RuntimeError>;

    async fn read_file(
        &self,
        path: &str,
        cancel: Option<CancellationToken>,
    ) -> Result<FileReader, RuntimeError>;

    async fn write_file(
        &self,
        path: &str,
        cancel: Option<CancellationToken>,
    ) -> Result<FileWriter, RuntimeError>;

    async fn ensure_dir(&self, path: &str) -> Result<(), RuntimeError>;

    async fn stat(&self, path: &str) -> Result<FileStat, RuntimeError>;

    /// Pure POSIX normalization; identical across backends.
    fn normalize_path(&self, target: &str, base: &str) -> String {
        mux_core::normalize_path(target, base)
    }

    /// Expand `~` and resolve relative paths against the runtime's base.
    /// Resolves paths that do not exist.
    async fn resolve_path(&self, path: &str) -> Result<String, RuntimeError>;

    fn temp_dir(&self) -> String;

    /// Where a workspace with this name materializes for this backend.
    fn workspace_path(&self, project_path: &str, workspace_name: &str) -> String;

    async fn create_workspace(
        &self,
        project_path: &str,
        workspace_name: &str,
        trunk_branch: &str,
        logger: &dyn InitLogger,
    ) -> CreateResult;

    async fn init_workspace(
        &self,
        project_path: &str,
        workspace_name: &str,
        logger: &dyn InitLogger,
    ) -> InitResult;

    async fn rename_workspace(
        &self,
        project_path: &str,
        old_name: &str,
        new_name: &str,
        logger: &dyn InitLogger,
    ) -> RenameResult;

    /// Required to be idempotent: deleting an already-deleted workspace
    /// succeeds.
    async fn delete_workspace(
        &self,
        project_path: &str,
        workspace_name: &str,
        force: bool,
        logger: &dyn InitLogger,
    ) -> DeleteResult;

    async fn fork_workspace(
        &self,
        project_path: &str,
        source_name: &str,
        new_name: &str,
        logger: &dyn InitLogger,
    ) -> ForkResult;
}

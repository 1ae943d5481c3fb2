// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worktree backend: the local runtime plus git-worktree lifecycle.
//!
//! Workspaces materialize at `<src_base_dir>/<project_name>/<name>`, each on
//! its own branch named after the workspace. Delete is idempotent: stale
//! worktree records are pruned and a missing path is success.

use crate::exec::{ExecOptions, ExecStream};
use crate::fileio::{FileReader, FileStat, FileWriter};
use crate::lifecycle::{
    run_local_init_hook, CreateResult, DeleteResult, ForkResult, InitLogger, InitResult,
    RenameResult,
};
use crate::local::LocalRuntime;
use crate::runtime::Runtime;
use async_trait::async_trait;
use mux_core::{worktree_workspace_path, RuntimeError, RuntimeKind};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const GIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Runtime backed by the local host with git-worktree workspaces.
pub struct WorktreeRuntime {
    local: LocalRuntime,
    src_base_dir: PathBuf,
}

impl WorktreeRuntime {
    pub fn new(project_path: PathBuf, src_base_dir: PathBuf) -> Self {
        Self { local: LocalRuntime::new(project_path), src_base_dir }
    }

    fn path_for(&self, project_path: &str, workspace_name: &str) -> PathBuf {
        worktree_workspace_path(&self.src_base_dir, Path::new(project_path), workspace_name)
    }
}

async fn run_git(args: &[&str], cwd: &Path) -> Result<std::process::Output, String> {
    let mut command = tokio::process::Command::new("git");
    command
        .args(args)
        .current_dir(cwd)
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    match tokio::time::timeout(GIT_TIMEOUT, command.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(error)) => Err(format!("failed to run git: {}", error)),
        Err(_) => Err(format!("git {} timed out", args.first().unwrap_or(&""))),
    }
}

fn git_error(operation: &str, output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("{} failed with exit code {}", operation, output.status.code().unwrap_or(-1))
    } else {
        format!("{} failed: {}", operation, stderr)
    }
}

/// Stderr phrases git emits for a worktree that is already gone.
fn is_already_gone(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("not a working tree")
        || lower.contains("does not exist")
        || lower.contains("no such file")
}

#[async_trait]
impl Runtime for WorktreeRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Worktree
    }

    async fn ensure_ready(&self) -> Result<(), RuntimeError> {
        self.local.ensure_ready().await
    }

    async fn exec(&self, command: &str, options: ExecOptions) -> Result<ExecStream, RuntimeError> {
        self.local.exec(command, options).await
    }

    async fn read_file(
        &self,
        path: &str,
        cancel: Option<CancellationToken>,
    ) -> Result<FileReader, RuntimeError> {
        self.local.read_file(path, cancel).await
    }

    async fn write_file(
        &self,
        path: &str,
        cancel: Option<CancellationToken>,
    ) -> Result<FileWriter, RuntimeError> {
        self.local.write_file(path, cancel).await
    }

    async fn ensure_dir(&self, path: &str) -> Result<(), RuntimeError> {
        self.local.ensure_dir(path).await
    }

    async fn stat(&self, path: &str) -> Result<FileStat, RuntimeError> {
        self.local.stat(path).await
    }

    async fn resolve_path(&self, path: &str) -> Result<String, RuntimeError> {
        self.local.resolve_path(path).await
    }

    fn temp_dir(&self) -> String {
        self.local.temp_dir()
    }

    fn workspace_path(&self, project_path: &str, workspace_name: &str) -> String {
        self.path_for(project_path, workspace_name).to_string_lossy().into_owned()
    }

    async fn create_workspace(
        &self,
        project_path: &str,
        workspace_name: &str,
        trunk_branch: &str,
        logger: &dyn InitLogger,
    ) -> CreateResult {
        let project = PathBuf::from(project_path);
        let workspace = self.path_for(project_path, workspace_name);
        let workspace_str = workspace.to_string_lossy().into_owned();

        if workspace.exists() {
            logger.log_complete(1);
            return CreateResult::err(format!("workspace path already exists: {}", workspace_str));
        }

        if let Some(parent) = workspace.parent() {
            if let Err(error) = tokio::fs::create_dir_all(parent).await {
                logger.log_complete(1);
                return CreateResult::err(format!("failed to create workspace parent: {}", error));
            }
        }

        logger.log_step(&format!("creating worktree at {}", workspace_str));

        let branch_ref = format!("refs/heads/{}", workspace_name);
        let branch_exists = match run_git(
            &["rev-parse", "--verify", "--quiet", &branch_ref],
            &project,
        )
        .await
        {
            Ok(output) => output.status.success(),
            Err(error) => {
                logger.log_complete(1);
                return CreateResult::err(error);
            }
        };

        let add = if branch_exists {
            run_git(&["worktree", "add", &workspace_str, workspace_name], &project).await
        } else {
            run_git(
                &["worktree", "add", "-b", workspace_name, &workspace_str, trunk_branch],
                &project,
            )
            .await
        };
        match add {
            Ok(output) if output.status.success() => {}
            Ok(output) => {
                logger.log_complete(1);
                return CreateResult::err(git_error("git worktree add", &output));
            }
            Err(error) => {
                logger.log_complete(1);
                return CreateResult::err(error);
            }
        }

        // Best-effort: bring the new branch up to date with origin. A
        // divergent trunk is logged, never fatal.
        if let Ok(fetch) = run_git(&["fetch", "origin", trunk_branch], &project).await {
            if fetch.status.success() {
                let remote_trunk = format!("origin/{}", trunk_branch);
                match run_git(&["merge", "--ff-only", &remote_trunk], &workspace).await {
                    Ok(merge) if merge.status.success() => {}
                    Ok(_) | Err(_) => {
                        tracing::info!(
                            workspace = %workspace_str,
                            trunk = %trunk_branch,
                            "trunk diverged from origin; skipping fast-forward"
                        );
                        logger.log_step("trunk diverged from origin; skipping fast-forward");
                    }
                }
            }
        }

        logger.log_complete(0);
        CreateResult::ok(workspace_str)
    }

    async fn init_workspace(
        &self,
        project_path: &str,
        workspace_name: &str,
        logger: &dyn InitLogger,
    ) -> InitResult {
        let workspace = self.path_for(project_path, workspace_name);
        run_local_init_hook(
            Path::new(project_path),
            &workspace,
            workspace_name,
            RuntimeKind::Worktree,
            logger,
        )
        .await
    }

    async fn rename_workspace(
        &self,
        project_path: &str,
        old_name: &str,
        new_name: &str,
        logger: &dyn InitLogger,
    ) -> RenameResult {
        let project = PathBuf::from(project_path);
        let old_path = self.path_for(project_path, old_name).to_string_lossy().into_owned();
        let new_path = self.path_for(project_path, new_name).to_string_lossy().into_owned();

        match run_git(&["worktree", "move", &old_path, &new_path], &project).await {
            Ok(output) if output.status.success() => {}
            Ok(output) => {
                logger.log_complete(1);
                return RenameResult::err(git_error("git worktree move", &output));
            }
            Err(error) => {
                logger.log_complete(1);
                return RenameResult::err(error);
            }
        }

        // Best-effort branch rename; a branch that does not match the
        // workspace name is tolerated.
        match run_git(&["branch", "-m", old_name, new_name], &project).await {
            Ok(output) if output.status.success() => {}
            Ok(output) => {
                logger.log_step(&format!(
                    "kept branch name: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ));
            }
            Err(error) => logger.log_step(&format!("kept branch name: {}", error)),
        }

        logger.log_complete(0);
        RenameResult::ok(old_path, new_path)
    }

    async fn delete_workspace(
        &self,
        project_path: &str,
        workspace_name: &str,
        force: bool,
        logger: &dyn InitLogger,
    ) -> DeleteResult {
        let project = PathBuf::from(project_path);
        let workspace = self.path_for(project_path, workspace_name);
        let workspace_str = workspace.to_string_lossy().into_owned();

        if !workspace.exists() {
            // Already gone; drop any stale worktree record and succeed.
            let _ = run_git(&["worktree", "prune"], &project).await;
            logger.log_complete(0);
            return DeleteResult::ok(workspace_str);
        }

        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(&workspace_str);

        let removed = run_git(&args, &project).await;
        let failure = match removed {
            Ok(output) if output.status.success() => {
                logger.log_complete(0);
                return DeleteResult::ok(workspace_str);
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                if is_already_gone(&stderr) {
                    let _ = run_git(&["worktree", "prune"], &project).await;
                    logger.log_complete(0);
                    return DeleteResult::ok(workspace_str);
                }
                git_error("git worktree remove", &output)
            }
            Err(error) => error,
        };

        if force {
            let _ = run_git(&["worktree", "prune"], &project).await;
            if let Err(error) = tokio::fs::remove_dir_all(&workspace).await {
                if workspace.exists() {
                    logger.log_complete(1);
                    return DeleteResult::err(format!(
                        "failed to remove workspace directory: {}",
                        error
                    ));
                }
            }
            logger.log_complete(0);
            return DeleteResult::ok(workspace_str);
        }

        logger.log_complete(1);
        DeleteResult::err(failure)
    }

    async fn fork_workspace(
        &self,
        project_path: &str,
        source_name: &str,
        new_name: &str,
        logger: &dyn InitLogger,
    ) -> ForkResult {
        let source = self.path_for(project_path, source_name);

        let source_branch = match run_git(&["branch", "--show-current"], &source).await {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            }
            Ok(output) => {
                logger.log_complete(1);
                return ForkResult::err(git_error("git branch --show-current", &output));
            }
            Err(error) => {
                logger.log_complete(1);
                return ForkResult::err(error);
            }
        };
        if source_branch.is_empty() {
            logger.log_complete(1);
            return ForkResult::err(format!(
                "source workspace {} has no current branch",
                source_name
            ));
        }

        // Create the fork with the source branch as its trunk; create emits
        // the terminal complete event.
        let created =
            self.create_workspace(project_path, new_name, &source_branch, logger).await;
        if created.success {
            ForkResult::ok(created.workspace_path.unwrap_or_default(), source_branch)
        } else {
            ForkResult::err(created.error.unwrap_or_else(|| "create failed".to_string()))
        }
    }
}

#[cfg(test)]
#[path = "worktree_tests.rs"]
mod tests;

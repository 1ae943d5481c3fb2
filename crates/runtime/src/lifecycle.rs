// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace lifecycle protocol: result structures, the `InitLogger`
//! collaborator, and the `.mux/init` hook runner.
//!
//! Every lifecycle operation emits `log_complete` exactly once on its
//! terminal path, success or failure.

use mux_core::RuntimeKind;
use serde::Serialize;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Relative path of the project-supplied init hook.
pub const INIT_HOOK_PATH: &str = ".mux/init";

/// Sink for lifecycle progress events, injected by the caller.
pub trait InitLogger: Send + Sync {
    fn log_step(&self, message: &str);
    fn log_stderr(&self, message: &str);
    fn log_complete(&self, exit_code: i32);
}

/// Logger that discards everything (callers that only want the result).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullInitLogger;

impl InitLogger for NullInitLogger {
    fn log_step(&self, _message: &str) {}
    fn log_stderr(&self, _message: &str) {}
    fn log_complete(&self, _exit_code: i32) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CreateResult {
    pub fn ok(workspace_path: impl Into<String>) -> Self {
        Self { success: true, workspace_path: Some(workspace_path.into()), error: None }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self { success: false, workspace_path: None, error: Some(error.into()) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InitResult {
    pub fn ok() -> Self {
        Self { success: true, error: None }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RenameResult {
    pub fn ok(old_path: impl Into<String>, new_path: impl Into<String>) -> Self {
        Self {
            success: true,
            old_path: Some(old_path.into()),
            new_path: Some(new_path.into()),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self { success: false, old_path: None, new_path: None, error: Some(error.into()) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeleteResult {
    pub fn ok(deleted_path: impl Into<String>) -> Self {
        Self { success: true, deleted_path: Some(deleted_path.into()), error: None }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self { success: false, deleted_path: None, error: Some(error.into()) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForkResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ForkResult {
    pub fn ok(workspace_path: impl Into<String>, source_branch: impl Into<String>) -> Self {
        Self {
            success: true,
            workspace_path: Some(workspace_path.into()),
            source_branch: Some(source_branch.into()),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self { success: false, workspace_path: None, source_branch: None, error: Some(error.into()) }
    }
}

/// Run the project's `.mux/init` hook in a freshly created local workspace.
///
/// No hook means immediate completion with exit 0. The hook's stdout and
/// stderr are relayed line-by-line to the logger; `log_complete` fires
/// exactly once with the hook's exit code (or -1 for spawn/signal failures).
pub(crate) async fn run_local_init_hook(
    project_path: &Path,
    workspace_path: &Path,
    workspace_name: &str,
    kind: RuntimeKind,
    logger: &dyn InitLogger,
) -> InitResult {
    let hook = project_path.join(INIT_HOOK_PATH);
    if !hook.is_file() {
        logger.log_complete(0);
        return InitResult::ok();
    }

    logger.log_step(&format!("running {}", INIT_HOOK_PATH));

    let mut command = tokio::process::Command::new(&hook);
    command
        .current_dir(workspace_path)
        .env("MUX_PROJECT_PATH", project_path)
        .env("MUX_WORKSPACE_NAME", workspace_name)
        .env("MUX_RUNTIME", kind.as_str())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(error) => {
            let message = format!("failed to run init hook: {}", error);
            logger.log_complete(-1);
            return InitResult::err(message);
        }
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let relay_stdout = async {
        if let Some(stdout) = stdout {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                logger.log_step(&line);
            }
        }
    };
    let relay_stderr = async {
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                logger.log_stderr(&line);
            }
        }
    };
    tokio::join!(relay_stdout, relay_stderr);

    let exit_code = match child.wait().await {
        Ok(status) => status.code().unwrap_or(-1),
        Err(_) => -1,
    };
    logger.log_complete(exit_code);

    if exit_code == 0 {
        InitResult::ok()
    } else {
        InitResult::err(format!("init hook exited with code {}", exit_code))
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;

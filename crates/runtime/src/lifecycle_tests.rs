// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex;
use std::os::unix::fs::PermissionsExt;

#[derive(Default)]
struct CollectingLogger {
    steps: Mutex<Vec<String>>,
    stderr: Mutex<Vec<String>>,
    completes: Mutex<Vec<i32>>,
}

impl InitLogger for CollectingLogger {
    fn log_step(&self, message: &str) {
        self.steps.lock().push(message.to_string());
    }

    fn log_stderr(&self, message: &str) {
        self.stderr.lock().push(message.to_string());
    }

    fn log_complete(&self, exit_code: i32) {
        self.completes.lock().push(exit_code);
    }
}

async fn write_hook(project: &Path, script: &str) {
    let hook_dir = project.join(".mux");
    tokio::fs::create_dir_all(&hook_dir).await.unwrap();
    let hook = hook_dir.join("init");
    tokio::fs::write(&hook, script).await.unwrap();
    tokio::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).await.unwrap();
}

#[tokio::test]
async fn missing_hook_completes_immediately() {
    let project = tempfile::tempdir().unwrap();
    let logger = CollectingLogger::default();

    let result = run_local_init_hook(
        project.path(),
        project.path(),
        "ws",
        RuntimeKind::Worktree,
        &logger,
    )
    .await;

    assert!(result.success);
    assert_eq!(*logger.completes.lock(), vec![0]);
    assert!(logger.steps.lock().is_empty());
}

#[tokio::test]
async fn hook_output_is_relayed_line_by_line() {
    let project = tempfile::tempdir().unwrap();
    let workspace = tempfile::tempdir().unwrap();
    write_hook(
        project.path(),
        "#!/bin/bash\necho step one\necho step two\necho warning 1>&2\n",
    )
    .await;

    let logger = CollectingLogger::default();
    let result = run_local_init_hook(
        project.path(),
        workspace.path(),
        "ws-1",
        RuntimeKind::Worktree,
        &logger,
    )
    .await;

    assert!(result.success);
    let steps = logger.steps.lock();
    assert!(steps.contains(&"step one".to_string()));
    assert!(steps.contains(&"step two".to_string()));
    assert_eq!(*logger.stderr.lock(), vec!["warning".to_string()]);
    assert_eq!(*logger.completes.lock(), vec![0]);
}

#[tokio::test]
async fn hook_sees_mux_environment_and_workspace_cwd() {
    let project = tempfile::tempdir().unwrap();
    let workspace = tempfile::tempdir().unwrap();
    write_hook(
        project.path(),
        "#!/bin/bash\necho \"project=$MUX_PROJECT_PATH\"\necho \"name=$MUX_WORKSPACE_NAME\"\necho \"runtime=$MUX_RUNTIME\"\necho \"cwd=$PWD\"\n",
    )
    .await;

    let logger = CollectingLogger::default();
    let result = run_local_init_hook(
        project.path(),
        workspace.path(),
        "feat-x",
        RuntimeKind::Worktree,
        &logger,
    )
    .await;

    assert!(result.success);
    let steps = logger.steps.lock().join("\n");
    assert!(steps.contains(&format!("project={}", project.path().display())));
    assert!(steps.contains("name=feat-x"));
    assert!(steps.contains("runtime=worktree"));
    let workspace_real = workspace.path().canonicalize().unwrap();
    assert!(steps.contains(&format!("cwd={}", workspace_real.display())));
}

#[tokio::test]
async fn failing_hook_reports_exit_code_and_error() {
    let project = tempfile::tempdir().unwrap();
    let workspace = tempfile::tempdir().unwrap();
    write_hook(project.path(), "#!/bin/bash\necho broken 1>&2\nexit 3\n").await;

    let logger = CollectingLogger::default();
    let result = run_local_init_hook(
        project.path(),
        workspace.path(),
        "ws",
        RuntimeKind::Worktree,
        &logger,
    )
    .await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("exit"));
    assert_eq!(*logger.completes.lock(), vec![3]);
    assert_eq!(*logger.stderr.lock(), vec!["broken".to_string()]);
}

#[test]
fn result_constructors_carry_payloads() {
    let created = CreateResult::ok("/w/a");
    assert!(created.success);
    assert_eq!(created.workspace_path.as_deref(), Some("/w/a"));

    let failed = CreateResult::err("boom");
    assert!(!failed.success);
    assert_eq!(failed.error.as_deref(), Some("boom"));

    let renamed = RenameResult::ok("/old", "/new");
    assert_eq!(renamed.old_path.as_deref(), Some("/old"));
    assert_eq!(renamed.new_path.as_deref(), Some("/new"));

    let forked = ForkResult::ok("/w/b", "main");
    assert_eq!(forked.source_branch.as_deref(), Some("main"));

    let deleted = DeleteResult::ok("/w/a");
    assert_eq!(deleted.deleted_path.as_deref(), Some("/w/a"));
}

#[test]
fn results_serialize_without_null_noise() {
    let json = serde_json::to_value(CreateResult::ok("/w")).unwrap();
    assert_eq!(json["success"], true);
    assert!(json.get("error").is_none());

    let json = serde_json::to_value(InitResult::err("nope")).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "nope");
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worktree lifecycle: create, rename, delete idempotence, fork.

use mux_runtime::worktree::WorktreeRuntime;
use mux_runtime::{NullInitLogger, Runtime};
use std::path::{Path, PathBuf};

async fn git(args: &[&str], cwd: &Path) {
    let output = tokio::process::Command::new("git")
        .args(args)
        .current_dir(cwd)
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .output()
        .await
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

struct Fixture {
    _root: tempfile::TempDir,
    runtime: WorktreeRuntime,
    project: String,
}

async fn fixture() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let project = root.path().join("R");
    tokio::fs::create_dir_all(&project).await.unwrap();

    git(&["init", "-b", "main"], &project).await;
    git(&["config", "user.email", "dev@example.com"], &project).await;
    git(&["config", "user.name", "Dev"], &project).await;
    tokio::fs::write(project.join("README.md"), "seed\n").await.unwrap();
    git(&["add", "."], &project).await;
    git(&["commit", "-m", "initial"], &project).await;

    let runtime = WorktreeRuntime::new(project.clone(), root.path().join("src"));
    Fixture { _root: root, runtime, project: project.to_string_lossy().into_owned() }
}

#[tokio::test]
async fn create_rename_delete_is_idempotent() {
    let fx = fixture().await;
    let logger = NullInitLogger;

    // Create lands at <src>/R/feat-a with the seed content.
    let created = fx.runtime.create_workspace(&fx.project, "feat-a", "main", &logger).await;
    assert!(created.success, "create failed: {:?}", created.error);
    let created_path = PathBuf::from(created.workspace_path.unwrap());
    assert!(created_path.ends_with("R/feat-a"));
    assert!(created_path.join("README.md").exists());

    // Rename moves the directory.
    let renamed = fx.runtime.rename_workspace(&fx.project, "feat-a", "feat-b", &logger).await;
    assert!(renamed.success, "rename failed: {:?}", renamed.error);
    assert!(!created_path.exists());
    let renamed_path = PathBuf::from(renamed.new_path.unwrap());
    assert!(renamed_path.ends_with("R/feat-b"));
    assert!(renamed_path.join("README.md").exists());

    // Delete succeeds, and deleting again also succeeds.
    let deleted = fx.runtime.delete_workspace(&fx.project, "feat-b", false, &logger).await;
    assert!(deleted.success, "delete failed: {:?}", deleted.error);
    assert!(!renamed_path.exists());

    let again = fx.runtime.delete_workspace(&fx.project, "feat-b", false, &logger).await;
    assert!(again.success, "second delete must be idempotent: {:?}", again.error);
}

#[tokio::test]
async fn fork_uses_the_source_branch_as_trunk() {
    let fx = fixture().await;
    let logger = NullInitLogger;

    assert!(fx.runtime.create_workspace(&fx.project, "feat-a", "main", &logger).await.success);

    let forked = fx.runtime.fork_workspace(&fx.project, "feat-a", "feat-a-fork", &logger).await;
    assert!(forked.success, "fork failed: {:?}", forked.error);
    assert_eq!(forked.source_branch.as_deref(), Some("feat-a"));
    assert!(PathBuf::from(forked.workspace_path.unwrap()).join("README.md").exists());
}

#[tokio::test]
async fn exec_and_files_work_inside_a_workspace() {
    use mux_runtime::ExecOptions;
    use tokio::io::AsyncReadExt;

    let fx = fixture().await;
    let logger = NullInitLogger;
    let created = fx.runtime.create_workspace(&fx.project, "feat-io", "main", &logger).await;
    let workspace = created.workspace_path.unwrap();

    // Write through the runtime, read back through exec.
    let mut writer = fx
        .runtime
        .write_file(&format!("{}/notes.txt", workspace), None)
        .await
        .unwrap();
    writer.write(b"from the runtime\n").await.unwrap();
    writer.close().await.unwrap();

    let mut stream = fx
        .runtime
        .exec("cat notes.txt", ExecOptions::new(&workspace).timeout_secs(10.0))
        .await
        .unwrap();
    stream.stdin.close().await;
    let mut stdout = String::new();
    stream.stdout.read_to_string(&mut stdout).await.unwrap();
    assert_eq!(stdout, "from the runtime\n");
    assert!(stream.outcome.exit().await.unwrap().success());
}

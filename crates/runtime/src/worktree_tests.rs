// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex;

struct RecordingLogger {
    steps: Mutex<Vec<String>>,
    completes: Mutex<Vec<i32>>,
}

impl RecordingLogger {
    fn new() -> Self {
        Self { steps: Mutex::new(Vec::new()), completes: Mutex::new(Vec::new()) }
    }

    fn complete_codes(&self) -> Vec<i32> {
        self.completes.lock().clone()
    }
}

impl InitLogger for RecordingLogger {
    fn log_step(&self, message: &str) {
        self.steps.lock().push(message.to_string());
    }

    fn log_stderr(&self, _message: &str) {}

    fn log_complete(&self, exit_code: i32) {
        self.completes.lock().push(exit_code);
    }
}

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

/// A repo with one commit on `main`.
async fn seed_repo(dir: &Path) {
    git(&["init", "-b", "main"], dir).await;
    git(&["config", "user.email", "dev@example.com"], dir).await;
    git(&["config", "user.name", "Dev"], dir).await;
    tokio::fs::write(dir.join("README.md"), "hello\n").await.unwrap();
    git(&["add", "."], dir).await;
    git(&["commit", "-m", "initial"], dir).await;
}

struct Fixture {
    _root: tempfile::TempDir,
    runtime: WorktreeRuntime,
    project: PathBuf,
}

async fn fixture() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let project = root.path().join("repo");
    let src_base = root.path().join("src");
    tokio::fs::create_dir_all(&project).await.unwrap();
    seed_repo(&project).await;
    let runtime = WorktreeRuntime::new(project.clone(), src_base);
    Fixture { _root: root, runtime, project }
}

#[tokio::test]
async fn create_materializes_worktree_on_new_branch() {
    let fx = fixture().await;
    let logger = RecordingLogger::new();
    let project = fx.project.to_string_lossy().into_owned();

    let created = fx.runtime.create_workspace(&project, "feat-a", "main", &logger).await;
    assert!(created.success, "create failed: {:?}", created.error);

    let path = PathBuf::from(created.workspace_path.unwrap());
    assert!(path.join("README.md").exists());
    assert!(path.ends_with("repo/feat-a"));
    assert_eq!(logger.complete_codes(), vec![0]);

    // Branch named after the workspace exists.
    let output = tokio::process::Command::new("git")
        .args(["branch", "--list", "feat-a"])
        .current_dir(&fx.project)
        .output()
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&output.stdout).contains("feat-a"));
}

#[tokio::test]
async fn create_fails_when_path_exists() {
    let fx = fixture().await;
    let logger = RecordingLogger::new();
    let project = fx.project.to_string_lossy().into_owned();

    assert!(fx.runtime.create_workspace(&project, "feat-a", "main", &logger).await.success);
    let second = fx.runtime.create_workspace(&project, "feat-a", "main", &logger).await;

    assert!(!second.success);
    assert!(second.error.unwrap().contains("already exists"));
    assert_eq!(logger.complete_codes(), vec![0, 1]);
}

#[tokio::test]
async fn create_reuses_an_existing_branch() {
    let fx = fixture().await;
    let logger = RecordingLogger::new();
    let project = fx.project.to_string_lossy().into_owned();

    git(&["branch", "feat-b"], &fx.project).await;
    let created = fx.runtime.create_workspace(&project, "feat-b", "main", &logger).await;
    assert!(created.success, "create failed: {:?}", created.error);
}

#[tokio::test]
async fn rename_moves_worktree_and_branch() {
    let fx = fixture().await;
    let logger = RecordingLogger::new();
    let project = fx.project.to_string_lossy().into_owned();

    let created = fx.runtime.create_workspace(&project, "feat-a", "main", &logger).await;
    let old_path = PathBuf::from(created.workspace_path.unwrap());

    let renamed = fx.runtime.rename_workspace(&project, "feat-a", "feat-b", &logger).await;
    assert!(renamed.success, "rename failed: {:?}", renamed.error);

    assert!(!old_path.exists());
    let new_path = PathBuf::from(renamed.new_path.unwrap());
    assert!(new_path.join("README.md").exists());

    let output = tokio::process::Command::new("git")
        .args(["branch", "--list", "feat-b"])
        .current_dir(&fx.project)
        .output()
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&output.stdout).contains("feat-b"));
}

#[tokio::test]
async fn delete_is_idempotent() {
    let fx = fixture().await;
    let logger = RecordingLogger::new();
    let project = fx.project.to_string_lossy().into_owned();

    let created = fx.runtime.create_workspace(&project, "feat-a", "main", &logger).await;
    let path = PathBuf::from(created.workspace_path.unwrap());

    let first = fx.runtime.delete_workspace(&project, "feat-a", false, &logger).await;
    assert!(first.success, "delete failed: {:?}", first.error);
    assert!(!path.exists());

    // Deleting again succeeds.
    let second = fx.runtime.delete_workspace(&project, "feat-a", false, &logger).await;
    assert!(second.success);
    assert_eq!(logger.complete_codes(), vec![0, 0, 0]);
}

#[tokio::test]
async fn delete_with_force_clears_dirty_worktree() {
    let fx = fixture().await;
    let logger = RecordingLogger::new();
    let project = fx.project.to_string_lossy().into_owned();

    let created = fx.runtime.create_workspace(&project, "feat-a", "main", &logger).await;
    let path = PathBuf::from(created.workspace_path.unwrap());
    tokio::fs::write(path.join("dirty.txt"), "uncommitted\n").await.unwrap();

    let deleted = fx.runtime.delete_workspace(&project, "feat-a", true, &logger).await;
    assert!(deleted.success, "force delete failed: {:?}", deleted.error);
    assert!(!path.exists());
}

#[tokio::test]
async fn fork_branches_from_the_source_workspace() {
    let fx = fixture().await;
    let logger = RecordingLogger::new();
    let project = fx.project.to_string_lossy().into_owned();

    let created = fx.runtime.create_workspace(&project, "feat-a", "main", &logger).await;
    let source_path = PathBuf::from(created.workspace_path.unwrap());

    // Commit something on the source branch so the fork can see it.
    tokio::fs::write(source_path.join("feature.txt"), "wip\n").await.unwrap();
    git(&["add", "."], &source_path).await;
    git(&["commit", "-m", "wip"], &source_path).await;

    let forked = fx.runtime.fork_workspace(&project, "feat-a", "feat-a-2", &logger).await;
    assert!(forked.success, "fork failed: {:?}", forked.error);
    assert_eq!(forked.source_branch.as_deref(), Some("feat-a"));

    let fork_path = PathBuf::from(forked.workspace_path.unwrap());
    assert!(fork_path.join("feature.txt").exists());
}

#[tokio::test]
async fn workspace_path_follows_base_project_name() {
    let fx = fixture().await;
    let project = fx.project.to_string_lossy().into_owned();
    let path = fx.runtime.workspace_path(&project, "w1");
    assert!(path.ends_with("/repo/w1"), "got: {}", path);
}

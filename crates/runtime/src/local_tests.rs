// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::exec::ExecExit;
use tokio::io::AsyncReadExt;

fn runtime_in(dir: &tempfile::TempDir) -> LocalRuntime {
    LocalRuntime::new(dir.path().to_path_buf())
}

#[tokio::test]
async fn write_then_read_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime_in(&dir);

    let mut writer = runtime.write_file("notes/todo.txt", None).await.unwrap();
    writer.write(b"first line\n").await.unwrap();
    writer.write(b"second line\n").await.unwrap();
    writer.close().await.unwrap();

    let mut reader = runtime.read_file("notes/todo.txt", None).await.unwrap();
    let mut content = String::new();
    reader.read_to_string(&mut content).await.unwrap();
    assert_eq!(content, "first line\nsecond line\n");
}

#[tokio::test]
async fn write_commits_atomically_on_close() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime_in(&dir);

    let mut writer = runtime.write_file("out.txt", None).await.unwrap();
    writer.write(b"data").await.unwrap();

    // Not yet visible at the final path.
    assert!(runtime.stat("out.txt").await.is_err());

    writer.close().await.unwrap();
    writer.close().await.unwrap(); // idempotent

    let stat = runtime.stat("out.txt").await.unwrap();
    assert_eq!(stat.size, 4);
    assert!(!stat.is_directory);

    // No temp siblings left behind.
    let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    assert_eq!(names, vec!["out.txt".to_string()]);
}

#[tokio::test]
async fn read_missing_file_is_file_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime_in(&dir);

    let error = match runtime.read_file("/definitely/not/here", None).await {
        Err(e) => e,
        Ok(_) => panic!("expected an error"),
    };
    assert_eq!(error.class(), mux_core::ErrorClass::FileIo);
    assert!(error.to_string().contains("No such file"), "got: {}", error);
}

#[tokio::test]
async fn ensure_dir_and_stat_directory() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime_in(&dir);

    runtime.ensure_dir("a/b/c").await.unwrap();
    let stat = runtime.stat("a/b/c").await.unwrap();
    assert!(stat.is_directory);
}

#[tokio::test]
async fn resolve_path_handles_relative_and_absolute() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime_in(&dir);

    let relative = runtime.resolve_path("src/main.rs").await.unwrap();
    assert_eq!(relative, dir.path().join("src/main.rs").to_string_lossy());

    assert_eq!(runtime.resolve_path("/etc/hosts").await.unwrap(), "/etc/hosts");

    // Non-existent paths still resolve.
    let ghost = runtime.resolve_path("no/such/file").await.unwrap();
    assert!(ghost.starts_with(&*dir.path().to_string_lossy()));
}

#[tokio::test]
async fn exec_goes_through_the_shared_engine() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime_in(&dir);

    let stream = runtime
        .exec("exit 42", crate::exec::ExecOptions::new("/tmp").timeout_secs(5.0))
        .await
        .unwrap();
    assert_eq!(stream.outcome.exit().await.unwrap(), ExecExit::Code(42));
}

#[tokio::test]
async fn workspace_path_is_the_project_path() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime_in(&dir);
    assert_eq!(runtime.workspace_path("/p/proj", "ws"), "/p/proj");
}

#[tokio::test]
async fn normalize_path_default_matches_core() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime_in(&dir);
    assert_eq!(runtime.normalize_path("a", "/base"), "/base/a");
    assert_eq!(runtime.normalize_path("~/x", "/base"), "~/x");
}

#[tokio::test]
async fn lifecycle_on_local_is_mostly_noop() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = runtime_in(&dir);
    let logger = crate::lifecycle::NullInitLogger;

    let created = runtime.create_workspace("/p/proj", "ws", "main", &logger).await;
    assert!(created.success);
    assert_eq!(created.workspace_path.as_deref(), Some("/p/proj"));

    let deleted = runtime.delete_workspace("/p/proj", "ws", false, &logger).await;
    assert!(deleted.success);

    assert!(!runtime.rename_workspace("/p/proj", "a", "b", &logger).await.success);
    assert!(!runtime.fork_workspace("/p/proj", "a", "b", &logger).await.success);
}

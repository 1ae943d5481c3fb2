// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::Path;

#[test]
fn worktree_path_composes_base_project_name() {
    let path = worktree_workspace_path(
        Path::new("/home/u/mux-src"),
        Path::new("/home/u/code/myapp"),
        "feat-a",
    );
    assert_eq!(path, Path::new("/home/u/mux-src/myapp/feat-a"));
}

#[test]
fn worktree_path_handles_rootless_project() {
    let path = worktree_workspace_path(Path::new("/src"), Path::new("/"), "w");
    assert_eq!(path, Path::new("/src/project/w"));
}

#[test]
fn workspace_id_is_transparent_in_json() {
    let id = WorkspaceId::new("ws-1");
    assert_eq!(serde_json::to_string(&id).unwrap(), "\"ws-1\"");
    let back: WorkspaceId = serde_json::from_str("\"ws-1\"").unwrap();
    assert_eq!(back, id);
    assert_eq!(back.as_str(), "ws-1");
}

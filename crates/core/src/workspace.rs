// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace identity and path composition.
//!
//! A workspace is uniquely named within a project; the id is assigned by the
//! host application and treated as opaque here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Opaque workspace identifier assigned by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkspaceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WorkspaceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for WorkspaceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for WorkspaceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Where the worktree backend materializes a workspace:
/// `<src_base_dir>/<project_name>/<workspace_name>`.
///
/// The project name is the final component of the project path; a path with
/// no file name (e.g. `/`) falls back to `project`.
pub fn worktree_workspace_path(
    src_base_dir: &Path,
    project_path: &Path,
    workspace_name: &str,
) -> PathBuf {
    let project_name = project_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());
    src_base_dir.join(project_name).join(workspace_name)
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime factory: one backend handle per workspace configuration.

use crate::docker::DockerRuntime;
use crate::local::LocalRuntime;
use crate::runtime::Runtime;
use crate::ssh::SshRuntime;
use crate::worktree::WorktreeRuntime;
use mux_core::RuntimeConfig;
use mux_ssh::pool::ConnectionPool;
use std::sync::Arc;

/// Build the runtime for a workspace configuration.
///
/// The connection pool is process-wide and shared across every SSH-backed
/// runtime so semantic targets multiplex onto one master each.
pub fn create_runtime(config: &RuntimeConfig, pool: &Arc<ConnectionPool>) -> Arc<dyn Runtime> {
    match config {
        RuntimeConfig::Local { project_path } => {
            Arc::new(LocalRuntime::new(project_path.clone()))
        }
        RuntimeConfig::Worktree { project_path, src_base_dir } => {
            Arc::new(WorktreeRuntime::new(project_path.clone(), src_base_dir.clone()))
        }
        RuntimeConfig::Ssh { connection, remote_src_dir } => Arc::new(SshRuntime::new(
            Arc::clone(pool),
            connection.clone(),
            remote_src_dir.clone(),
        )),
        RuntimeConfig::CoderSsh { connection, remote_src_dir, hostname_suffix } => {
            Arc::new(SshRuntime::coder(
                Arc::clone(pool),
                connection.clone(),
                remote_src_dir.clone(),
                hostname_suffix.clone(),
            ))
        }
        RuntimeConfig::Docker { container, remote_src_dir } => {
            Arc::new(DockerRuntime::fixed(container.clone(), remote_src_dir.clone()))
        }
        RuntimeConfig::Devcontainer { project_path, remote_src_dir } => {
            Arc::new(DockerRuntime::devcontainer(project_path.clone(), remote_src_dir.clone()))
        }
    }
}

#[cfg(test)]
#[path = "factory_tests.rs"]
mod tests;

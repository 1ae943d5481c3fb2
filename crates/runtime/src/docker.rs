// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker backend: composed commands run under `docker exec`.
//!
//! The devcontainer variant resolves its container id at `ensure_ready` via
//! the devcontainer CLI's labels, then behaves exactly like the fixed
//! variant.

use crate::engine::{RemoteEngine, RemoteSpawner, SpawnedProcess};
use crate::exec::{ExecOptions, ExecStream};
use crate::fileio::{FileReader, FileStat, FileWriter};
use crate::lifecycle::{
    CreateResult, DeleteResult, ForkResult, InitLogger, InitResult, RenameResult,
};
use crate::remote::RemoteRuntimeCore;
use crate::runtime::Runtime;
use async_trait::async_trait;
use mux_core::{RuntimeError, RuntimeKind};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Container id shared between the runtime and its spawner.
struct ContainerRef(RwLock<Option<String>>);

impl ContainerRef {
    fn get(&self) -> Option<String> {
        self.0.read().clone()
    }

    fn set(&self, id: String) {
        *self.0.write() = Some(id);
    }
}

struct DockerSpawner {
    container: Arc<ContainerRef>,
}

#[async_trait]
impl RemoteSpawner for DockerSpawner {
    async fn spawn_remote_process(
        &self,
        command: &str,
        options: &ExecOptions,
    ) -> Result<Box<dyn SpawnedProcess>, RuntimeError> {
        let container = self
            .container
            .get()
            .ok_or_else(|| RuntimeError::Exec("container not resolved yet".to_string()))?;

        let mut docker = tokio::process::Command::new("docker");
        docker.arg("exec").arg("-i");
        if options.force_pty {
            docker.arg("-t");
        }
        docker
            .arg(&container)
            .arg("bash")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = docker
            .spawn()
            .map_err(|e| RuntimeError::Network(format!("failed to spawn docker: {}", e)))?;
        Ok(Box::new(child))
    }
}

/// Runtime over an existing container or a devcontainer.
pub struct DockerRuntime {
    core: RemoteRuntimeCore,
    container: Arc<ContainerRef>,
    devcontainer_project: Option<PathBuf>,
}

impl DockerRuntime {
    /// Address an existing container by id or name.
    pub fn fixed(container: String, remote_src_dir: String) -> Self {
        let runtime = Self::build(RuntimeKind::Docker, remote_src_dir, None);
        runtime.container.set(container);
        runtime
    }

    /// Resolve the project's devcontainer at `ensure_ready`.
    pub fn devcontainer(project_path: PathBuf, remote_src_dir: String) -> Self {
        Self::build(RuntimeKind::Devcontainer, remote_src_dir, Some(project_path))
    }

    fn build(
        kind: RuntimeKind,
        remote_src_dir: String,
        devcontainer_project: Option<PathBuf>,
    ) -> Self {
        let container = Arc::new(ContainerRef(RwLock::new(None)));
        let spawner = Arc::new(DockerSpawner { container: Arc::clone(&container) });
        Self {
            core: RemoteRuntimeCore::new(kind, RemoteEngine::new(spawner), remote_src_dir),
            container,
            devcontainer_project,
        }
    }

    pub fn container_id(&self) -> Option<String> {
        self.container.get()
    }

    async fn check_running(&self, container: &str) -> Result<(), RuntimeError> {
        let output = tokio::process::Command::new("docker")
            .args(["inspect", "-f", "{{.State.Running}}", container])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RuntimeError::Network(format!("failed to run docker: {}", e)))?;
        if !output.status.success() {
            return Err(RuntimeError::Network(format!(
                "container {} not found: {}",
                container,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if String::from_utf8_lossy(&output.stdout).trim() != "true" {
            return Err(RuntimeError::Network(format!("container {} is not running", container)));
        }
        Ok(())
    }

    /// The devcontainer CLI labels its containers with the local folder.
    async fn resolve_devcontainer(&self, project: &std::path::Path) -> Result<String, RuntimeError> {
        let filter = format!("label=devcontainer.local_folder={}", project.display());
        let output = tokio::process::Command::new("docker")
            .args(["ps", "-q", "--filter", &filter])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RuntimeError::Network(format!("failed to run docker: {}", e)))?;
        let id = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        if id.is_empty() {
            return Err(RuntimeError::Exec(format!(
                "no running devcontainer for {}",
                project.display()
            )));
        }
        Ok(id)
    }
}

#[async_trait]
impl Runtime for DockerRuntime {
    fn kind(&self) -> RuntimeKind {
        self.core.kind()
    }

    async fn ensure_ready(&self) -> Result<(), RuntimeError> {
        match (&self.devcontainer_project, self.container.get()) {
            (Some(project), _) => {
                let id = self.resolve_devcontainer(project).await?;
                self.check_running(&id).await?;
                self.container.set(id);
            }
            (None, Some(container)) => self.check_running(&container).await?,
            (None, None) => {
                return Err(RuntimeError::Exec("no container configured".to_string()));
            }
        }
        self.core.ensure_ready().await
    }

    async fn exec(&self, command: &str, options: ExecOptions) -> Result<ExecStream, RuntimeError> {
        self.core.exec(command, options).await
    }

    async fn read_file(
        &self,
        path: &str,
        cancel: Option<CancellationToken>,
    ) -> Result<FileReader, RuntimeError> {
        self.core.read_file(path, cancel).await
    }

    async fn write_file(
        &self,
        path: &str,
        cancel: Option<CancellationToken>,
    ) -> Result<FileWriter, RuntimeError> {
        self.core.write_file(path, cancel).await
    }

    async fn ensure_dir(&self, path: &str) -> Result<(), RuntimeError> {
        self.core.ensure_dir(path).await
    }

    async fn stat(&self, path: &str) -> Result<FileStat, RuntimeError> {
        self.core.stat(path).await
    }

    async fn resolve_path(&self, path: &str) -> Result<String, RuntimeError> {
        self.core.resolve_path(path).await
    }

    fn temp_dir(&self) -> String {
        self.core.temp_dir()
    }

    fn workspace_path(&self, project_path: &str, workspace_name: &str) -> String {
        self.core.workspace_path(project_path, workspace_name)
    }

    async fn create_workspace(
        &self,
        project_path: &str,
        workspace_name: &str,
        trunk_branch: &str,
        logger: &dyn InitLogger,
    ) -> CreateResult {
        self.core.create_workspace(project_path, workspace_name, trunk_branch, logger).await
    }

    async fn init_workspace(
        &self,
        project_path: &str,
        workspace_name: &str,
        logger: &dyn InitLogger,
    ) -> InitResult {
        self.core.init_workspace(project_path, workspace_name, logger).await
    }

    async fn rename_workspace(
        &self,
        project_path: &str,
        old_name: &str,
        new_name: &str,
        logger: &dyn InitLogger,
    ) -> RenameResult {
        self.core.rename_workspace(project_path, old_name, new_name, logger).await
    }

    async fn delete_workspace(
        &self,
        project_path: &str,
        workspace_name: &str,
        force: bool,
        logger: &dyn InitLogger,
    ) -> DeleteResult {
        self.core.delete_workspace(project_path, workspace_name, force, logger).await
    }

    async fn fork_workspace(
        &self,
        project_path: &str,
        source_name: &str,
        new_name: &str,
        logger: &dyn InitLogger,
    ) -> ForkResult {
        self.core.fork_workspace(project_path, source_name, new_name, logger).await
    }
}

#[cfg(test)]
#[path = "docker_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The metadata service: serialized mutations, lock-free reads.
//!
//! The in-memory state is authoritative; the file is its persistence. Every
//! mutation runs under one async lock (so cross-workspace read-modify-write
//! races cannot occur), updates memory, and lands on disk via a temp sibling
//! plus rename. Readers clone from memory and never touch the lock.

use crate::metadata::{
    AgentStatus, ExtensionMetadata, MetadataFile, ThinkingLevel, METADATA_SCHEMA_VERSION,
};
use indexmap::IndexMap;
use mux_core::{Clock, SystemClock, WorkspaceId};
use parking_lot::RwLock;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("metadata I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("metadata serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("no home directory")]
    NoHome,
}

/// Read-only view of one workspace's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceSnapshot {
    pub recency: u64,
    pub streaming: bool,
    pub last_model: Option<String>,
    pub last_thinking_level: Option<ThinkingLevel>,
    pub agent_status: Option<AgentStatus>,
}

impl From<&ExtensionMetadata> for WorkspaceSnapshot {
    fn from(metadata: &ExtensionMetadata) -> Self {
        Self {
            recency: metadata.recency,
            streaming: metadata.streaming,
            last_model: metadata.last_model.clone(),
            last_thinking_level: metadata.last_thinking_level,
            agent_status: metadata.agent_status.clone(),
        }
    }
}

/// File-backed, single-writer metadata store.
pub struct ExtensionMetadataService<C: Clock = SystemClock> {
    path: PathBuf,
    clock: C,
    state: RwLock<MetadataFile>,
    write_lock: tokio::sync::Mutex<()>,
}

impl ExtensionMetadataService<SystemClock> {
    /// Store at `<home>/.mux/extensionMetadata.json`.
    pub fn at_default_location() -> Result<Self, StoreError> {
        let home = dirs::home_dir().ok_or(StoreError::NoHome)?;
        Ok(Self::new(home.join(".mux").join("extensionMetadata.json"), SystemClock))
    }
}

impl<C: Clock> ExtensionMetadataService<C> {
    pub fn new(path: PathBuf, clock: C) -> Self {
        Self {
            path,
            clock,
            state: RwLock::new(MetadataFile::default()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Load the file (creating it if needed) and clear any `streaming`
    /// flags left behind by a crash.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = match tokio::fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice::<MetadataFile>(&bytes) {
                Ok(file) if file.version == METADATA_SCHEMA_VERSION => file,
                Ok(file) => {
                    tracing::warn!(
                        version = file.version,
                        "unsupported metadata schema; resetting"
                    );
                    MetadataFile::default()
                }
                Err(error) => {
                    tracing::warn!(error = %error, "malformed metadata file; resetting");
                    MetadataFile::default()
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => MetadataFile::default(),
            Err(error) => return Err(error.into()),
        };

        // Crash recovery: nothing can still be streaming at startup.
        for metadata in file.workspaces.values_mut() {
            metadata.streaming = false;
        }

        *self.state.write() = file;
        self.persist().await
    }

    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut MetadataFile) -> T,
    ) -> Result<T, StoreError> {
        let _guard = self.write_lock.lock().await;
        let value = f(&mut self.state.write());
        self.persist().await?;
        Ok(value)
    }

    /// Atomic persist: temp sibling, then rename over the target.
    async fn persist(&self) -> Result<(), StoreError> {
        let bytes = {
            let state = self.state.read();
            serde_json::to_vec_pretty(&*state)?
        };
        let tmp = self
            .path
            .with_extension(format!("tmp.{}", self.clock.epoch_ms()));
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    pub async fn update_recency(&self, workspace: &WorkspaceId) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();
        self.mutate(|file| {
            file.workspaces.entry(workspace.clone()).or_default().recency = now;
        })
        .await
    }

    pub async fn set_streaming(
        &self,
        workspace: &WorkspaceId,
        streaming: bool,
    ) -> Result<(), StoreError> {
        self.mutate(|file| {
            file.workspaces.entry(workspace.clone()).or_default().streaming = streaming;
        })
        .await
    }

    pub async fn set_last_model(
        &self,
        workspace: &WorkspaceId,
        model: Option<String>,
        thinking_level: Option<ThinkingLevel>,
    ) -> Result<(), StoreError> {
        self.mutate(|file| {
            let entry = file.workspaces.entry(workspace.clone()).or_default();
            entry.last_model = model;
            entry.last_thinking_level = thinking_level;
        })
        .await
    }

    /// Set or clear the agent status.
    ///
    /// A new status without a URL inherits the most recent known URL; a
    /// cleared status retains `last_status_url` so the next status can
    /// still inherit it.
    pub async fn set_agent_status(
        &self,
        workspace: &WorkspaceId,
        status: Option<AgentStatus>,
    ) -> Result<(), StoreError> {
        self.mutate(|file| {
            let entry = file.workspaces.entry(workspace.clone()).or_default();
            match status {
                Some(mut status) => {
                    if status.url.is_none() {
                        status.url = entry
                            .agent_status
                            .as_ref()
                            .and_then(|previous| previous.url.clone())
                            .or_else(|| entry.last_status_url.clone());
                    }
                    if let Some(url) = &status.url {
                        entry.last_status_url = Some(url.clone());
                    }
                    entry.agent_status = Some(status);
                }
                None => {
                    entry.agent_status = None;
                }
            }
        })
        .await
    }

    pub async fn delete_workspace(&self, workspace: &WorkspaceId) -> Result<(), StoreError> {
        self.mutate(|file| {
            file.workspaces.remove(workspace.as_str());
        })
        .await
    }

    /// Clear every `streaming` flag (also available outside `initialize`).
    pub async fn clear_stale_streaming(&self) -> Result<usize, StoreError> {
        self.mutate(|file| {
            let mut cleared = 0;
            for metadata in file.workspaces.values_mut() {
                if metadata.streaming {
                    metadata.streaming = false;
                    cleared += 1;
                }
            }
            cleared
        })
        .await
    }

    /// Read one workspace. Never blocks on writers.
    pub fn get(&self, workspace: &WorkspaceId) -> Option<ExtensionMetadata> {
        self.state.read().workspaces.get(workspace.as_str()).cloned()
    }

    /// All workspaces, most recently used first.
    pub fn all_snapshots(&self) -> IndexMap<WorkspaceId, WorkspaceSnapshot> {
        let state = self.state.read();
        let mut entries: Vec<(WorkspaceId, WorkspaceSnapshot)> = state
            .workspaces
            .iter()
            .map(|(id, metadata)| (id.clone(), WorkspaceSnapshot::from(metadata)))
            .collect();
        entries.sort_by(|a, b| b.1.recency.cmp(&a.1.recency).then_with(|| a.0.cmp(&b.0)));
        entries.into_iter().collect()
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;

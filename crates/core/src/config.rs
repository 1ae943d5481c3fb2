// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend configuration value types.
//!
//! A [`RuntimeConfig`] describes one workspace's backend; the runtime
//! factory turns it into a live `Runtime` handle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which backend a runtime dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeKind {
    Local,
    Worktree,
    Ssh,
    CoderSsh,
    Docker,
    Devcontainer,
}

impl RuntimeKind {
    /// Value exported as `MUX_RUNTIME` to init hooks.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Worktree => "worktree",
            Self::Ssh => "ssh",
            Self::CoderSsh => "coder-ssh",
            Self::Docker => "docker",
            Self::Devcontainer => "devcontainer",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One workspace's backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RuntimeConfig {
    /// Direct OS calls against the project path itself.
    Local { project_path: PathBuf },
    /// Local host plus git-worktree lifecycle under `src_base_dir`.
    Worktree { project_path: PathBuf, src_base_dir: PathBuf },
    /// SSH-reachable host; workspaces live under `remote_src_dir`.
    Ssh { connection: SshConnectionConfig, remote_src_dir: String },
    /// Managed-cloud host reached through the mux proxy binary.
    CoderSsh {
        connection: SshConnectionConfig,
        remote_src_dir: String,
        hostname_suffix: String,
    },
    /// Existing container addressed by id or name.
    Docker { container: String, remote_src_dir: String },
    /// Devcontainer resolved to a container id at `ensure_ready`.
    Devcontainer { project_path: PathBuf, remote_src_dir: String },
}

impl RuntimeConfig {
    pub fn kind(&self) -> RuntimeKind {
        match self {
            Self::Local { .. } => RuntimeKind::Local,
            Self::Worktree { .. } => RuntimeKind::Worktree,
            Self::Ssh { .. } => RuntimeKind::Ssh,
            Self::CoderSsh { .. } => RuntimeKind::CoderSsh,
            Self::Docker { .. } => RuntimeKind::Docker,
            Self::Devcontainer { .. } => RuntimeKind::Devcontainer,
        }
    }
}

/// How to reach one SSH target.
///
/// Two configs with the same [`identity_key`](Self::identity_key) share one
/// pooled master connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshConnectionConfig {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jump_hosts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_command: Option<String>,
}

impl SshConnectionConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into(), ..Self::default() }
    }

    /// `user@host` destination accepted by the ssh binary.
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    /// Semantic pool key: every field that changes which host (or route) a
    /// connection lands on participates; cosmetic differences do not.
    pub fn identity_key(&self) -> String {
        let mut key = String::new();
        key.push_str(&self.destination());
        key.push(':');
        key.push_str(&self.port.unwrap_or(22).to_string());
        if let Some(identity) = &self.identity_file {
            key.push_str("|i=");
            key.push_str(&identity.display().to_string());
        }
        if !self.jump_hosts.is_empty() {
            key.push_str("|j=");
            key.push_str(&self.jump_hosts.join(","));
        }
        if let Some(proxy) = &self.proxy_command {
            key.push_str("|p=");
            key.push_str(proxy);
        }
        key
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

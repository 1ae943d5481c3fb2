// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The signing service: key selection, envelope production, GitHub login.

use crate::agent::{pick_identity, IdentityOverride, SshAgentClient};
use crate::keys::{normalize_public_key, scan_disk_keys};
use crate::wire::encode_signature;
use base64::Engine as _;
use serde::Serialize;
use signature::Signer;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::OnceCell;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("no usable signing key")]
    NoUsableKey {
        /// An encrypted disk key exists that an agent could unlock.
        has_encrypted_key: bool,
    },
    #[error("ssh agent error: {0}")]
    Agent(String),
    #[error("key format error: {0}")]
    KeyFormat(String),
    #[error("signing failed: {0}")]
    Signature(String),
}

/// What the UI may advertise about signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningCapabilities {
    pub can_sign: bool,
    pub has_encrypted_key: bool,
}

/// Signed artifact envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureEnvelope {
    /// Normalized OpenSSH public key (`algorithm base64`); always the key
    /// the signature was produced with.
    pub public_key: String,
    /// Base64 of the SSH wire signature.
    pub sig: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_user: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SigningConfig {
    /// Explicit mux-specific key; wins over everything when usable.
    pub mux_key_path: Option<PathBuf>,
    /// Defaults to `~/.ssh`.
    pub ssh_dir: Option<PathBuf>,
    /// Restricts which agent identity may be used.
    pub identity_override: Option<IdentityOverride>,
    /// Skip the agent entirely (tests, constrained environments).
    pub disable_agent: bool,
    /// Skip the `gh` lookup (tests, offline environments).
    pub disable_github_lookup: bool,
}

impl SigningConfig {
    fn ssh_dir(&self) -> PathBuf {
        self.ssh_dir
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".ssh")))
            .unwrap_or_else(|| PathBuf::from("/nonexistent/.ssh"))
    }
}

/// Message signing backed by SSH keys.
pub struct SigningService {
    config: SigningConfig,
    github_user: OnceCell<Option<String>>,
}

impl SigningService {
    pub fn new(config: SigningConfig) -> Self {
        Self { config, github_user: OnceCell::new() }
    }

    /// What signing can currently offer (drives UI affordances).
    pub async fn capabilities(&self) -> SigningCapabilities {
        let ssh_dir = self.config.ssh_dir();
        let scan = scan_disk_keys(&ssh_dir, self.config.mux_key_path.as_deref()).await;
        let mut can_sign = scan.usable.is_some();

        if !can_sign && !self.config.disable_agent {
            if let Ok(Some(mut agent)) = SshAgentClient::connect().await {
                if let Ok(identities) = agent.list_identities().await {
                    can_sign =
                        pick_identity(identities, self.config.identity_override.as_ref())
                            .is_some();
                }
            }
        }

        SigningCapabilities { can_sign, has_encrypted_key: scan.has_encrypted_key }
    }

    /// Sign `message`, producing an envelope whose `public_key` matches the
    /// key actually used.
    pub async fn sign(&self, message: &[u8]) -> Result<SignatureEnvelope, SigningError> {
        let github_user = self.github_user().await;

        // 1. Explicit mux key.
        if let Some(explicit) = &self.config.mux_key_path {
            let scan = scan_disk_keys(std::path::Path::new("/nonexistent"), Some(explicit)).await;
            if let Some(key) = scan.usable {
                return self.sign_with_disk_key(&key, message, github_user);
            }
        }

        // 2. Agent, with the preference order applied.
        if !self.config.disable_agent {
            if let Some(mut agent) = SshAgentClient::connect().await? {
                let identities = agent.list_identities().await?;
                if let Some(identity) =
                    pick_identity(identities, self.config.identity_override.as_ref())
                {
                    let sig_blob = agent.sign(&identity.key_blob, message).await?;
                    return Ok(SignatureEnvelope {
                        public_key: identity.public_openssh()?,
                        sig: base64::engine::general_purpose::STANDARD.encode(sig_blob),
                        github_user,
                    });
                }
            }
        }

        // 3. Default disk keys.
        let scan = scan_disk_keys(&self.config.ssh_dir(), None).await;
        match scan.usable {
            Some(key) => self.sign_with_disk_key(&key, message, github_user),
            None => Err(SigningError::NoUsableKey {
                has_encrypted_key: scan.has_encrypted_key,
            }),
        }
    }

    fn sign_with_disk_key(
        &self,
        key: &crate::keys::LoadedKey,
        message: &[u8],
        github_user: Option<String>,
    ) -> Result<SignatureEnvelope, SigningError> {
        let signature: ssh_key::Signature = key
            .private
            .try_sign(message)
            .map_err(|error| SigningError::Signature(error.to_string()))?;
        let wire = encode_signature(signature.algorithm().as_str(), signature.as_bytes());

        let public = key
            .private
            .public_key()
            .to_openssh()
            .map_err(|error| SigningError::KeyFormat(error.to_string()))?;

        tracing::debug!(path = %key.path.display(), "signed with disk key");
        Ok(SignatureEnvelope {
            public_key: normalize_public_key(&public),
            sig: base64::engine::general_purpose::STANDARD.encode(wire),
            github_user,
        })
    }

    /// Best-effort GitHub login via the `gh` CLI, cached per process.
    async fn github_user(&self) -> Option<String> {
        if self.config.disable_github_lookup {
            return None;
        }
        self.github_user
            .get_or_init(|| async {
                if which::which("gh").is_err() {
                    return None;
                }
                let output = tokio::process::Command::new("gh")
                    .args(["api", "user", "--jq", ".login"])
                    .stdin(std::process::Stdio::null())
                    .output()
                    .await
                    .ok()?;
                if !output.status.success() {
                    return None;
                }
                let login = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if login.is_empty() {
                    None
                } else {
                    Some(login)
                }
            })
            .await
            .clone()
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;

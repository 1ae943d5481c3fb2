// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal ssh-agent client: list identities, sign.
//!
//! Speaks the agent protocol over `$SSH_AUTH_SOCK`. Only key types the
//! signing service supports are surfaced; RSA (which would need SHA-2
//! signing flags) is filtered out with the rest.

use crate::service::SigningError;
use crate::wire::{put_string, put_u32, Reader};
use ssh_key::public::PublicKey;
use ssh_key::{Algorithm, EcdsaCurve};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

const SSH_AGENTC_REQUEST_IDENTITIES: u8 = 11;
const SSH_AGENT_IDENTITIES_ANSWER: u8 = 12;
const SSH_AGENTC_SIGN_REQUEST: u8 = 13;
const SSH_AGENT_SIGN_RESPONSE: u8 = 14;

const MAX_AGENT_MESSAGE: u32 = 16 * 1024 * 1024;

/// One key held by the agent.
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    pub key_blob: Vec<u8>,
    pub comment: String,
    pub public: PublicKey,
}

impl AgentIdentity {
    /// OpenSSH one-line form (no comment).
    pub fn public_openssh(&self) -> Result<String, SigningError> {
        self.public
            .to_openssh()
            .map(|text| crate::keys::normalize_public_key(&text))
            .map_err(|error| SigningError::KeyFormat(error.to_string()))
    }
}

/// Configuration-supplied identity filter.
#[derive(Debug, Clone)]
pub enum IdentityOverride {
    /// Full `algorithm base64` public key text.
    PublicKey(String),
    /// `SHA256:` fingerprint.
    Fingerprint(String),
}

/// Preference order among supported algorithms; `None` means unsupported.
fn algorithm_rank(algorithm: &Algorithm) -> Option<u8> {
    match algorithm {
        Algorithm::Ed25519 => Some(0),
        Algorithm::Ecdsa { curve: EcdsaCurve::NistP256 } => Some(1),
        Algorithm::Ecdsa { curve: EcdsaCurve::NistP384 } => Some(2),
        Algorithm::Ecdsa { curve: EcdsaCurve::NistP521 } => Some(3),
        _ => None,
    }
}

/// Pick the identity to sign with: filtered by the override when present,
/// otherwise the best-ranked supported key.
pub fn pick_identity(
    identities: Vec<AgentIdentity>,
    override_filter: Option<&IdentityOverride>,
) -> Option<AgentIdentity> {
    let mut supported: Vec<(u8, AgentIdentity)> = identities
        .into_iter()
        .filter_map(|identity| {
            algorithm_rank(&identity.public.algorithm()).map(|rank| (rank, identity))
        })
        .collect();

    if let Some(filter) = override_filter {
        supported.retain(|(_, identity)| match filter {
            IdentityOverride::PublicKey(expected) => identity
                .public_openssh()
                .map(|text| text == crate::keys::normalize_public_key(expected))
                .unwrap_or(false),
            IdentityOverride::Fingerprint(expected) => {
                identity.public.fingerprint(ssh_key::HashAlg::Sha256).to_string()
                    == *expected
            }
        });
    }

    supported.sort_by_key(|(rank, _)| *rank);
    supported.into_iter().map(|(_, identity)| identity).next()
}

/// Client for one agent socket.
pub struct SshAgentClient {
    stream: UnixStream,
}

impl SshAgentClient {
    /// Connect to `$SSH_AUTH_SOCK`; `None` when no agent is advertised.
    pub async fn connect() -> Result<Option<Self>, SigningError> {
        let Some(sock) = std::env::var_os("SSH_AUTH_SOCK") else {
            return Ok(None);
        };
        match UnixStream::connect(&sock).await {
            Ok(stream) => Ok(Some(Self { stream })),
            Err(error) => {
                tracing::debug!(error = %error, "ssh agent unreachable");
                Ok(None)
            }
        }
    }

    pub async fn connect_to(path: &std::path::Path) -> Result<Self, SigningError> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(|error| SigningError::Agent(format!("agent unreachable: {}", error)))?;
        Ok(Self { stream })
    }

    async fn round_trip(&mut self, payload: &[u8]) -> Result<Vec<u8>, SigningError> {
        let mut framed = Vec::with_capacity(payload.len() + 4);
        put_u32(&mut framed, payload.len() as u32);
        framed.extend_from_slice(payload);
        self.stream
            .write_all(&framed)
            .await
            .map_err(|error| SigningError::Agent(error.to_string()))?;

        let mut len_bytes = [0u8; 4];
        self.stream
            .read_exact(&mut len_bytes)
            .await
            .map_err(|error| SigningError::Agent(error.to_string()))?;
        let len = u32::from_be_bytes(len_bytes);
        if len == 0 || len > MAX_AGENT_MESSAGE {
            return Err(SigningError::Agent(format!("implausible agent reply length {}", len)));
        }
        let mut reply = vec![0u8; len as usize];
        self.stream
            .read_exact(&mut reply)
            .await
            .map_err(|error| SigningError::Agent(error.to_string()))?;
        Ok(reply)
    }

    /// `SSH_AGENTC_REQUEST_IDENTITIES`.
    pub async fn list_identities(&mut self) -> Result<Vec<AgentIdentity>, SigningError> {
        let reply = self.round_trip(&[SSH_AGENTC_REQUEST_IDENTITIES]).await?;
        let mut reader = Reader::new(&reply);
        let kind = reader.u8().map_err(SigningError::Agent)?;
        if kind != SSH_AGENT_IDENTITIES_ANSWER {
            return Err(SigningError::Agent(format!("unexpected agent reply {}", kind)));
        }

        let count = reader.u32().map_err(SigningError::Agent)?;
        let mut identities = Vec::new();
        for _ in 0..count {
            let blob = reader.string().map_err(SigningError::Agent)?.to_vec();
            let comment = String::from_utf8_lossy(reader.string().map_err(SigningError::Agent)?)
                .into_owned();
            match PublicKey::from_bytes(&blob) {
                Ok(public) => identities.push(AgentIdentity { key_blob: blob, comment, public }),
                Err(error) => {
                    tracing::debug!(error = %error, comment, "skipping unparseable agent key");
                }
            }
        }
        Ok(identities)
    }

    /// `SSH_AGENTC_SIGN_REQUEST`; returns the SSH wire signature blob.
    pub async fn sign(
        &mut self,
        key_blob: &[u8],
        message: &[u8],
    ) -> Result<Vec<u8>, SigningError> {
        let mut payload = Vec::with_capacity(key_blob.len() + message.len() + 16);
        payload.push(SSH_AGENTC_SIGN_REQUEST);
        put_string(&mut payload, key_blob);
        put_string(&mut payload, message);
        put_u32(&mut payload, 0); // no flags for ed25519/ecdsa

        let reply = self.round_trip(&payload).await?;
        let mut reader = Reader::new(&reply);
        let kind = reader.u8().map_err(SigningError::Agent)?;
        if kind != SSH_AGENT_SIGN_RESPONSE {
            return Err(SigningError::Agent(format!("agent refused to sign (reply {})", kind)));
        }
        Ok(reader.string().map_err(SigningError::Agent)?.to_vec())
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk key discovery.
//!
//! Scans a prioritized candidate list for an unencrypted OpenSSH private
//! key. Encrypted keys are surfaced via a capability flag but never used
//! without an agent.

use ssh_key::PrivateKey;
use std::path::{Path, PathBuf};

/// Default disk keys, in precedence order.
pub const DEFAULT_KEY_FILES: &[&str] = &["id_ed25519", "id_ecdsa"];

/// A usable (unencrypted) private key loaded from disk.
pub struct LoadedKey {
    pub path: PathBuf,
    pub private: PrivateKey,
}

/// Outcome of a disk scan.
pub struct KeyScan {
    pub usable: Option<LoadedKey>,
    /// An encrypted key exists on disk (usable only through an agent).
    pub has_encrypted_key: bool,
}

/// Scan `explicit` (if given) then the default key files under `ssh_dir`.
pub async fn scan_disk_keys(ssh_dir: &Path, explicit: Option<&Path>) -> KeyScan {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    for name in DEFAULT_KEY_FILES {
        candidates.push(ssh_dir.join(name));
    }

    let mut has_encrypted_key = false;
    let mut usable = None;

    for path in candidates {
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(_) => continue,
        };
        match PrivateKey::from_openssh(&contents) {
            Ok(key) if key.is_encrypted() => {
                tracing::debug!(path = %path.display(), "skipping encrypted key");
                has_encrypted_key = true;
            }
            Ok(key) => {
                if usable.is_none() {
                    usable = Some(LoadedKey { path, private: key });
                }
            }
            Err(error) => {
                tracing::debug!(path = %path.display(), error = %error, "unreadable key");
            }
        }
    }

    KeyScan { usable, has_encrypted_key }
}

/// Normalize an OpenSSH public key line to `algorithm base64` — whitespace
/// collapsed, comment dropped — so envelope comparisons are byte-stable.
pub fn normalize_public_key(openssh: &str) -> String {
    openssh.split_whitespace().take(2).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Managed-cloud host support: the mux block in `~/.ssh/config`.
//!
//! Hosts under the managed suffix are reached through the mux binary acting
//! as a `ProxyCommand`. The block lives between two well-known marker lines
//! and is rewritten atomically; anything outside the markers is preserved
//! byte-for-byte. A config with duplicated or out-of-order markers is
//! corrupted and never guessed at.

use mux_core::RuntimeError;
use std::path::{Path, PathBuf};

pub const CODER_BLOCK_START: &str = "# --- mux coder: start ---";
pub const CODER_BLOCK_END: &str = "# --- mux coder: end ---";

const MAX_SYMLINK_HOPS: usize = 32;

/// Render the managed-host block (markers included).
pub fn render_coder_block(
    binary_path: &str,
    hostname_suffix: &str,
) -> Result<String, RuntimeError> {
    if binary_path.contains('\n') || binary_path.contains('\r') {
        return Err(RuntimeError::Validation(
            "binary path must not contain newline characters".to_string(),
        ));
    }
    if binary_path.contains('"') {
        return Err(RuntimeError::Validation(
            "binary path must not contain quote characters".to_string(),
        ));
    }
    if hostname_suffix.is_empty()
        || !hostname_suffix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(RuntimeError::Validation(format!(
            "invalid hostname suffix: {:?}",
            hostname_suffix
        )));
    }

    Ok(format!(
        "{start}\n\
         Host *.{suffix}\n\
         \x20 ConnectTimeout 0\n\
         \x20 LogLevel ERROR\n\
         \x20 StrictHostKeyChecking no\n\
         \x20 UserKnownHostsFile /dev/null\n\
         \x20 ProxyCommand \"{binary}\" ssh --stdio --hostname-suffix {suffix} %h\n\
         {end}\n",
        start = CODER_BLOCK_START,
        suffix = hostname_suffix,
        binary = binary_path,
        end = CODER_BLOCK_END,
    ))
}

/// Insert or rewrite the block between the markers, preserving everything
/// else byte-for-byte.
pub(crate) fn splice_block(existing: &str, block: &str) -> Result<String, RuntimeError> {
    let lines: Vec<&str> = existing.lines().collect();
    let starts: Vec<usize> =
        lines.iter().enumerate().filter(|(_, l)| l.trim() == CODER_BLOCK_START).map(|(i, _)| i).collect();
    let ends: Vec<usize> =
        lines.iter().enumerate().filter(|(_, l)| l.trim() == CODER_BLOCK_END).map(|(i, _)| i).collect();

    match (starts.as_slice(), ends.as_slice()) {
        ([], []) => {
            let mut updated = existing.to_string();
            if !updated.is_empty() && !updated.ends_with('\n') {
                updated.push('\n');
            }
            if !updated.is_empty() {
                updated.push('\n');
            }
            updated.push_str(block);
            Ok(updated)
        }
        ([start], [end]) if start < end => {
            let mut updated = String::new();
            for line in &lines[..*start] {
                updated.push_str(line);
                updated.push('\n');
            }
            updated.push_str(block);
            for line in &lines[end + 1..] {
                updated.push_str(line);
                updated.push('\n');
            }
            Ok(updated)
        }
        _ => Err(RuntimeError::Validation(
            "corrupted ssh config: mux marker lines are duplicated or out of order".to_string(),
        )),
    }
}

/// Resolve `~/.ssh/config` through user symlinks down to the final target.
async fn follow_symlinks(path: &Path) -> Result<PathBuf, RuntimeError> {
    let mut current = path.to_path_buf();
    for _ in 0..MAX_SYMLINK_HOPS {
        match tokio::fs::symlink_metadata(&current).await {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                let target = tokio::fs::read_link(&current)
                    .await
                    .map_err(|e| RuntimeError::FileIo(e.to_string()))?;
                current = if target.is_absolute() {
                    target
                } else {
                    current.parent().unwrap_or_else(|| Path::new("/")).join(target)
                };
            }
            // Missing is fine: the config will be created.
            _ => return Ok(current),
        }
    }
    Err(RuntimeError::FileIo(format!("too many symlink hops resolving {}", path.display())))
}

/// Write (or rewrite) the managed-host block in `config_path`.
///
/// Atomic: the new content lands in a temp sibling and is renamed over the
/// resolved target, keeping the original file mode.
pub async fn write_coder_block(
    config_path: &Path,
    binary_path: &str,
    hostname_suffix: &str,
) -> Result<(), RuntimeError> {
    let block = render_coder_block(binary_path, hostname_suffix)?;
    let target = follow_symlinks(config_path).await?;

    let existing = match tokio::fs::read_to_string(&target).await {
        Ok(content) => content,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(error) => return Err(RuntimeError::FileIo(error.to_string())),
    };
    let updated = splice_block(&existing, &block)?;

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| RuntimeError::FileIo(e.to_string()))?;
    }

    let file_name = target.file_name().map(|n| n.to_string_lossy().into_owned());
    let tmp = target.with_file_name(format!(
        "{}.tmp.{}",
        file_name.unwrap_or_else(|| "config".to_string()),
        uuid::Uuid::new_v4().simple()
    ));
    tokio::fs::write(&tmp, &updated).await.map_err(|e| RuntimeError::FileIo(e.to_string()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = match tokio::fs::metadata(&target).await {
            Ok(metadata) => metadata.permissions().mode(),
            Err(_) => 0o600,
        };
        tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(mode))
            .await
            .map_err(|e| RuntimeError::FileIo(e.to_string()))?;
    }

    tokio::fs::rename(&tmp, &target).await.map_err(|e| RuntimeError::FileIo(e.to_string()))?;
    tracing::info!(path = %target.display(), suffix = hostname_suffix, "updated ssh config block");
    Ok(())
}

#[cfg(test)]
#[path = "coder_tests.rs"]
mod tests;

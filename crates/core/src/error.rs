// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across every runtime backend.
//!
//! Callers (the UI layer) dispatch on [`ErrorClass`]; the message carries the
//! raw cause for logs. Timeout and abort are modeled as exit sentinels on the
//! stream and never surface as `Unknown`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification the calling layer dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Command setup failed (including "aborted before execution").
    Exec,
    /// Transport failed (SSH dial, docker daemon unreachable).
    Network,
    /// Any underlying read/write path.
    FileIo,
    /// Stream-level timeout.
    Timeout,
    /// User cancellation.
    Aborted,
    /// Bad input: marker duplication, newline in a path, malformed envelope.
    Validation,
    /// Catch-all, trimmed to non-empty.
    Unknown,
}

/// Runtime error carrying its class and cause message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("command setup failed: {0}")]
    Exec(String),

    #[error("transport failed: {0}")]
    Network(String),

    #[error("file I/O failed: {0}")]
    FileIo(String),

    #[error("timed out")]
    Timeout,

    #[error("aborted")]
    Aborted,

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{0}")]
    Unknown(String),
}

impl RuntimeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Exec(_) => ErrorClass::Exec,
            Self::Network(_) => ErrorClass::Network,
            Self::FileIo(_) => ErrorClass::FileIo,
            Self::Timeout => ErrorClass::Timeout,
            Self::Aborted => ErrorClass::Aborted,
            Self::Validation(_) => ErrorClass::Validation,
            Self::Unknown(_) => ErrorClass::Unknown,
        }
    }

    /// Catch-all constructor. Trims the message and substitutes a placeholder
    /// when the cause was empty, so the UI never renders a blank error.
    pub fn unknown(message: impl Into<String>) -> Self {
        let message = message.into();
        let trimmed = message.trim();
        if trimmed.is_empty() {
            Self::Unknown("unknown error".to_string())
        } else {
            Self::Unknown(trimmed.to_string())
        }
    }

    /// File I/O error from a non-zero remote exit: prefers the stderr tail,
    /// falls back to the exit code so the message is never empty.
    pub fn file_io_from_exit(code: i32, stderr_tail: &str) -> Self {
        let tail = stderr_tail.trim();
        if tail.is_empty() {
            Self::FileIo(format!("exit code {}", code))
        } else {
            Self::FileIo(tail.to_string())
        }
    }
}

/// Strip placeholder-variable leakage from a message destined for the UI.
///
/// Upstream layers occasionally interpolate a missing variable as the literal
/// string `undefined`, yielding messages like `undefined: connection lost`.
pub fn user_message(raw: &str) -> &str {
    raw.strip_prefix("undefined: ").unwrap_or(raw)
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

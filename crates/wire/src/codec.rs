// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line codec: one JSON document per `\n`-terminated line.

use crate::message::RpcMessage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("transport closed")]
    Closed,
    #[error("I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialize a message and append the line terminator.
pub fn encode_line(message: &RpcMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Parse one non-empty line into a message.
pub fn decode_line(line: &str) -> Result<RpcMessage, ProtocolError> {
    Ok(serde_json::from_str(line)?)
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed messages between the dispatcher and the analytics worker.
//!
//! Requests carry `{messageId, taskName, data}`; responses either
//! `{messageId, result}` or `{messageId, error: {message, stack?}}`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Monotonically increasing per-worker request id.
pub type MessageId = u32;

/// Worker task, tagged by `taskName` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "taskName", content = "data", rename_all = "camelCase")]
pub enum WorkerRequest {
    #[serde(rename_all = "camelCase")]
    Init { db_path: PathBuf },
    #[serde(rename_all = "camelCase")]
    Query { query_name: String, params: serde_json::Value },
    #[serde(rename_all = "camelCase")]
    RebuildAll {
        sessions_dir: PathBuf,
        workspace_meta_by_id: HashMap<String, serde_json::Value>,
    },
    #[serde(rename_all = "camelCase")]
    Ingest { events: Vec<serde_json::Value> },
    #[serde(rename_all = "camelCase")]
    ClearWorkspace { workspace_id: String },
    #[serde(rename_all = "camelCase")]
    NeedsBackfill { sessions_dir: PathBuf },
    Shutdown,
}

impl WorkerRequest {
    pub fn task_name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Query { .. } => "query",
            Self::RebuildAll { .. } => "rebuildAll",
            Self::Ingest { .. } => "ingest",
            Self::ClearWorkspace { .. } => "clearWorkspace",
            Self::NeedsBackfill { .. } => "needsBackfill",
            Self::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub message_id: MessageId,
    #[serde(flatten)]
    pub request: WorkerRequest,
}

/// Worker-side failure, serializable across the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl WorkerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), stack: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub message_id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WorkerError>,
}

impl ResponseEnvelope {
    pub fn ok(message_id: MessageId, result: serde_json::Value) -> Self {
        Self { message_id, result: Some(result), error: None }
    }

    pub fn err(message_id: MessageId, error: WorkerError) -> Self {
        Self { message_id, result: None, error: Some(error) }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;

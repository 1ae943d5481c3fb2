// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk schema for the extension-metadata file.
//!
//! Schema version 1 is the only supported version; anything else is treated
//! as corrupt and reset. Fields this build does not know about are captured
//! and written back untouched.

use mux_core::WorkspaceId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The only supported schema version.
pub const METADATA_SCHEMA_VERSION: u32 = 1;

/// Thinking-effort level last used in a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    Off,
    Low,
    Medium,
    High,
}

/// User-visible activity payload attached to a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub emoji: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Per-workspace record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionMetadata {
    /// Last interaction, ms since the epoch.
    #[serde(default)]
    pub recency: u64,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub last_model: Option<String>,
    #[serde(default)]
    pub last_thinking_level: Option<ThinkingLevel>,
    #[serde(default)]
    pub agent_status: Option<AgentStatus>,
    /// Most recent status URL; survives status clears so a later status
    /// without a URL inherits it.
    #[serde(default)]
    pub last_status_url: Option<String>,
    /// Fields written by newer builds, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The whole state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataFile {
    pub version: u32,
    #[serde(default)]
    pub workspaces: HashMap<WorkspaceId, ExtensionMetadata>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for MetadataFile {
    fn default() -> Self {
        Self {
            version: METADATA_SCHEMA_VERSION,
            workspaces: HashMap::new(),
            extra: serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
#[path = "metadata_tests.rs"]
mod tests;

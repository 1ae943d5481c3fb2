// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mux-store: the extension-metadata store.
//!
//! A small file-backed state file consumed by the IDE integration: per
//! workspace, the last interaction time, whether a stream is live, the last
//! model and thinking level, and the current agent status. Mutations are
//! globally serialized; reads never block on writers.

pub mod metadata;
pub mod service;

pub use metadata::{
    AgentStatus, ExtensionMetadata, MetadataFile, ThinkingLevel, METADATA_SCHEMA_VERSION,
};
pub use service::{ExtensionMetadataService, StoreError, WorkspaceSnapshot};

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! mux-signing: SSH-key-backed message signing for shared artifacts.
//!
//! A signature envelope carries the signing key's public half, the SSH
//! wire-format signature, and (best effort) the user's GitHub login. Keys
//! come from an explicit mux key, the SSH agent, or the default disk keys,
//! in that order; encrypted disk keys are only ever reported, never used.

pub mod agent;
pub mod keys;
pub mod service;
#[cfg(test)]
mod test_fixtures;
mod wire;

pub use agent::{pick_identity, AgentIdentity, IdentityOverride, SshAgentClient};
pub use keys::{normalize_public_key, scan_disk_keys, KeyScan, LoadedKey, DEFAULT_KEY_FILES};
pub use service::{SignatureEnvelope, SigningCapabilities, SigningConfig, SigningError, SigningService};

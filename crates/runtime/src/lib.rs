// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mux-runtime: one execution-and-filesystem interface over heterogeneous
//! backends.
//!
//! Upper layers hold a [`Runtime`] handle from the [`factory`] and never know
//! whether they are talking to the local host, a git worktree, an SSH remote,
//! or a Docker container. The shared [`engine`] composes commands, bridges
//! stdio, and classifies exits; each backend contributes only a spawn
//! primitive and a handful of hooks.

pub mod docker;
pub mod engine;
pub mod exec;
pub mod factory;
pub mod fileio;
pub mod lifecycle;
pub mod local;
pub mod remote;
pub mod runtime;
pub mod ssh;
pub mod worktree;

pub use engine::{compose_command, ProcessExit, RemoteEngine, RemoteSpawner, SpawnedProcess};
pub use exec::{ExecExit, ExecOptions, ExecOutcome, ExecStream, OutcomeHandle, StdinHandle};
pub use factory::create_runtime;
pub use fileio::{FileReader, FileStat, FileWrite, FileWriter};
pub use lifecycle::{
    CreateResult, DeleteResult, ForkResult, InitLogger, InitResult, NullInitLogger, RenameResult,
};
pub use runtime::Runtime;

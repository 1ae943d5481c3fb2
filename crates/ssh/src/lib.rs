// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mux-ssh: SSH transport for the mux runtime.
//!
//! Drives the system `ssh` binary with `ControlMaster` multiplexing: the
//! [`pool`] keeps one health-tracked master per semantic target, [`process`]
//! opens exec channels over it, [`pty`] hosts interactive sessions in a
//! local PTY, and [`coder`] maintains the managed-cloud block in
//! `~/.ssh/config`.

pub mod coder;
pub mod pool;
pub mod process;
pub mod pty;

pub use coder::{render_coder_block, write_coder_block, CODER_BLOCK_END, CODER_BLOCK_START};
pub use pool::{
    AcquireOptions, Connection, ConnectionPool, Dialer, Liveness, PoolTuning, SystemSshDialer,
};
pub use process::{is_connection_failure, spawn_remote_process, RemoteChild, RemoteExit, SpawnOptions};
pub use pty::{PtyEvents, PtySession, PtySessionConfig};

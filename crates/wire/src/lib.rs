// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mux-wire: stdio transport for tool servers.
//!
//! Wire format: newline-delimited JSON-RPC over a child's stdin/stdout.

mod bridge;
mod codec;
mod message;

pub use bridge::{BridgeEvent, StdioBridge};
pub use codec::{decode_line, encode_line, ProtocolError};
pub use message::{RpcError, RpcMessage};

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sb-agent: the agentic execution loop.
//!
//! Drives one user turn end to end: assembles a prompt from the repository,
//! streams the model, parses edit/command blocks, applies them to the
//! sandbox through the host gateway, feeds command output back to the model,
//! and finalizes a durable, diff-bearing record of the turn.

mod blocks;
mod cli;
mod context;
mod error;
mod guard;
mod model;
mod stream;
mod truncate;
mod turn;

pub use blocks::{parse_blocks, Block, SearchReplace};
pub use blocks::{apply_edits, ApplyOutcome};
pub use cli::{CliAgentDriver, CliEvent, JsonlCursor};
pub use context::{ContextBuilder, ContextFile, DEFAULT_SKIP_PATTERNS};
pub use error::AgentLoopError;
pub use guard::{denied_reason, REFUSAL};
pub use model::{ChunkStream, ModelClient, ModelError, ModelMessage, ModelRequest};
pub use model::HttpModelClient;
pub use stream::{Accumulator, StreamEnd, STOP_CHECK_INTERVAL};
pub use truncate::truncate_middle;
pub use turn::{AgentLoop, TurnOutcome};

#[cfg(any(test, feature = "test-support"))]
pub use model::FakeModel;

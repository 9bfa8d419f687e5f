// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::model::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentLoopError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("a turn is already running for session {0}")]
    TurnInProgress(String),

    #[error("no usable sandbox for session {0}")]
    NoSandbox(String),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("host error: {0}")]
    Host(#[from] sb_host::HostError),

    #[error("source host error: {0}")]
    SourceHost(#[from] sb_githost::SourceHostError),

    #[error("storage error: {0}")]
    Store(#[from] sb_storage::StoreError),
}

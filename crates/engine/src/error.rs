// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::machine::TransitionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("storage error: {0}")]
    Store(#[from] sb_storage::StoreError),

    #[error("host error: {0}")]
    Host(#[from] sb_host::HostError),

    #[error("source host error: {0}")]
    SourceHost(#[from] sb_githost::SourceHostError),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("sandbox not found: {0}")]
    SandboxNotFound(String),
}

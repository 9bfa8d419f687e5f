// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceHostError {
    #[error("source host network error: {0}")]
    Network(String),

    #[error("source host resource not found: {0}")]
    NotFound(String),

    /// Token invalid or refresh failed; the stored credential has been
    /// revoked and the user must reconnect their account.
    #[error("source host credential rejected, reconnect required")]
    ReconnectRequired,

    #[error("source host API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl SourceHostError {
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => SourceHostError::ReconnectRequired,
            404 => SourceHostError::NotFound(sb_core::short(body, 200).to_string()),
            _ => SourceHostError::Api {
                status,
                message: sb_core::short(body, 200).to_string(),
            },
        }
    }
}

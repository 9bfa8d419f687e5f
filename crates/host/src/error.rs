// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host failure taxonomy surfaced to callers.

use thiserror::Error;

/// Errors from host daemon operations, ordered by how callers recover:
/// transient errors retry with backoff, conflicts self-heal once, not-found
/// on setup falls back to fresh creation, everything else is fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    /// 5xx, connection reset, EOF, DNS, deadline exceeded
    #[error("transient host error: {0}")]
    Transient(String),

    /// 409 name collision on create; carries the stale sandbox's id when the
    /// host reported one
    #[error("sandbox name in use (stale id: {stale_id})")]
    Conflict { stale_id: String },

    /// 404: the host lost the resource (e.g. a reaped pool sandbox)
    #[error("host resource not found: {0}")]
    NotFound(String),

    /// Other 4xx or exhausted retries
    #[error("fatal host error: {0}")]
    Fatal(String),
}

impl HostError {
    pub fn is_transient(&self) -> bool {
        matches!(self, HostError::Transient(_))
    }

    /// Classify an HTTP response the backend could not use.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            409 => HostError::Conflict { stale_id: parse_stale_id(body) },
            404 => HostError::NotFound(truncated(body)),
            500..=599 => HostError::Transient(format!("status {status}: {}", truncated(body))),
            _ => HostError::Fatal(format!("status {status}: {}", truncated(body))),
        }
    }
}

/// Extract the stale sandbox id from a 409 body.
///
/// The host reports either `{"error": "...", "staleId": "..."}` or a plain
/// `name in use: <id>` message; an empty id means the caller cannot self-heal.
fn parse_stale_id(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(id) = value.get("staleId").and_then(|v| v.as_str()) {
            return id.to_string();
        }
    }
    body.rsplit(':').next().map(|s| s.trim()).filter(|s| !s.is_empty() && !s.contains(' '))
        .unwrap_or("")
        .to_string()
}

fn truncated(body: &str) -> String {
    sb_core::short(body, 200).to_string()
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cached repository images and memory checkpoints.
//!
//! Both are discovered, not created, by the orchestrator: the host daemon
//! populates them and reports back via status callbacks. They are hints — the
//! control plane tolerates their absence or invalidation.

use serde::{Deserialize, Serialize};

/// Build status of a cached artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    Ready,
    Failed,
}

crate::label_enum! {
    ImageStatus {
        Ready: "ready",
        Failed: "failed",
    }
}

/// An immutable host image with the repo pre-cloned and dependencies installed.
/// Keyed by `(repo_id, branch)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoImage {
    pub repo_id: String,
    pub branch: String,
    pub tag: String,
    pub size_bytes: u64,
    pub commit_sha: String,
    pub status: ImageStatus,
    #[serde(default)]
    pub use_count: u64,
    pub last_used_at_ms: u64,
}

impl RepoImage {
    /// Map key shared with the checkpoints table.
    pub fn key(repo_id: &str, branch: &str) -> String {
        format!("{repo_id}#{branch}")
    }

    /// Hot: used within the given window (drives per-repo pool targets).
    pub fn is_hot(&self, now_ms: u64, window_ms: u64) -> bool {
        self.status == ImageStatus::Ready && now_ms.saturating_sub(self.last_used_at_ms) <= window_ms
    }
}

/// A memory snapshot enabling restore-based cold starts.
/// Optional faster path; treated purely as a hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub repo_id: String,
    pub branch: String,
    pub name: String,
    pub size_bytes: u64,
    pub commit_sha: String,
    #[serde(default)]
    pub use_count: u64,
    pub last_used_at_ms: u64,
}

#[cfg(test)]
#[path = "image_tests.rs"]
mod tests;

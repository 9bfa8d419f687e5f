// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types for the Sandbar control plane.
//!
//! Events are facts about what happened; the materialized state is derived
//! from them during WAL replay. Every state-store mutation commits one or
//! more events.

use serde::{Deserialize, Serialize};

use crate::image::ImageStatus;
use crate::pool::{PoolKind, PoolStatus};
use crate::sandbox::{Placement, SandboxId, SandboxStatus};
use crate::session::{FileChange, MessageRole};
use crate::{MessageId, PoolEntryId, SessionId};

/// Events that drive the state store.
///
/// Serializes with `{"type": "event:name", ...fields}` format.
/// Unknown type tags deserialize to `Custom`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- sandbox --
    #[serde(rename = "sandbox:requested")]
    SandboxRequested {
        id: SandboxId,
        name: String,
        session_id: SessionId,
        repo_id: String,
        #[serde(default)]
        team_id: String,
        #[serde(default)]
        owner_id: String,
        api_secret: String,
        target_branch: String,
        at_ms: u64,
    },

    /// Atomic pool assignment: marks the entry assigned AND inserts the new
    /// sandbox record in `cloning` with the entry's placement copied in.
    /// One event so a crash can never separate the two writes.
    #[serde(rename = "sandbox:assigned_from_pool")]
    SandboxAssignedFromPool {
        pool_entry_id: PoolEntryId,
        id: SandboxId,
        name: String,
        session_id: SessionId,
        repo_id: String,
        #[serde(default)]
        team_id: String,
        #[serde(default)]
        owner_id: String,
        api_secret: String,
        target_branch: String,
        placement: Placement,
        at_ms: u64,
    },

    #[serde(rename = "sandbox:transitioned")]
    SandboxTransitioned {
        id: SandboxId,
        status: SandboxStatus,
        /// Short snake_case originator tag
        reason: String,
        at_ms: u64,
    },

    #[serde(rename = "sandbox:placed")]
    SandboxPlaced { id: SandboxId, placement: Placement },

    #[serde(rename = "sandbox:branch_fell_back")]
    SandboxBranchFellBack {
        id: SandboxId,
        effective_branch: String,
        at_ms: u64,
    },

    #[serde(rename = "sandbox:retry_recorded")]
    SandboxRetryRecorded { id: SandboxId, retry_count: u32 },

    #[serde(rename = "sandbox:error_recorded")]
    SandboxErrorRecorded { id: SandboxId, error: String },

    #[serde(rename = "sandbox:heartbeat")]
    SandboxHeartbeat { id: SandboxId, at_ms: u64 },

    #[serde(rename = "sandbox:commit_recorded")]
    SandboxCommitRecorded { id: SandboxId, commit_sha: String },

    /// Tombstone removal by cleanup-old
    #[serde(rename = "sandbox:deleted")]
    SandboxDeleted { id: SandboxId },

    // -- pool --
    #[serde(rename = "pool:entry_created")]
    PoolEntryCreated {
        id: PoolEntryId,
        name: String,
        #[serde(flatten)]
        kind: PoolKind,
        at_ms: u64,
    },

    #[serde(rename = "pool:entry_placed")]
    PoolEntryPlaced { id: PoolEntryId, placement: Placement },

    #[serde(rename = "pool:entry_status_changed")]
    PoolEntryStatusChanged {
        id: PoolEntryId,
        status: PoolStatus,
        at_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    #[serde(rename = "pool:entry_deleted")]
    PoolEntryDeleted { id: PoolEntryId },

    // -- image / checkpoint --
    #[serde(rename = "image:discovered")]
    RepoImageDiscovered {
        repo_id: String,
        branch: String,
        tag: String,
        size_bytes: u64,
        commit_sha: String,
        status: ImageStatus,
        at_ms: u64,
    },

    #[serde(rename = "image:used")]
    RepoImageUsed {
        repo_id: String,
        branch: String,
        at_ms: u64,
    },

    #[serde(rename = "checkpoint:discovered")]
    CheckpointDiscovered {
        repo_id: String,
        branch: String,
        name: String,
        size_bytes: u64,
        commit_sha: String,
        at_ms: u64,
    },

    // -- session --
    #[serde(rename = "session:created")]
    SessionCreated {
        id: SessionId,
        repo_id: String,
        branch: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        work_branch: Option<String>,
        at_ms: u64,
    },

    #[serde(rename = "session:sandbox_attached")]
    SessionSandboxAttached { id: SessionId, sandbox_id: SandboxId },

    #[serde(rename = "session:stop_requested")]
    SessionStopRequested { id: SessionId, stop: bool },

    // -- message --
    #[serde(rename = "message:created")]
    MessageCreated {
        id: MessageId,
        session_id: SessionId,
        role: MessageRole,
        content: String,
        at_ms: u64,
    },

    /// Streaming excerpt flush; replaces the message content in place
    #[serde(rename = "message:streamed")]
    MessageStreamed { id: MessageId, content: String },

    #[serde(rename = "message:finalized")]
    MessageFinalized {
        id: MessageId,
        content: String,
        committed: bool,
        at_ms: u64,
    },

    // -- agent records --
    #[serde(rename = "file_changes:recorded")]
    FileChangesRecorded {
        message_id: MessageId,
        session_id: SessionId,
        changes: Vec<FileChange>,
        at_ms: u64,
    },

    #[serde(rename = "bash:recorded")]
    BashCommandRecorded {
        message_id: MessageId,
        session_id: SessionId,
        command: String,
        exit_code: i32,
        output: String,
        #[serde(default)]
        blocked: bool,
        at_ms: u64,
    },

    /// Catch-all for unknown event types (extensibility)
    #[serde(other, skip_serializing)]
    Custom,
}

impl Event {
    /// One-line summary for log spans.
    pub fn log_summary(&self) -> String {
        match self {
            Event::SandboxRequested { id, repo_id, .. } => {
                format!("sandbox:requested {id} repo={repo_id}")
            }
            Event::SandboxAssignedFromPool { id, pool_entry_id, .. } => {
                format!("sandbox:assigned_from_pool {id} entry={pool_entry_id}")
            }
            Event::SandboxTransitioned { id, status, reason, .. } => {
                format!("sandbox:transitioned {id} -> {status} ({reason})")
            }
            Event::SandboxPlaced { id, placement } => {
                format!("sandbox:placed {id} host={}", placement.host_id)
            }
            Event::SandboxBranchFellBack { id, effective_branch, .. } => {
                format!("sandbox:branch_fell_back {id} -> {effective_branch}")
            }
            Event::SandboxRetryRecorded { id, retry_count } => {
                format!("sandbox:retry_recorded {id} n={retry_count}")
            }
            Event::SandboxErrorRecorded { id, .. } => format!("sandbox:error_recorded {id}"),
            Event::SandboxHeartbeat { id, .. } => format!("sandbox:heartbeat {id}"),
            Event::SandboxCommitRecorded { id, .. } => format!("sandbox:commit_recorded {id}"),
            Event::SandboxDeleted { id } => format!("sandbox:deleted {id}"),
            Event::PoolEntryCreated { id, kind, .. } => {
                format!("pool:entry_created {id} kind={kind}")
            }
            Event::PoolEntryPlaced { id, placement } => {
                format!("pool:entry_placed {id} host={}", placement.host_id)
            }
            Event::PoolEntryStatusChanged { id, status, .. } => {
                format!("pool:entry_status_changed {id} -> {status}")
            }
            Event::PoolEntryDeleted { id } => format!("pool:entry_deleted {id}"),
            Event::RepoImageDiscovered { repo_id, branch, tag, .. } => {
                format!("image:discovered {repo_id}#{branch} tag={tag}")
            }
            Event::RepoImageUsed { repo_id, branch, .. } => {
                format!("image:used {repo_id}#{branch}")
            }
            Event::CheckpointDiscovered { repo_id, branch, name, .. } => {
                format!("checkpoint:discovered {repo_id}#{branch} name={name}")
            }
            Event::SessionCreated { id, repo_id, .. } => {
                format!("session:created {id} repo={repo_id}")
            }
            Event::SessionSandboxAttached { id, sandbox_id } => {
                format!("session:sandbox_attached {id} sandbox={sandbox_id}")
            }
            Event::SessionStopRequested { id, stop } => {
                format!("session:stop_requested {id} stop={stop}")
            }
            Event::MessageCreated { id, session_id, role, .. } => {
                format!("message:created {id} session={session_id} role={role}")
            }
            Event::MessageStreamed { id, content } => {
                format!("message:streamed {id} len={}", content.len())
            }
            Event::MessageFinalized { id, committed, .. } => {
                format!("message:finalized {id} committed={committed}")
            }
            Event::FileChangesRecorded { message_id, changes, .. } => {
                format!("file_changes:recorded {message_id} n={}", changes.len())
            }
            Event::BashCommandRecorded { message_id, exit_code, blocked, .. } => {
                format!("bash:recorded {message_id} exit={exit_code} blocked={blocked}")
            }
            Event::Custom => "custom".to_string(),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Editing sessions, chat messages, and the durable records the agent loop
//! writes for audit and replay.

use serde::{Deserialize, Serialize};

use crate::{MessageId, SandboxId, SessionId};

/// One editing session: a user working on one repo/branch pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub repo_id: String,
    /// Branch the user asked for
    pub branch: String,
    /// Branch the agent commits to, when configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_id: Option<SandboxId>,
    /// Set by the user to cancel the in-flight agent turn
    #[serde(default)]
    pub stop_requested: bool,
    pub created_at_ms: u64,
}

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

crate::label_enum! {
    MessageRole {
        User: "user",
        Assistant: "assistant",
    }
}

/// Delivery status of an assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Streaming,
    Complete,
}

crate::label_enum! {
    MessageStatus {
        Streaming: "streaming",
        Complete: "complete",
    }
}

/// A chat message. Assistant messages are updated in place while streaming
/// and finalized exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub session_id: SessionId,
    pub role: MessageRole,
    pub content: String,
    pub status: MessageStatus,
    /// True when finalization committed the turn's changes upstream
    #[serde(default)]
    pub committed: bool,
    pub created_at_ms: u64,
}

/// A single file change produced by an agent turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub content: String,
    /// Content before the turn's first edit to this path, for diff display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
}

/// All file changes for one finalized turn, deduplicated per path
/// (last write wins).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChangeSet {
    pub message_id: MessageId,
    pub session_id: SessionId,
    pub changes: Vec<FileChange>,
    pub recorded_at_ms: u64,
}

/// Durable record of one shell command the agent ran (or was refused).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BashCommandRecord {
    pub message_id: MessageId,
    pub session_id: SessionId,
    pub command: String,
    pub exit_code: i32,
    /// Bounded, center-elided output
    pub output: String,
    /// True when the deny-list refused execution
    #[serde(default)]
    pub blocked: bool,
    pub ran_at_ms: u64,
}

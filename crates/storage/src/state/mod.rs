// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state from WAL replay

mod images;
mod index;
mod pool;
mod sandboxes;
mod sessions;

use index::StatusIndex;
use sb_core::pool::PoolStatus;
use sb_core::sandbox::{SandboxId, SandboxStatus};
use sb_core::{
    BashCommandRecord, Checkpoint, Event, FileChangeSet, Message, MessageId, PoolEntry,
    PoolEntryId, RepoImage, SandboxRecord, Session, SessionId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Materialized state built from WAL operations.
///
/// # Idempotency Requirement
///
/// **All event handlers MUST be idempotent.** Applying the same event twice
/// must produce the same state as applying it once — recovery may re-apply a
/// tail of the WAL whose effects are already present in a snapshot taken
/// between flush and crash. Guidelines:
///
/// - Use assignment (`=`) instead of mutation (`+=`, `-=`)
/// - Guard inserts with existence checks (`if !map.contains_key(...)`)
/// - Route status changes through `SandboxRecord::transition`, which
///   collapses duplicates by phase equality
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub sandboxes: HashMap<SandboxId, SandboxRecord>,
    pub pool: HashMap<PoolEntryId, PoolEntry>,
    /// Keyed by `RepoImage::key(repo_id, branch)`
    #[serde(default)]
    pub repo_images: HashMap<String, RepoImage>,
    #[serde(default)]
    pub checkpoints: HashMap<String, Checkpoint>,
    #[serde(default)]
    pub sessions: HashMap<SessionId, Session>,
    #[serde(default)]
    pub messages: HashMap<MessageId, Message>,
    #[serde(default)]
    pub file_changes: HashMap<MessageId, FileChangeSet>,
    #[serde(default)]
    pub bash_commands: HashMap<MessageId, Vec<BashCommandRecord>>,
    /// `(status, status_changed_at)` range index over sandboxes.
    /// Not persisted — rebuilt from the tables on load.
    #[serde(skip)]
    pub(crate) status_index: StatusIndex,
    /// Callback lookup: sandbox name → id. Not persisted.
    #[serde(skip)]
    pub(crate) name_index: HashMap<String, SandboxId>,
}

impl MaterializedState {
    /// Apply an event to derive state changes.
    ///
    /// Events are facts about what happened; state is derived from those
    /// facts. Validation (successor sets, phase ordering, secrets) happens in
    /// the engine before an event is committed — replay applies blindly so
    /// recovery reproduces exactly what was accepted.
    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::SandboxRequested { .. }
            | Event::SandboxAssignedFromPool { .. }
            | Event::SandboxTransitioned { .. }
            | Event::SandboxPlaced { .. }
            | Event::SandboxBranchFellBack { .. }
            | Event::SandboxRetryRecorded { .. }
            | Event::SandboxErrorRecorded { .. }
            | Event::SandboxHeartbeat { .. }
            | Event::SandboxCommitRecorded { .. }
            | Event::SandboxDeleted { .. } => sandboxes::apply(self, event),

            Event::PoolEntryCreated { .. }
            | Event::PoolEntryPlaced { .. }
            | Event::PoolEntryStatusChanged { .. }
            | Event::PoolEntryDeleted { .. } => pool::apply(self, event),

            Event::RepoImageDiscovered { .. }
            | Event::RepoImageUsed { .. }
            | Event::CheckpointDiscovered { .. } => images::apply(self, event),

            Event::SessionCreated { .. }
            | Event::SessionSandboxAttached { .. }
            | Event::SessionStopRequested { .. }
            | Event::MessageCreated { .. }
            | Event::MessageStreamed { .. }
            | Event::MessageFinalized { .. }
            | Event::FileChangesRecorded { .. }
            | Event::BashCommandRecorded { .. } => sessions::apply(self, event),

            Event::Custom => {}
        }
    }

    /// Rebuild the runtime indexes after deserialization.
    pub fn rebuild_indexes(&mut self) {
        self.status_index = StatusIndex::default();
        self.name_index = HashMap::new();
        for record in self.sandboxes.values() {
            self.status_index.insert(record.status, record.status_changed_at_ms, record.id);
            self.name_index.insert(record.name.clone(), record.id);
        }
    }

    // ── sandbox access paths ────────────────────────────────────────────

    /// Sandboxes in `status`, oldest status change first, at most `limit`.
    pub fn sandboxes_in_status(&self, status: SandboxStatus, limit: usize) -> Vec<&SandboxRecord> {
        self.status_index
            .scan(status, limit)
            .into_iter()
            .filter_map(|id| self.sandboxes.get(&id))
            .collect()
    }

    /// Sandboxes in `status` whose `status_changed_at_ms` is strictly older
    /// than `cutoff_ms`, oldest first, at most `limit`.
    pub fn sandboxes_in_status_older_than(
        &self,
        status: SandboxStatus,
        cutoff_ms: u64,
        limit: usize,
    ) -> Vec<&SandboxRecord> {
        self.status_index
            .scan_older_than(status, cutoff_ms, limit)
            .into_iter()
            .filter_map(|id| self.sandboxes.get(&id))
            .collect()
    }

    pub fn sandbox_by_name(&self, name: &str) -> Option<&SandboxRecord> {
        self.name_index.get(name).and_then(|id| self.sandboxes.get(id))
    }

    /// The session's non-terminal sandbox, if one exists. At most one such
    /// record exists at any commit boundary.
    pub fn active_sandbox_for_session(&self, session_id: &SessionId) -> Option<&SandboxRecord> {
        self.sandboxes
            .values()
            .find(|r| r.session_id == *session_id && !r.status.is_terminal())
    }

    pub fn sandboxes_for_repo_branch(&self, repo_id: &str, branch: &str) -> Vec<&SandboxRecord> {
        self.sandboxes
            .values()
            .filter(|r| r.repo_id == repo_id && r.effective_branch == branch)
            .collect()
    }

    // ── pool access paths ───────────────────────────────────────────────

    pub fn pool_in_status(&self, status: PoolStatus) -> Vec<&PoolEntry> {
        let mut entries: Vec<&PoolEntry> =
            self.pool.values().filter(|e| e.status == status).collect();
        entries.sort_by_key(|e| (e.created_at_ms, e.id));
        entries
    }

    /// Ready repo-affine entry for `repo_id`, if any.
    pub fn pool_ready_for_repo(&self, repo_id: &str) -> Option<&PoolEntry> {
        self.pool
            .values()
            .filter(|e| e.status == PoolStatus::Ready && e.kind.repo_id() == Some(repo_id))
            .min_by_key(|e| e.created_at_ms)
    }

    /// Oldest ready generic entry (FIFO pick).
    pub fn pool_oldest_ready_generic(&self) -> Option<&PoolEntry> {
        self.pool
            .values()
            .filter(|e| e.status == PoolStatus::Ready && e.kind.repo_id().is_none())
            .min_by_key(|e| (e.created_at_ms, e.id))
    }

    /// `ready + creating` for the generic pool or one repo's pool.
    pub fn pool_fill(&self, repo_id: Option<&str>) -> usize {
        self.pool
            .values()
            .filter(|e| e.is_pending_or_ready() && e.kind.repo_id() == repo_id)
            .count()
    }

    /// Total `creating` across both pools (shared creation budget).
    pub fn pool_creating_total(&self) -> usize {
        self.pool.values().filter(|e| e.status == PoolStatus::Creating).count()
    }

    // ── image access paths ──────────────────────────────────────────────

    /// Ready images used within the hot window, most recently used first.
    pub fn hot_repo_images(&self, now_ms: u64, window_ms: u64) -> Vec<&RepoImage> {
        let mut hot: Vec<&RepoImage> =
            self.repo_images.values().filter(|i| i.is_hot(now_ms, window_ms)).collect();
        hot.sort_by(|a, b| b.last_used_at_ms.cmp(&a.last_used_at_ms));
        hot
    }

    // ── session access paths ────────────────────────────────────────────

    /// The most recent `limit` messages of a session, oldest first.
    pub fn recent_messages(&self, session_id: &SessionId, limit: usize) -> Vec<&Message> {
        let mut messages: Vec<&Message> =
            self.messages.values().filter(|m| m.session_id == *session_id).collect();
        messages.sort_by_key(|m| (m.created_at_ms, m.id));
        if messages.len() > limit {
            messages.drain(..messages.len() - limit);
        }
        messages
    }

    // ── index maintenance (used by apply modules) ───────────────────────

    pub(crate) fn index_insert(&mut self, record: &SandboxRecord) {
        self.status_index.insert(record.status, record.status_changed_at_ms, record.id);
        self.name_index.insert(record.name.clone(), record.id);
    }

    pub(crate) fn index_remove(&mut self, record: &SandboxRecord) {
        self.status_index.remove(record.status, record.status_changed_at_ms, record.id);
        self.name_index.remove(&record.name);
    }
}

#[cfg(test)]
#[path = "../state_tests/mod.rs"]
mod tests;

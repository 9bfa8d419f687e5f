// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sandbox record event handlers.

use sb_core::pool::PoolStatus;
use sb_core::sandbox::{SandboxConfig, SandboxRecord, SandboxStatus};
use sb_core::Event;

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::SandboxRequested {
            id,
            name,
            session_id,
            repo_id,
            team_id,
            owner_id,
            api_secret,
            target_branch,
            at_ms,
        } => {
            // Guard: re-applying the event must not reset an advanced record.
            if state.sandboxes.contains_key(id) {
                return;
            }
            let config = SandboxConfig::builder(*id, *session_id, repo_id.clone())
                .name(name.clone())
                .team_id(team_id.clone())
                .owner_id(owner_id.clone())
                .api_secret(api_secret.clone())
                .target_branch(target_branch.clone())
                .build();
            let record = SandboxRecord::new(config, *at_ms);
            state.index_insert(&record);
            state.sandboxes.insert(*id, record);
        }

        Event::SandboxAssignedFromPool {
            pool_entry_id,
            id,
            name,
            session_id,
            repo_id,
            team_id,
            owner_id,
            api_secret,
            target_branch,
            placement,
            at_ms,
        } => {
            // One event, two writes: the pool entry flips to assigned and the
            // sandbox record appears in cloning with the placement copied in.
            if let Some(entry) = state.pool.get_mut(pool_entry_id) {
                if entry.status != PoolStatus::Assigned {
                    entry.status = PoolStatus::Assigned;
                    entry.assigned_at_ms = Some(*at_ms);
                }
            }
            if state.sandboxes.contains_key(id) {
                return;
            }
            let config = SandboxConfig::builder(*id, *session_id, repo_id.clone())
                .name(name.clone())
                .team_id(team_id.clone())
                .owner_id(owner_id.clone())
                .api_secret(api_secret.clone())
                .target_branch(target_branch.clone())
                .build();
            let mut record = SandboxRecord::with_initial_status(
                config,
                SandboxStatus::Cloning,
                "pool_assignment",
                *at_ms,
            );
            record.placement = placement.clone();
            state.index_insert(&record);
            state.sandboxes.insert(*id, record);
        }

        Event::SandboxTransitioned { id, status, reason, at_ms } => {
            let Some(record) = state.sandboxes.get_mut(id) else {
                return;
            };
            let old = (record.status, record.status_changed_at_ms);
            record.transition(*status, reason, *at_ms);
            if old.0 != record.status {
                let id = record.id;
                let new = (record.status, record.status_changed_at_ms);
                state.status_index.remove(old.0, old.1, id);
                state.status_index.insert(new.0, new.1, id);
            }
        }

        Event::SandboxPlaced { id, placement } => {
            if let Some(record) = state.sandboxes.get_mut(id) {
                record.placement = placement.clone();
            }
        }

        Event::SandboxBranchFellBack { id, effective_branch, at_ms } => {
            if let Some(record) = state.sandboxes.get_mut(id) {
                if !record.branch_fell_back {
                    record.effective_branch = effective_branch.clone();
                    record.branch_fell_back = true;
                    record.annotate(
                        &format!("branch_fallback:{}", record.target_branch),
                        *at_ms,
                    );
                }
            }
        }

        Event::SandboxRetryRecorded { id, retry_count } => {
            if let Some(record) = state.sandboxes.get_mut(id) {
                record.retry_count = *retry_count;
            }
        }

        Event::SandboxErrorRecorded { id, error } => {
            if let Some(record) = state.sandboxes.get_mut(id) {
                record.last_error = Some(error.clone());
            }
        }

        Event::SandboxHeartbeat { id, at_ms } => {
            if let Some(record) = state.sandboxes.get_mut(id) {
                record.record_heartbeat(*at_ms);
            }
        }

        Event::SandboxCommitRecorded { id, commit_sha } => {
            if let Some(record) = state.sandboxes.get_mut(id) {
                record.commit_sha = Some(commit_sha.clone());
            }
        }

        Event::SandboxDeleted { id } => {
            if let Some(record) = state.sandboxes.remove(id) {
                state.index_remove(&record);
            }
        }

        _ => {}
    }
}

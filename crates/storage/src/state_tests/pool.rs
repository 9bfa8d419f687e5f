// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::state::MaterializedState;
use sb_core::pool::{PoolKind, PoolStatus};
use sb_core::sandbox::{Placement, SandboxStatus};
use sb_core::test_support::*;
use sb_core::{Event, PoolEntryId, SandboxId, SessionId};

fn placed(state: &mut MaterializedState, id: &str, at_ms: u64) {
    state.apply_event(&Event::PoolEntryCreated {
        id: PoolEntryId::from_string(id),
        name: format!("pool-{id}"),
        kind: PoolKind::Generic,
        at_ms,
    });
    state.apply_event(&Event::PoolEntryPlaced {
        id: PoolEntryId::from_string(id),
        placement: Placement { host_id: format!("host-{id}"), host_port: 4000, ..Placement::default() },
    });
    state.apply_event(&Event::PoolEntryStatusChanged {
        id: PoolEntryId::from_string(id),
        status: PoolStatus::Ready,
        at_ms,
        error: None,
    });
}

#[test]
fn created_entry_starts_creating() {
    let mut state = MaterializedState::default();
    state.apply_event(&pool_entry_created_event("pool-1", PoolKind::Generic));
    assert_eq!(state.pool.get("pool-1").unwrap().status, PoolStatus::Creating);
    assert_eq!(state.pool_creating_total(), 1);
}

#[test]
fn fifo_pick_prefers_oldest_ready_generic() {
    let mut state = MaterializedState::default();
    placed(&mut state, "b", 2_000);
    placed(&mut state, "a", 1_000);

    let oldest = state.pool_oldest_ready_generic().unwrap();
    assert_eq!(oldest.id.as_str(), "a");
}

#[test]
fn repo_affine_lookup() {
    let mut state = MaterializedState::default();
    state.apply_event(&Event::PoolEntryCreated {
        id: PoolEntryId::from_string("pool-r"),
        name: "pool-r".to_string(),
        kind: PoolKind::RepoAffine {
            repo_id: "acme/widgets".to_string(),
            image_tag: "img-1".to_string(),
            volume_name: "deps-1".to_string(),
        },
        at_ms: 1_000,
    });
    state.apply_event(&Event::PoolEntryStatusChanged {
        id: PoolEntryId::from_string("pool-r"),
        status: PoolStatus::Ready,
        at_ms: 1_000,
        error: None,
    });

    assert!(state.pool_ready_for_repo("acme/widgets").is_some());
    assert!(state.pool_ready_for_repo("other/repo").is_none());
    // Repo-affine entries never satisfy the generic FIFO pick
    assert!(state.pool_oldest_ready_generic().is_none());
}

#[test]
fn fill_counts_ready_plus_creating_per_pool() {
    let mut state = MaterializedState::default();
    placed(&mut state, "a", 1_000);
    state.apply_event(&pool_entry_created_event("pool-new", PoolKind::Generic));
    state.apply_event(&Event::PoolEntryCreated {
        id: PoolEntryId::from_string("pool-r"),
        name: "pool-r".to_string(),
        kind: PoolKind::RepoAffine {
            repo_id: "acme/widgets".to_string(),
            image_tag: "img-1".to_string(),
            volume_name: "deps-1".to_string(),
        },
        at_ms: 1_000,
    });

    assert_eq!(state.pool_fill(None), 2);
    assert_eq!(state.pool_fill(Some("acme/widgets")), 1);
    assert_eq!(state.pool_creating_total(), 2);
}

#[test]
fn assignment_event_flips_entry_and_inserts_sandbox_atomically() {
    let mut state = MaterializedState::default();
    placed(&mut state, "a", 1_000);

    let placement = state.pool.get("a").unwrap().placement.clone();
    state.apply_event(&Event::SandboxAssignedFromPool {
        pool_entry_id: PoolEntryId::from_string("a"),
        id: SandboxId::from_string("sbx-1"),
        name: "sbx-1".to_string(),
        session_id: SessionId::from_string("sess-1"),
        repo_id: "acme/widgets".to_string(),
        team_id: String::new(),
        owner_id: String::new(),
        api_secret: "secret".to_string(),
        target_branch: "main".to_string(),
        placement: placement.clone(),
        at_ms: 5_000,
    });

    let entry = state.pool.get("a").unwrap();
    assert_eq!(entry.status, PoolStatus::Assigned);
    assert_eq!(entry.assigned_at_ms, Some(5_000));

    let record = state.sandboxes.get("sbx-1").unwrap();
    assert_eq!(record.status, SandboxStatus::Cloning);
    assert_eq!(record.placement, placement);
    assert_eq!(record.status_history.len(), 1);
    assert_eq!(record.status_history[0].reason, "pool_assignment");
}

#[test]
fn failed_status_records_error() {
    let mut state = MaterializedState::default();
    state.apply_event(&pool_entry_created_event("pool-1", PoolKind::Generic));
    state.apply_event(&Event::PoolEntryStatusChanged {
        id: PoolEntryId::from_string("pool-1"),
        status: PoolStatus::Failed,
        at_ms: 2_000,
        error: Some("host create failed".to_string()),
    });

    let entry = state.pool.get("pool-1").unwrap();
    assert_eq!(entry.status, PoolStatus::Failed);
    assert_eq!(entry.last_error.as_deref(), Some("host create failed"));
}

#[test]
fn deleted_removes_entry() {
    let mut state = MaterializedState::default();
    state.apply_event(&pool_entry_created_event("pool-1", PoolKind::Generic));
    state.apply_event(&Event::PoolEntryDeleted { id: PoolEntryId::from_string("pool-1") });
    assert!(state.pool.is_empty());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::state::MaterializedState;
use sb_core::sandbox::{Placement, SandboxStatus};
use sb_core::test_support::*;
use sb_core::{Event, SandboxId, SessionId};

fn requested(state: &mut MaterializedState, id: &str) {
    state.apply_event(&sandbox_requested_event(id, "sess-1", "acme/widgets"));
}

#[test]
fn requested_creates_record_with_seeded_history() {
    let mut state = MaterializedState::default();
    requested(&mut state, "sbx-1");

    let record = state.sandboxes.get("sbx-1").unwrap();
    assert_eq!(record.status, SandboxStatus::Requested);
    assert_eq!(record.status_history.len(), 1);
    assert_eq!(record.api_secret, "secret-0000");
}

#[test]
fn requested_twice_does_not_reset() {
    let mut state = MaterializedState::default();
    requested(&mut state, "sbx-1");
    state.apply_event(&sandbox_transitioned_event(
        "sbx-1",
        SandboxStatus::Creating,
        "scheduler_pickup",
    ));
    requested(&mut state, "sbx-1");

    assert_eq!(state.sandboxes.get("sbx-1").unwrap().status, SandboxStatus::Creating);
}

#[test]
fn transition_maintains_status_index() {
    let mut state = MaterializedState::default();
    requested(&mut state, "sbx-1");
    requested(&mut state, "sbx-2");

    state.apply_event(&sandbox_transitioned_event(
        "sbx-1",
        SandboxStatus::Creating,
        "scheduler_pickup",
    ));

    let requested_ids: Vec<String> = state
        .sandboxes_in_status(SandboxStatus::Requested, 10)
        .iter()
        .map(|r| r.id.to_string())
        .collect();
    assert_eq!(requested_ids, vec!["sbx-2".to_string()]);

    let creating = state.sandboxes_in_status(SandboxStatus::Creating, 10);
    assert_eq!(creating.len(), 1);
}

#[test]
fn scan_is_ordered_and_bounded() {
    let mut state = MaterializedState::default();
    for (i, at) in [("sbx-b", 2_000u64), ("sbx-a", 1_000), ("sbx-c", 3_000)] {
        state.apply_event(&Event::SandboxRequested {
            id: SandboxId::from_string(i),
            name: i.to_string(),
            session_id: SessionId::from_string("sess-1"),
            repo_id: "acme/widgets".to_string(),
            team_id: String::new(),
            owner_id: String::new(),
            api_secret: "secret".to_string(),
            target_branch: "main".to_string(),
            at_ms: at,
        });
    }

    let ids: Vec<String> = state
        .sandboxes_in_status(SandboxStatus::Requested, 2)
        .iter()
        .map(|r| r.id.to_string())
        .collect();
    assert_eq!(ids, vec!["sbx-a".to_string(), "sbx-b".to_string()]);

    let older: Vec<String> = state
        .sandboxes_in_status_older_than(SandboxStatus::Requested, 3_000, 10)
        .iter()
        .map(|r| r.id.to_string())
        .collect();
    assert_eq!(older, vec!["sbx-a".to_string(), "sbx-b".to_string()]);
}

#[test]
fn placed_and_error_updates() {
    let mut state = MaterializedState::default();
    requested(&mut state, "sbx-1");

    state.apply_event(&Event::SandboxPlaced {
        id: SandboxId::from_string("sbx-1"),
        placement: Placement {
            host_id: "host-9".to_string(),
            host_port: 4321,
            preview_url: Some("https://p.example/sbx-1".to_string()),
            ..Placement::default()
        },
    });
    state.apply_event(&Event::SandboxErrorRecorded {
        id: SandboxId::from_string("sbx-1"),
        error: "boom".to_string(),
    });
    state.apply_event(&Event::SandboxRetryRecorded {
        id: SandboxId::from_string("sbx-1"),
        retry_count: 2,
    });

    let record = state.sandboxes.get("sbx-1").unwrap();
    assert_eq!(record.placement.host_id, "host-9");
    assert_eq!(record.last_error.as_deref(), Some("boom"));
    assert_eq!(record.retry_count, 2);
}

#[test]
fn branch_fallback_is_applied_once() {
    let mut state = MaterializedState::default();
    requested(&mut state, "sbx-1");

    let event = Event::SandboxBranchFellBack {
        id: SandboxId::from_string("sbx-1"),
        effective_branch: "develop".to_string(),
        at_ms: 1_100_000,
    };
    state.apply_event(&event);
    state.apply_event(&event);

    let record = state.sandboxes.get("sbx-1").unwrap();
    assert!(record.branch_fell_back);
    assert_eq!(record.effective_branch, "develop");
    let fallback_entries = record
        .status_history
        .iter()
        .filter(|e| e.reason.starts_with("branch_fallback:"))
        .count();
    assert_eq!(fallback_entries, 1);
}

#[test]
fn deleted_removes_record_and_index() {
    let mut state = MaterializedState::default();
    requested(&mut state, "sbx-1");

    state.apply_event(&Event::SandboxDeleted { id: SandboxId::from_string("sbx-1") });

    assert!(state.sandboxes.is_empty());
    assert!(state.sandboxes_in_status(SandboxStatus::Requested, 10).is_empty());
    assert!(state.sandbox_by_name("sbx-sbx-1").is_none());
}

#[test]
fn active_sandbox_for_session_ignores_destroyed() {
    let mut state = MaterializedState::default();
    requested(&mut state, "sbx-1");
    for status in [
        SandboxStatus::Creating,
        SandboxStatus::Cloning,
        SandboxStatus::Installing,
        SandboxStatus::Starting,
        SandboxStatus::Ready,
        SandboxStatus::Stopping,
        SandboxStatus::Destroying,
        SandboxStatus::Destroyed,
    ] {
        state.apply_event(&sandbox_transitioned_event("sbx-1", status, "test"));
    }

    let session = SessionId::from_string("sess-1");
    assert!(state.active_sandbox_for_session(&session).is_none());

    requested(&mut state, "sbx-2");
    assert_eq!(
        state.active_sandbox_for_session(&session).map(|r| r.id.to_string()),
        Some("sbx-2".to_string())
    );
}

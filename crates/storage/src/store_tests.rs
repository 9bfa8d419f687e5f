// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sb_core::sandbox::SandboxStatus;
use sb_core::test_support::{sandbox_requested_event, sandbox_transitioned_event};
use tempfile::tempdir;

#[test]
fn commit_then_reopen_recovers_state() {
    let dir = tempdir().unwrap();

    {
        let store = Store::open(dir.path()).unwrap();
        store
            .commit(&[
                sandbox_requested_event("sbx-1", "sess-1", "acme/widgets"),
                sandbox_transitioned_event("sbx-1", SandboxStatus::Creating, "scheduler_pickup"),
            ])
            .unwrap();
    }

    let store = Store::open(dir.path()).unwrap();
    let status = store.read(|s| s.sandboxes.get("sbx-1").map(|r| r.status));
    assert_eq!(status, Some(SandboxStatus::Creating));
}

#[test]
fn commit_batch_is_atomic_in_order() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();

    store
        .commit(&[
            sandbox_requested_event("sbx-1", "sess-1", "acme/widgets"),
            sandbox_transitioned_event("sbx-1", SandboxStatus::Creating, "scheduler_pickup"),
            sandbox_transitioned_event("sbx-1", SandboxStatus::Cloning, "host_callback"),
        ])
        .unwrap();

    let history: Vec<SandboxStatus> = store.read(|s| {
        s.sandboxes.get("sbx-1").map(|r| r.status_history.iter().map(|e| e.status).collect())
    })
    .unwrap();
    assert_eq!(
        history,
        vec![SandboxStatus::Requested, SandboxStatus::Creating, SandboxStatus::Cloning]
    );
}

#[test]
fn snapshot_then_reopen_replays_tail() {
    let dir = tempdir().unwrap();

    {
        let store = Store::open(dir.path()).unwrap();
        store.commit(&[sandbox_requested_event("sbx-1", "sess-1", "acme/widgets")]).unwrap();
        store.snapshot_now().unwrap();
        // Committed after the snapshot — lives only in the WAL tail
        store
            .commit(&[sandbox_transitioned_event(
                "sbx-1",
                SandboxStatus::Creating,
                "scheduler_pickup",
            )])
            .unwrap();
    }

    let store = Store::open(dir.path()).unwrap();
    let record = store.read(|s| s.sandboxes.get("sbx-1").cloned()).unwrap();
    assert_eq!(record.status, SandboxStatus::Creating);
    assert_eq!(record.status_history.len(), 2);
}

#[test]
fn replaying_same_transition_is_idempotent() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();

    let transition =
        sandbox_transitioned_event("sbx-1", SandboxStatus::Creating, "scheduler_pickup");
    store.commit(&[sandbox_requested_event("sbx-1", "sess-1", "acme/widgets")]).unwrap();
    store.commit(&[transition.clone()]).unwrap();
    store.commit(&[transition]).unwrap();

    let history_len = store.read(|s| s.sandboxes.get("sbx-1").map(|r| r.status_history.len()));
    assert_eq!(history_len, Some(2));
}

#[test]
fn empty_commit_is_a_no_op() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    store.commit(&[]).unwrap();
    assert_eq!(store.read(|s| s.sandboxes.len()), 0);
}

#[test]
fn index_survives_reopen() {
    let dir = tempdir().unwrap();
    {
        let store = Store::open(dir.path()).unwrap();
        store.commit(&[sandbox_requested_event("sbx-1", "sess-1", "acme/widgets")]).unwrap();
        store.snapshot_now().unwrap();
    }
    let store = Store::open(dir.path()).unwrap();
    let found = store.read(|s| {
        s.sandboxes_in_status(SandboxStatus::Requested, 10)
            .iter()
            .map(|r| r.id.to_string())
            .collect::<Vec<_>>()
    });
    assert_eq!(found, vec!["sbx-1".to_string()]);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sb_core::test_support::sandbox_requested_event;
use tempfile::tempdir;

fn state_with_one_sandbox() -> MaterializedState {
    let mut state = MaterializedState::default();
    state.apply_event(&sandbox_requested_event("sbx-1", "sess-1", "acme/widgets"));
    state
}

#[test]
fn save_and_load_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.snap.zst");

    let snapshot = Snapshot::new(42, state_with_one_sandbox());
    snapshot.save(&path).unwrap();

    let loaded = load_snapshot(&path).unwrap().unwrap();
    assert_eq!(loaded.version, CURRENT_SNAPSHOT_VERSION);
    assert_eq!(loaded.seq, 42);
    assert!(loaded.state.sandboxes.contains_key("sbx-1"));
    // Runtime indexes are rebuilt on load
    assert!(loaded.state.sandbox_by_name("sbx-sbx-1").is_some());
}

#[test]
fn load_missing_returns_none() {
    let dir = tempdir().unwrap();
    assert!(load_snapshot(&dir.path().join("nope.snap.zst")).unwrap().is_none());
}

#[test]
fn save_retires_the_previous_generation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.snap.zst");

    Snapshot::new(1, MaterializedState::default()).save(&path).unwrap();
    Snapshot::new(2, MaterializedState::default()).save(&path).unwrap();

    assert!(dir.path().join("state.snap.zst.prev").exists());
    let loaded = load_snapshot(&path).unwrap().unwrap();
    assert_eq!(loaded.seq, 2);
    // The retired generation is the seq-1 snapshot.
    let prev = load_snapshot(&dir.path().join("state.snap.zst.prev")).unwrap().unwrap();
    assert_eq!(prev.seq, 1);
}

#[test]
fn only_two_prior_generations_are_kept() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.snap.zst");
    for seq in 0..5 {
        Snapshot::new(seq, MaterializedState::default()).save(&path).unwrap();
    }

    assert!(dir.path().join("state.snap.zst.prev").exists());
    assert!(dir.path().join("state.snap.zst.prev2").exists());
    // No staging leftovers, no deeper history.
    assert!(!dir.path().join("state.snap.zst.staging").exists());
    assert!(!dir.path().join("state.snap.zst.prev3").exists());

    let prev = load_snapshot(&dir.path().join("state.snap.zst.prev")).unwrap().unwrap();
    let prev2 = load_snapshot(&dir.path().join("state.snap.zst.prev2")).unwrap().unwrap();
    assert_eq!(prev.seq, 3);
    assert_eq!(prev2.seq, 2);
}

#[test]
fn future_version_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.snap.zst");

    let mut snapshot = Snapshot::new(1, MaterializedState::default());
    snapshot.version = CURRENT_SNAPSHOT_VERSION + 1;
    snapshot.save(&path).unwrap();

    assert!(matches!(load_snapshot(&path), Err(SnapshotError::Version(_))));
}

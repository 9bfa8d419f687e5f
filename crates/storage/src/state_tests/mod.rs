// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

mod pool;
mod sandboxes;
mod sessions;

use super::MaterializedState;
use sb_core::test_support::*;

#[test]
fn unknown_events_change_nothing() {
    let mut state = MaterializedState::default();
    state.apply_event(&sb_core::Event::Custom);
    assert!(state.sandboxes.is_empty());
    assert!(state.pool.is_empty());
}

#[test]
fn events_for_missing_records_are_no_ops() {
    let mut state = MaterializedState::default();
    state.apply_event(&sandbox_transitioned_event(
        "sbx-ghost",
        sb_core::SandboxStatus::Creating,
        "scheduler_pickup",
    ));
    assert!(state.sandboxes.is_empty());
}

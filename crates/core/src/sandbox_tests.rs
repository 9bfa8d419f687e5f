// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::strategies::*;
use proptest::prelude::*;
use yare::parameterized;

fn test_config() -> SandboxConfig {
    SandboxConfig::builder(
        SandboxId::from_string("sbx-0000000000000000000"),
        SessionId::from_string("sess0000000000000000000"),
        "acme/widgets",
    )
    .api_secret("s".repeat(API_SECRET_LEN))
    .target_branch("main")
    .build()
}

#[test]
fn api_secret_length() {
    let secret = generate_api_secret();
    assert_eq!(secret.len(), API_SECRET_LEN);
    assert_ne!(secret, generate_api_secret());
}

#[parameterized(
    requested = { SandboxStatus::Requested, SandboxStatus::Creating, true },
    requested_skip = { SandboxStatus::Requested, SandboxStatus::Cloning, false },
    cloning_fallback = { SandboxStatus::Cloning, SandboxStatus::Creating, true },
    regress = { SandboxStatus::Installing, SandboxStatus::Cloning, false },
    ready_active = { SandboxStatus::Ready, SandboxStatus::Active, true },
    active_ready = { SandboxStatus::Active, SandboxStatus::Ready, true },
    stopping_only_destroying = { SandboxStatus::Stopping, SandboxStatus::Unhealthy, false },
    destroyed_terminal = { SandboxStatus::Destroyed, SandboxStatus::Creating, false },
    unhealthy_destroying = { SandboxStatus::Unhealthy, SandboxStatus::Destroying, true },
)]
fn transition_rules(from: SandboxStatus, to: SandboxStatus, allowed: bool) {
    assert_eq!(from.can_transition(to), allowed, "{from} -> {to}");
}

#[test]
fn phase_order_is_monotone_across_setup() {
    let phases = [
        SandboxStatus::Creating,
        SandboxStatus::Cloning,
        SandboxStatus::Installing,
        SandboxStatus::Starting,
        SandboxStatus::Ready,
    ];
    for pair in phases.windows(2) {
        assert!(pair[0].phase_order() < pair[1].phase_order());
    }
    assert_eq!(SandboxStatus::Stopping.phase_order(), None);
    assert_eq!(SandboxStatus::Unhealthy.phase_order(), None);
}

#[test]
fn new_record_seeds_history() {
    let record = SandboxRecord::new(test_config(), 1_000_000);
    assert_eq!(record.status, SandboxStatus::Requested);
    assert_eq!(record.status_history.len(), 1);
    assert_eq!(record.status_history[0].reason, "session_request");
    assert_eq!(record.effective_branch, "main");
    assert!(!record.placement.is_placed());
}

#[test]
fn transition_appends_history_and_stamps() {
    let mut record = SandboxRecord::new(test_config(), 1_000_000);
    record.transition(SandboxStatus::Creating, "scheduler_pickup", 1_005_000);

    assert_eq!(record.status, SandboxStatus::Creating);
    assert_eq!(record.status_changed_at_ms, 1_005_000);
    assert_eq!(record.status_history.len(), 2);
    let last = record.status_history.last().unwrap();
    assert_eq!(last.status, SandboxStatus::Creating);
    assert_eq!(last.reason, "scheduler_pickup");
}

#[test]
fn duplicate_transition_is_collapsed() {
    let mut record = SandboxRecord::new(test_config(), 1_000_000);
    record.transition(SandboxStatus::Creating, "scheduler_pickup", 1_005_000);
    record.transition(SandboxStatus::Creating, "host_callback", 1_006_000);

    assert_eq!(record.status_history.len(), 2);
    assert_eq!(record.status_changed_at_ms, 1_005_000);
}

#[test]
fn destroyed_sets_tombstone() {
    let mut record = SandboxRecord::builder().status(SandboxStatus::Destroying).build();
    record.transition(SandboxStatus::Destroyed, "host_destroy_complete", 2_000_000);
    assert_eq!(record.destroyed_at_ms, Some(2_000_000));
}

#[test]
fn annotate_keeps_last_entry_invariant() {
    let mut record = SandboxRecord::builder().status(SandboxStatus::Cloning).build();
    record.annotate("branch_fallback:nonexistent", 1_100_000);

    let last = record.status_history.last().unwrap();
    assert_eq!(last.status, SandboxStatus::Cloning);
    assert!(last.reason.starts_with("branch_fallback:"));
    assert_eq!(last.status, record.status);
}

#[test]
fn heartbeat_only_moves_forward() {
    let mut record = SandboxRecord::builder().build();
    record.record_heartbeat(2_000_000);
    record.record_heartbeat(1_500_000);
    assert_eq!(record.last_heartbeat_ms, Some(2_000_000));
}

#[test]
fn heartbeat_lapse_falls_back_to_status_change() {
    let record = SandboxRecord::builder().status_changed_at_ms(1_000_000).build();
    assert_eq!(record.heartbeat_lapse_ms(1_060_000), 60_000);
}

#[test]
fn history_compaction_collapses_activity_flips() {
    let mut record = SandboxRecord::builder().status(SandboxStatus::Ready).build();
    for i in 0..HISTORY_COMPACT_THRESHOLD as u64 {
        let status =
            if i % 2 == 0 { SandboxStatus::Active } else { SandboxStatus::Ready };
        record.transition(status, "heartbeat", 1_000_000 + i * 1000);
    }

    assert!(record.status_history.len() < HISTORY_COMPACT_THRESHOLD);
    // The last entry still describes the current status.
    assert_eq!(record.status_history.last().unwrap().status, record.status);
    // Setup entries before the flips are preserved.
    assert_eq!(record.status_history[0].status, SandboxStatus::Requested);
}

#[test]
fn callback_status_targets() {
    assert_eq!(CallbackStatus::Cloning.target_status(), Some(SandboxStatus::Cloning));
    assert_eq!(CallbackStatus::Ready.target_status(), Some(SandboxStatus::Ready));
    assert_eq!(CallbackStatus::Failed.target_status(), None);
}

#[test]
fn status_serde_round_trip() {
    let json = serde_json::to_string(&SandboxStatus::Installing).unwrap();
    assert_eq!(json, "\"installing\"");
    let parsed: SandboxStatus = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, SandboxStatus::Installing);
}

#[test]
fn labels_match_the_wire_spelling() {
    for status in SandboxStatus::all() {
        assert_eq!(
            serde_json::to_string(status).unwrap(),
            format!("\"{}\"", status.label())
        );
        assert_eq!(status.to_string(), status.label());
    }
}

proptest! {
    #[test]
    fn successors_never_leave_terminal(status in arb_sandbox_status()) {
        if status.is_terminal() {
            prop_assert!(status.successors().is_empty());
        }
    }

    #[test]
    fn successors_are_valid_statuses(status in arb_sandbox_status()) {
        for next in status.successors() {
            prop_assert!(SandboxStatus::all().contains(next));
        }
    }
}

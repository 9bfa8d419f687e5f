// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{context, TestContext};
use sb_core::sandbox::{CallbackStatus, SandboxStatus};
use sb_core::SandboxId;

async fn requested_sandbox(ctx: &TestContext) -> SandboxId {
    let session = ctx.orch.create_session("acme/widgets", "main", None).unwrap();
    ctx.orch.request_sandbox(&session).await.unwrap()
}

#[tokio::test]
async fn valid_transition_appends_history() {
    let ctx = context();
    let id = requested_sandbox(&ctx).await;

    ctx.orch.transition(&id, SandboxStatus::Creating, "scheduler_pickup").unwrap();

    let record = ctx.record(&id);
    assert_eq!(record.status, SandboxStatus::Creating);
    assert_eq!(record.status_history.last().unwrap().reason, "scheduler_pickup");
}

#[tokio::test]
async fn invalid_transition_is_rejected_without_state_change() {
    let ctx = context();
    let id = requested_sandbox(&ctx).await;

    let err = ctx.orch.transition(&id, SandboxStatus::Ready, "bogus").unwrap_err();
    assert!(matches!(
        err,
        EngineError::Transition(TransitionError::Invalid {
            from: SandboxStatus::Requested,
            to: SandboxStatus::Ready,
        })
    ));

    let record = ctx.record(&id);
    assert_eq!(record.status, SandboxStatus::Requested);
    assert_eq!(record.status_history.len(), 1);
}

#[tokio::test]
async fn transition_to_current_status_is_a_no_op() {
    let ctx = context();
    let id = requested_sandbox(&ctx).await;

    ctx.orch.transition(&id, SandboxStatus::Requested, "again").unwrap();
    assert_eq!(ctx.record(&id).status_history.len(), 1);
}

#[tokio::test]
async fn callbacks_advance_through_setup() {
    let ctx = context();
    let id = requested_sandbox(&ctx).await;
    ctx.orch.transition(&id, SandboxStatus::Creating, "scheduler_pickup").unwrap();

    ctx.drive_to_ready(&id);

    let record = ctx.record(&id);
    assert_eq!(record.status, SandboxStatus::Ready);
    let statuses: Vec<SandboxStatus> =
        record.status_history.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![
            SandboxStatus::Requested,
            SandboxStatus::Creating,
            SandboxStatus::Cloning,
            SandboxStatus::Installing,
            SandboxStatus::Starting,
            SandboxStatus::Ready,
        ]
    );
    // Timestamps are monotone.
    let times: Vec<u64> = record.status_history.iter().map(|e| e.at_ms).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn callbacks_may_skip_phases_forward() {
    let ctx = context();
    let id = requested_sandbox(&ctx).await;
    ctx.orch.transition(&id, SandboxStatus::Creating, "scheduler_pickup").unwrap();

    // Image-cached setup goes straight to installing.
    let outcome = ctx
        .orch
        .apply_callback(&ctx.callback(&id, CallbackStatus::Installing))
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Accepted);
    assert_eq!(ctx.status_of(&id), SandboxStatus::Installing);
}

#[tokio::test]
async fn stale_callback_is_ignored() {
    let ctx = context();
    let id = requested_sandbox(&ctx).await;
    ctx.orch.transition(&id, SandboxStatus::Creating, "scheduler_pickup").unwrap();
    ctx.orch.apply_callback(&ctx.callback(&id, CallbackStatus::Installing)).unwrap();

    // A late `cloning` event arrives after `installing`.
    let outcome =
        ctx.orch.apply_callback(&ctx.callback(&id, CallbackStatus::Cloning)).unwrap();
    assert_eq!(outcome, CallbackOutcome::Ignored);
    assert_eq!(ctx.status_of(&id), SandboxStatus::Installing);
}

#[tokio::test]
async fn duplicate_callback_is_idempotent() {
    let ctx = context();
    let id = requested_sandbox(&ctx).await;
    ctx.orch.transition(&id, SandboxStatus::Creating, "scheduler_pickup").unwrap();
    ctx.orch.apply_callback(&ctx.callback(&id, CallbackStatus::Cloning)).unwrap();
    let history_len = ctx.record(&id).status_history.len();

    let outcome =
        ctx.orch.apply_callback(&ctx.callback(&id, CallbackStatus::Cloning)).unwrap();
    assert_eq!(outcome, CallbackOutcome::Ignored);
    assert!(outcome.success());
    assert_eq!(ctx.record(&id).status_history.len(), history_len);
}

#[tokio::test]
async fn callbacks_during_teardown_are_silently_ignored() {
    let ctx = context();
    let id = requested_sandbox(&ctx).await;
    ctx.orch.transition(&id, SandboxStatus::Creating, "scheduler_pickup").unwrap();
    ctx.drive_to_ready(&id);
    ctx.orch.stop_sandbox(&id).unwrap();

    let outcome =
        ctx.orch.apply_callback(&ctx.callback(&id, CallbackStatus::Ready)).unwrap();
    assert_eq!(outcome, CallbackOutcome::Ignored);
    assert_eq!(ctx.status_of(&id), SandboxStatus::Stopping);
}

#[tokio::test]
async fn failed_callback_goes_unhealthy_with_error() {
    let ctx = context();
    let id = requested_sandbox(&ctx).await;
    ctx.orch.transition(&id, SandboxStatus::Creating, "scheduler_pickup").unwrap();
    ctx.orch.apply_callback(&ctx.callback(&id, CallbackStatus::Cloning)).unwrap();

    let mut callback = ctx.callback(&id, CallbackStatus::Failed);
    callback.error_message = Some("npm install exploded".to_string());
    let outcome = ctx.orch.apply_callback(&callback).unwrap();

    assert_eq!(outcome, CallbackOutcome::Accepted);
    let record = ctx.record(&id);
    assert_eq!(record.status, SandboxStatus::Unhealthy);
    assert_eq!(record.last_error.as_deref(), Some("npm install exploded"));
    assert_eq!(record.status_history.last().unwrap().reason, "host_reported_failure");
}

#[tokio::test]
async fn secret_mismatch_and_unknown_name_fail_softly() {
    let ctx = context();
    let id = requested_sandbox(&ctx).await;
    ctx.orch.transition(&id, SandboxStatus::Creating, "scheduler_pickup").unwrap();

    let mut callback = ctx.callback(&id, CallbackStatus::Cloning);
    callback.api_secret = "wrong".to_string();
    let outcome = ctx.orch.apply_callback(&callback).unwrap();
    assert_eq!(outcome, CallbackOutcome::SecretMismatch);
    assert!(!outcome.success());
    assert_eq!(outcome.error(), Some("secret mismatch"));
    assert_eq!(ctx.status_of(&id), SandboxStatus::Creating);

    let mut callback = ctx.callback(&id, CallbackStatus::Cloning);
    callback.sandbox_name = "nobody".to_string();
    let outcome = ctx.orch.apply_callback(&callback).unwrap();
    assert_eq!(outcome, CallbackOutcome::UnknownSandbox);
}

#[tokio::test]
async fn callback_image_report_is_discovered() {
    let ctx = context();
    let id = requested_sandbox(&ctx).await;
    ctx.orch.transition(&id, SandboxStatus::Creating, "scheduler_pickup").unwrap();

    let mut callback = ctx.callback(&id, CallbackStatus::Ready);
    callback.image = Some(ImageReport {
        tag: "img-acme-main".to_string(),
        size_bytes: 1 << 30,
        commit_sha: "deadbeef".to_string(),
        failed: false,
    });
    ctx.orch.apply_callback(&callback).unwrap();

    let image = ctx
        .orch
        .store()
        .read(|s| s.repo_images.get("acme/widgets#main").cloned())
        .unwrap();
    assert_eq!(image.tag, "img-acme-main");
}

#[tokio::test]
async fn heartbeat_promotes_ready_to_active() {
    let ctx = context();
    let id = requested_sandbox(&ctx).await;
    ctx.orch.transition(&id, SandboxStatus::Creating, "scheduler_pickup").unwrap();
    ctx.drive_to_ready(&id);

    let name = ctx.record(&id).name;
    ctx.orch.record_heartbeat(&name).unwrap();

    let record = ctx.record(&id);
    assert_eq!(record.status, SandboxStatus::Active);
    assert!(record.last_heartbeat_ms.is_some());

    // A second heartbeat while active just updates the timestamp.
    ctx.clock.advance(std::time::Duration::from_secs(5));
    ctx.orch.record_heartbeat(&name).unwrap();
    assert_eq!(ctx.status_of(&id), SandboxStatus::Active);

    assert!(ctx.orch.record_heartbeat("nobody").is_err());
}

#[tokio::test]
async fn status_callback_serde_matches_wire_format() {
    let json = r#"{
        "sandboxName": "sbx-1",
        "apiSecret": "s",
        "status": "installing",
        "errorMessage": null
    }"#;
    let callback: StatusCallback = serde_json::from_str(json).unwrap();
    assert_eq!(callback.sandbox_name, "sbx-1");
    assert_eq!(callback.status, CallbackStatus::Installing);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::test_helpers::{context, TestContext};
use sb_core::pool::PoolStatus;
use sb_core::sandbox::SandboxStatus;
use sb_core::SandboxId;

async fn ready_sandbox(ctx: &TestContext) -> SandboxId {
    let session = ctx.orch.create_session("acme/widgets", "main", None).unwrap();
    let id = ctx.orch.request_sandbox(&session).await.unwrap();
    ctx.orch.process_requested().await;
    ctx.drive_to_ready(&id);
    id
}

#[tokio::test]
async fn lost_host_sandbox_goes_unhealthy() {
    let ctx = context();
    let id = ready_sandbox(&ctx).await;
    let host_id = ctx.record(&id).placement.host_id.clone();

    ctx.host.lose_sandbox(&host_id);
    let repairs = ctx.orch.reconcile().await.unwrap();

    assert_eq!(repairs, 1);
    let record = ctx.record(&id);
    assert_eq!(record.status, SandboxStatus::Unhealthy);
    assert_eq!(record.status_history.last().unwrap().reason, "host_missing");
}

#[tokio::test]
async fn in_sync_state_needs_no_repair() {
    let ctx = context();
    ready_sandbox(&ctx).await;
    assert_eq!(ctx.orch.reconcile().await.unwrap(), 0);
}

#[tokio::test]
async fn orphan_host_sandboxes_are_destroyed() {
    let ctx = context();
    ready_sandbox(&ctx).await;
    ctx.host.plant_orphan("host-orphan");

    let repairs = ctx.orch.reconcile().await.unwrap();
    assert_eq!(repairs, 1);
    assert!(!ctx.host.live_ids().contains(&"host-orphan".to_string()));
}

#[tokio::test]
async fn ready_pool_entry_with_missing_host_is_failed() {
    let ctx = context();
    ctx.orch.replenish_pool().await.unwrap();
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }

    let host_id = ctx
        .orch
        .store()
        .read(|s| s.pool_in_status(PoolStatus::Ready).first().map(|e| e.placement.host_id.clone()))
        .unwrap();
    ctx.host.lose_sandbox(&host_id);

    let repairs = ctx.orch.reconcile().await.unwrap();
    assert_eq!(repairs, 1);
    let failed = ctx.orch.store().read(|s| s.pool_in_status(PoolStatus::Failed).len());
    assert_eq!(failed, 1);
}

#[tokio::test]
async fn reconcile_applies_both_directions_in_one_pass() {
    let ctx = context();
    let id = ready_sandbox(&ctx).await;
    let host_id = ctx.record(&id).placement.host_id.clone();
    ctx.host.lose_sandbox(&host_id);
    ctx.host.plant_orphan("host-orphan");

    let repairs = ctx.orch.reconcile().await.unwrap();
    assert_eq!(repairs, 2);
    assert_eq!(ctx.status_of(&id), SandboxStatus::Unhealthy);
    assert!(!ctx.host.live_ids().contains(&"host-orphan".to_string()));
}

#[tokio::test]
async fn startup_recovery_resumes_interrupted_provisioning() {
    let ctx = context();
    let session = ctx.orch.create_session("acme/widgets", "main", None).unwrap();
    let id = ctx.orch.request_sandbox(&session).await.unwrap();
    // Claimed but the provision task "died" with the previous process.
    ctx.orch.transition(&id, SandboxStatus::Creating, "scheduler_pickup").unwrap();

    ctx.orch.recover_on_startup().await.unwrap();
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }

    let record = ctx.record(&id);
    assert_eq!(record.status, SandboxStatus::Creating);
    assert!(record.placement.is_placed());
}

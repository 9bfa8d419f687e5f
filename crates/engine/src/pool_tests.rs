// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::test_helpers::{context, TestContext};
use sb_core::pool::{PoolKind, PoolStatus};
use sb_core::sandbox::SandboxStatus;
use sb_core::{Clock, Event};
use sb_host::HostError;

/// Run replenish and the spawned create tasks to completion.
async fn replenish_and_settle(ctx: &TestContext) -> usize {
    let scheduled = ctx.orch.replenish_pool().await.unwrap();
    // Let the spawned create tasks run.
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    scheduled
}

fn discover_hot_image(ctx: &TestContext, repo: &str) {
    ctx.orch
        .store()
        .commit(&[Event::RepoImageDiscovered {
            repo_id: repo.to_string(),
            branch: "main".to_string(),
            tag: format!("img-{repo}"),
            size_bytes: 1,
            commit_sha: "abc".to_string(),
            status: sb_core::ImageStatus::Ready,
            at_ms: ctx.clock.epoch_ms(),
        }])
        .unwrap();
}

#[tokio::test]
async fn replenish_respects_creation_budget() {
    let ctx = context();
    // Deficit is 3 (target) but the budget allows only 2 concurrent creates.
    let scheduled = replenish_and_settle(&ctx).await;
    assert_eq!(scheduled, 2);

    let ready = ctx.orch.store().read(|s| s.pool_in_status(PoolStatus::Ready).len());
    assert_eq!(ready, 2);

    // The next pass tops the pool up to target.
    let scheduled = replenish_and_settle(&ctx).await;
    assert_eq!(scheduled, 1);
    let ready = ctx.orch.store().read(|s| s.pool_in_status(PoolStatus::Ready).len());
    assert_eq!(ready, 3);

    // At target: nothing to do.
    assert_eq!(replenish_and_settle(&ctx).await, 0);
}

#[tokio::test]
async fn hot_repos_get_affine_entries_after_generic_fill() {
    let ctx = context();
    discover_hot_image(&ctx, "acme/widgets");

    // Fill the generic pool first.
    replenish_and_settle(&ctx).await;
    replenish_and_settle(&ctx).await;

    // With the generic pool at target, the budget goes repo-affine.
    replenish_and_settle(&ctx).await;
    let affine = ctx.orch.store().read(|s| {
        s.pool
            .values()
            .filter(|e| matches!(e.kind, PoolKind::RepoAffine { .. }))
            .count()
    });
    assert_eq!(affine, 1);

    // One per hot repo; no duplicates on the next pass.
    replenish_and_settle(&ctx).await;
    let affine = ctx.orch.store().read(|s| {
        s.pool
            .values()
            .filter(|e| matches!(e.kind, PoolKind::RepoAffine { .. }))
            .count()
    });
    assert_eq!(affine, 1);
}

#[tokio::test]
async fn failed_create_marks_entry_failed_and_gc_removes_it() {
    let ctx = context();
    ctx.host.push_create_result(Err(HostError::Fatal("no capacity".to_string())));
    replenish_and_settle(&ctx).await;

    let failed = ctx.orch.store().read(|s| s.pool_in_status(PoolStatus::Failed).len());
    assert_eq!(failed, 1);

    let collected = ctx.orch.gc_pool().await.unwrap();
    assert_eq!(collected, 1);
    let remaining = ctx.orch.store().read(|s| s.pool.len());
    assert_eq!(remaining, 1); // the sibling entry that succeeded
}

#[tokio::test]
async fn assignment_takes_ready_entry_and_starts_in_cloning() {
    let ctx = context();
    replenish_and_settle(&ctx).await;

    let session = ctx.orch.create_session("acme/widgets", "main", None).unwrap();
    let id = ctx.orch.request_sandbox(&session).await.unwrap();
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }

    let record = ctx.record(&id);
    assert_eq!(record.status_history[0].status, SandboxStatus::Cloning);
    assert_eq!(record.status_history[0].reason, "pool_assignment");
    assert!(record.placement.is_placed());

    let assigned = ctx.orch.store().read(|s| s.pool_in_status(PoolStatus::Assigned).len());
    assert_eq!(assigned, 1);
}

#[tokio::test]
async fn repo_affine_entry_preferred_over_generic() {
    let ctx = context();
    discover_hot_image(&ctx, "acme/widgets");
    // Fill generic + affine.
    for _ in 0..4 {
        replenish_and_settle(&ctx).await;
    }

    let session = ctx.orch.create_session("acme/widgets", "main", None).unwrap();
    let id = ctx.orch.request_sandbox(&session).await.unwrap();
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }

    let assigned_kind = ctx.orch.store().read(|s| {
        s.pool_in_status(PoolStatus::Assigned).first().map(|e| e.kind.clone())
    });
    assert!(matches!(assigned_kind, Some(PoolKind::RepoAffine { .. })));
    assert_eq!(ctx.record(&id).status_history[0].status, SandboxStatus::Cloning);
}

#[tokio::test]
async fn generic_assignment_is_fifo() {
    let ctx = context();
    replenish_and_settle(&ctx).await; // creates two entries

    let oldest = ctx
        .orch
        .store()
        .read(|s| s.pool_oldest_ready_generic().map(|e| e.id))
        .unwrap();

    let session = ctx.orch.create_session("acme/widgets", "main", None).unwrap();
    ctx.orch.request_sandbox(&session).await.unwrap();

    let status = ctx.orch.store().read(|s| s.pool.get(&oldest).map(|e| e.status));
    assert_eq!(status, Some(PoolStatus::Assigned));
}

#[tokio::test]
async fn reaped_pool_sandbox_falls_back_to_fresh_create() {
    let ctx = context();
    replenish_and_settle(&ctx).await;
    // The host loses the pool sandbox between assignment and setup.
    ctx.host.push_setup_result(Err(HostError::NotFound("reaped".to_string())));

    let session = ctx.orch.create_session("acme/widgets", "main", None).unwrap();
    let id = ctx.orch.request_sandbox(&session).await.unwrap();
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }

    let record = ctx.record(&id);
    // Fell back through cloning → creating, then created fresh.
    assert!(record.status_history.iter().any(|e| e.reason == "host_lost_sandbox"));
    assert_eq!(record.status, SandboxStatus::Creating);
}

#[tokio::test]
async fn stale_assignment_is_leaked_and_dropped() {
    let ctx = context();
    replenish_and_settle(&ctx).await;

    let session = ctx.orch.create_session("acme/widgets", "main", None).unwrap();
    ctx.orch.request_sandbox(&session).await.unwrap();

    // Young assignment survives GC.
    assert_eq!(ctx.orch.gc_pool().await.unwrap(), 0);

    ctx.clock.advance(std::time::Duration::from_secs(301));
    assert_eq!(ctx.orch.gc_pool().await.unwrap(), 1);

    let assigned = ctx.orch.store().read(|s| s.pool_in_status(PoolStatus::Assigned).len());
    assert_eq!(assigned, 0);
}

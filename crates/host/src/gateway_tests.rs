// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::backend::{FakeCall, FakeHost};
use crate::types::CreateSandboxResponse;
use std::collections::HashMap;

fn create_req(name: &str) -> CreateSandboxRequest {
    CreateSandboxRequest { name: name.to_string(), image: "base:latest".to_string(), volume: None }
}

fn setup_req() -> SetupSandboxRequest {
    SetupSandboxRequest {
        repo: "acme/widgets".to_string(),
        target_branch: "main".to_string(),
        default_branch: "main".to_string(),
        token: "tok".to_string(),
        callback_url: "http://cp/sandbox-status".to_string(),
        callback_secret: "secret".to_string(),
        image_hint: None,
        checkpoint_hint: None,
        env: HashMap::new(),
    }
}

#[tokio::test(start_paused = true)]
async fn create_succeeds_without_retries() {
    let gateway = HostGateway::new(FakeHost::new());
    let created = gateway.create(&create_req("sbx-a")).await.unwrap();
    assert_eq!(created.retries, 0);
    assert!(!created.host_id.is_empty());
    assert!(created.host_port >= 40_000);
}

#[tokio::test(start_paused = true)]
async fn transient_errors_retry_with_backoff_then_succeed() {
    let fake = FakeHost::new();
    fake.push_create_result(Err(HostError::Transient("503".to_string())));
    fake.push_create_result(Err(HostError::Transient("503".to_string())));
    let gateway = HostGateway::new(fake);

    let start = tokio::time::Instant::now();
    let created = gateway.create(&create_req("sbx-a")).await.unwrap();

    // Two failures absorbed; backoff 2s + 4s elapsed before success
    assert_eq!(created.retries, 2);
    assert!(start.elapsed() >= std::time::Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn retries_exhausted_becomes_fatal() {
    let fake = FakeHost::new();
    for _ in 0..=MAX_RETRIES {
        fake.push_create_result(Err(HostError::Transient("503".to_string())));
    }
    let gateway = HostGateway::new(fake);

    let err = gateway.create(&create_req("sbx-a")).await.unwrap_err();
    assert!(matches!(err, HostError::Fatal(_)));
}

#[tokio::test(start_paused = true)]
async fn max_retries_minus_one_failures_still_succeeds() {
    let fake = FakeHost::new();
    for _ in 0..MAX_RETRIES {
        fake.push_create_result(Err(HostError::Transient("503".to_string())));
    }
    let gateway = HostGateway::new(fake);

    let created = gateway.create(&create_req("sbx-a")).await.unwrap();
    assert_eq!(created.retries, MAX_RETRIES);
}

#[tokio::test(start_paused = true)]
async fn conflict_self_heals_once() {
    let fake = FakeHost::new();
    fake.plant_orphan("host-stale");
    fake.push_create_result(Err(HostError::Conflict { stale_id: "host-stale".to_string() }));
    let gateway = HostGateway::new(fake);

    let created = gateway.create(&create_req("sbx-a")).await.unwrap();
    assert!(!created.host_id.is_empty());

    let calls = gateway.backend().calls();
    assert!(calls.contains(&FakeCall::Destroy { host_id: "host-stale".to_string() }));
    assert!(!gateway.backend().live_ids().contains(&"host-stale".to_string()));
}

#[tokio::test(start_paused = true)]
async fn second_conflict_is_surfaced() {
    let fake = FakeHost::new();
    fake.push_create_result(Err(HostError::Conflict { stale_id: "host-1".to_string() }));
    fake.push_create_result(Err(HostError::Conflict { stale_id: "host-2".to_string() }));
    let gateway = HostGateway::new(fake);

    let err = gateway.create(&create_req("sbx-a")).await.unwrap_err();
    assert!(matches!(err, HostError::Conflict { .. }));
}

#[tokio::test(start_paused = true)]
async fn setup_not_found_passes_through_without_retry() {
    let fake = FakeHost::new();
    fake.push_setup_result(Err(HostError::NotFound("gone".to_string())));
    let gateway = HostGateway::new(fake);

    let err = gateway.setup("host-1", &setup_req()).await.unwrap_err();
    assert!(matches!(err, HostError::NotFound(_)));

    let setups = gateway
        .backend()
        .calls()
        .iter()
        .filter(|c| matches!(c, FakeCall::Setup { .. }))
        .count();
    assert_eq!(setups, 1);
}

#[tokio::test(start_paused = true)]
async fn destroy_of_missing_sandbox_is_success() {
    let gateway = HostGateway::new(FakeHost::new());
    gateway.destroy("host-nope").await.unwrap();
}

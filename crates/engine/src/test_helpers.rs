// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests: an orchestrator wired to fakes.

use crate::orchestrator::Orchestrator;
use sb_core::sandbox::CallbackStatus;
use sb_core::{Config, FakeClock, SandboxId};
use sb_githost::{CredentialStore, FakeSourceHost, StoredCredential};
use sb_host::{FakeHost, HostGateway};
use sb_storage::Store;
use std::sync::Arc;
use std::time::Duration;

pub(crate) type TestOrchestrator = Orchestrator<FakeHost, FakeSourceHost, FakeClock>;

pub(crate) struct TestContext {
    pub orch: TestOrchestrator,
    pub clock: FakeClock,
    pub host: FakeHost,
    pub githost: FakeSourceHost,
    _dir: tempfile::TempDir,
}

pub(crate) fn context() -> TestContext {
    let mut config = Config::default();
    config.host.auth_secret = "host-secret".to_string();
    context_with_raw(config)
}

/// Like [`context`] but takes the config verbatim (no secret fill-in).
pub(crate) fn context_with_raw(config: Config) -> TestContext {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();

    let clock = FakeClock::new();
    let host = FakeHost::new();
    let githost = FakeSourceHost::new();
    let credentials = CredentialStore::new();
    // Records default to an empty owner id; store the credential under it.
    credentials.put("", StoredCredential::new("token", "refresh", u64::MAX));

    let gateway =
        HostGateway::new(host.clone()).with_backoff_base(Duration::from_millis(1));
    let orch = Orchestrator::new(
        store,
        gateway,
        Arc::new(githost.clone()),
        credentials,
        Arc::new(config),
        clock.clone(),
    );
    TestContext { orch, clock, host, githost, _dir: dir }
}

impl TestContext {
    /// The callback body the host would post for this sandbox.
    pub fn callback(&self, id: &SandboxId, status: CallbackStatus) -> crate::StatusCallback {
        let record = self.orch.store().read(|s| s.sandboxes.get(id).cloned()).unwrap();
        crate::StatusCallback {
            sandbox_name: record.name,
            api_secret: record.api_secret,
            status,
            error_message: None,
            build_log: None,
            image: None,
            checkpoint: None,
        }
    }

    /// Walk a sandbox through the setup callbacks to `ready`.
    pub fn drive_to_ready(&self, id: &SandboxId) {
        for status in [
            CallbackStatus::Cloning,
            CallbackStatus::Installing,
            CallbackStatus::Starting,
            CallbackStatus::Ready,
        ] {
            self.orch.apply_callback(&self.callback(id, status)).unwrap();
        }
    }

    pub fn status_of(&self, id: &SandboxId) -> sb_core::SandboxStatus {
        self.orch.store().read(|s| s.sandboxes.get(id).map(|r| r.status)).unwrap()
    }

    pub fn record(&self, id: &SandboxId) -> sb_core::SandboxRecord {
        self.orch.store().read(|s| s.sandboxes.get(id).cloned()).unwrap()
    }
}

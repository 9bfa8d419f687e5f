// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery policy over any [`HostBackend`].
//!
//! - Transient errors retry with exponential backoff (2 s, 4 s, 8 s),
//!   capped at [`MAX_RETRIES`] retries.
//! - 409 on create self-heals once: delete the stale sandbox, wait briefly,
//!   retry.
//! - 404 passes straight through on setup (the caller falls back to fresh
//!   creation) and counts as success on destroy.

use crate::backend::HostBackend;
use crate::error::HostError;
use crate::types::{
    CreateSandboxRequest, ExecRequest, ExecResponse, HostSandbox, SetupSandboxRequest,
};
use std::time::Duration;

/// Maximum retry attempts after the initial call.
pub const MAX_RETRIES: u32 = 3;

/// First backoff delay; doubles per retry.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(2);

/// Pause between deleting a stale sandbox and retrying the create.
const CONFLICT_RETRY_DELAY_DIVISOR: u32 = 4;

/// Result of a gateway create, including how many retries it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    pub host_id: String,
    pub host_port: u16,
    /// Failed attempts absorbed before success
    pub retries: u32,
}

pub struct HostGateway<B> {
    backend: B,
    backoff_base: Duration,
}

impl<B: HostBackend> HostGateway<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, backoff_base: DEFAULT_BACKOFF_BASE }
    }

    /// Override the backoff base (tests use milliseconds).
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Create a bare sandbox, absorbing transient errors and healing one
    /// name conflict.
    pub async fn create(&self, req: &CreateSandboxRequest) -> Result<Created, HostError> {
        let mut retries = 0u32;
        let mut conflict_healed = false;
        loop {
            match self.backend.create_sandbox(req).await {
                Ok(resp) => {
                    return Ok(Created { host_id: resp.id, host_port: resp.host_port, retries })
                }
                Err(HostError::Conflict { stale_id }) if !conflict_healed => {
                    conflict_healed = true;
                    tracing::warn!(
                        name = %req.name,
                        stale_id = %stale_id,
                        "create conflict, removing stale sandbox and retrying"
                    );
                    if stale_id.is_empty() {
                        return Err(HostError::Fatal(format!(
                            "name conflict on {} without a stale id to remove",
                            req.name
                        )));
                    }
                    self.backend.destroy_sandbox(&stale_id).await?;
                    tokio::time::sleep(self.backoff_base / CONFLICT_RETRY_DELAY_DIVISOR).await;
                }
                Err(e) if e.is_transient() && retries < MAX_RETRIES => {
                    retries += 1;
                    self.backoff(retries, &e, &req.name).await;
                }
                Err(HostError::Transient(msg)) => {
                    return Err(HostError::Fatal(format!("retries exhausted: {msg}")))
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run setup, retrying transient errors. 404 is returned untouched so the
    /// caller can fall back to fresh creation.
    pub async fn setup(
        &self,
        host_id: &str,
        req: &SetupSandboxRequest,
    ) -> Result<u32, HostError> {
        let mut retries = 0u32;
        loop {
            match self.backend.setup_sandbox(host_id, req).await {
                Ok(()) => return Ok(retries),
                Err(e) if e.is_transient() && retries < MAX_RETRIES => {
                    retries += 1;
                    self.backoff(retries, &e, host_id).await;
                }
                Err(HostError::Transient(msg)) => {
                    return Err(HostError::Fatal(format!("retries exhausted: {msg}")))
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Execute one shell command. Not retried: command delivery is
    /// at-least-once across crashes already, and callers own idempotency.
    pub async fn exec(&self, host_id: &str, req: &ExecRequest) -> Result<ExecResponse, HostError> {
        self.backend.exec(host_id, req).await
    }

    /// Enumerate live sandboxes. Single attempt; reconcile runs periodically
    /// and the next tick retries naturally.
    pub async fn list(&self) -> Result<Vec<HostSandbox>, HostError> {
        self.backend.list_sandboxes().await
    }

    /// Destroy a sandbox. Not-found means already gone, which is success.
    pub async fn destroy(&self, host_id: &str) -> Result<(), HostError> {
        match self.backend.destroy_sandbox(host_id).await {
            Err(HostError::NotFound(_)) => Ok(()),
            other => other,
        }
    }

    async fn backoff(&self, attempt: u32, error: &HostError, what: &str) {
        let delay = self.backoff_base * 2u32.saturating_pow(attempt - 1);
        tracing::warn!(
            what,
            error = %error,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "transient host error, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;

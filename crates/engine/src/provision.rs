// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provisioning: from a user request to a sandbox running setup.
//!
//! Two paths join at `cloning`: pool assignment reuses an existing host
//! sandbox and only clones the user's repo in; the fresh path walks
//! `requested → creating → cloning → …` driven by host callbacks. Every step
//! here is restartable — a crash leaves a record whose status tells the
//! next scheduler tick (or startup recovery) exactly where to resume.

use crate::error::EngineError;
use crate::orchestrator::Orchestrator;
use sb_core::sandbox::{SandboxConfig, SandboxId, SandboxStatus};
use sb_core::{Clock, Event, SessionId};
use sb_githost::{SourceHost, SourceHostError};
use sb_host::{CreateSandboxRequest, HostBackend, HostError, SetupSandboxRequest};
use std::collections::HashMap;

impl<H, S, C> Orchestrator<H, S, C>
where
    H: HostBackend,
    S: SourceHost,
    C: Clock + 'static,
{
    /// Entry point for a user needing a sandbox.
    ///
    /// Prefers a ready pool entry (repo-affine first, then generic FIFO);
    /// falls back to a fresh `requested` record for the scheduler. Returns
    /// the existing record's id when the session already has a live sandbox.
    pub async fn request_sandbox(&self, session_id: &SessionId) -> Result<SandboxId, EngineError> {
        let at_ms = self.now_ms();
        let (id, assigned) = self.store.transact(|state| {
            let Some(session) = state.sessions.get(session_id).cloned() else {
                return (Vec::new(), (None, false));
            };
            if let Some(existing) = state.active_sandbox_for_session(session_id) {
                return (Vec::new(), (Some(existing.id), false));
            }

            let id = SandboxId::new();
            let config = SandboxConfig::builder(id, *session_id, session.repo_id.clone())
                .target_branch(session.branch.clone())
                .build();

            let entry = state
                .pool_ready_for_repo(&session.repo_id)
                .or_else(|| state.pool_oldest_ready_generic());
            let mut events = match entry {
                Some(entry) => vec![Event::SandboxAssignedFromPool {
                    pool_entry_id: entry.id,
                    id,
                    name: config.name.clone(),
                    session_id: *session_id,
                    repo_id: config.repo_id.clone(),
                    team_id: config.team_id.clone(),
                    owner_id: config.owner_id.clone(),
                    api_secret: config.api_secret.clone(),
                    target_branch: config.target_branch.clone(),
                    placement: entry.placement.clone(),
                    at_ms,
                }],
                None => vec![Event::SandboxRequested {
                    id,
                    name: config.name.clone(),
                    session_id: *session_id,
                    repo_id: config.repo_id.clone(),
                    team_id: config.team_id.clone(),
                    owner_id: config.owner_id.clone(),
                    api_secret: config.api_secret.clone(),
                    target_branch: config.target_branch.clone(),
                    at_ms,
                }],
            };
            let assigned = entry.is_some();
            events.push(Event::SessionSandboxAttached { id: *session_id, sandbox_id: id });
            (events, (Some(id), assigned))
        })?;

        let Some(id) = id else {
            return Err(EngineError::SessionNotFound(session_id.to_string()));
        };

        if assigned {
            // The host sandbox already exists; go straight to setup.
            let this = self.clone();
            tokio::spawn(async move { this.provision(id).await });
        }
        Ok(id)
    }

    /// Drive one sandbox through create + setup, folding every failure into
    /// a status transition. Safe to call again after a crash.
    pub async fn provision(&self, id: SandboxId) {
        if let Err(e) = self.provision_inner(&id, true).await {
            tracing::error!(sandbox_id = %id, error = %e, "provisioning failed");
            let reason = match &e {
                EngineError::SourceHost(SourceHostError::ReconnectRequired) => {
                    "missing_source_credentials"
                }
                EngineError::Host(_) => "host_error",
                _ => "provision_error",
            };
            self.mark_unhealthy(&id, reason, &e.to_string());
        }
    }

    async fn provision_inner(&self, id: &SandboxId, allow_fresh: bool) -> Result<(), EngineError> {
        let Some(record) = self.store.read(|s| s.sandboxes.get(id).cloned()) else {
            return Err(EngineError::SandboxNotFound(id.to_string()));
        };

        // Config errors fail fast with a descriptive reason.
        if self.config.host.auth_secret.is_empty() {
            self.mark_unhealthy(id, "missing_host_secret", "host auth secret not configured");
            return Ok(());
        }

        // The fresh-create fallback re-creates even when a stale placement
        // from the lost sandbox is still on the record.
        let force_create = !allow_fresh;
        if record.status == SandboxStatus::Creating
            && (force_create || !record.placement.is_placed())
        {
            if let Err(e) = self.create_on_host(&record).await {
                self.mark_unhealthy(id, "host_create_failed", &e.to_string());
                return Ok(());
            }
        }

        match self.setup_on_host(id).await {
            Ok(()) => Ok(()),
            Err(EngineError::Host(HostError::NotFound(_))) if allow_fresh => {
                // The host lost the sandbox (a reaped pool entry, usually).
                // Fall back to creating a fresh one instead of going
                // unhealthy.
                tracing::warn!(sandbox_id = %id, "host lost sandbox during setup, creating fresh");
                self.transition(id, SandboxStatus::Creating, "host_lost_sandbox")?;
                Box::pin(self.provision_inner(id, false)).await
            }
            Err(EngineError::Host(e)) => {
                self.mark_unhealthy(id, "host_setup_failed", &e.to_string());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Create the bare host sandbox and persist its placement.
    async fn create_on_host(&self, record: &sb_core::SandboxRecord) -> Result<(), EngineError> {
        let image = self.store.read(|s| {
            s.repo_images
                .get(&sb_core::RepoImage::key(&record.repo_id, &record.effective_branch))
                .filter(|i| i.status == sb_core::ImageStatus::Ready)
                .map(|i| i.tag.clone())
        });
        let request = CreateSandboxRequest {
            name: record.name.clone(),
            image: image.unwrap_or_else(|| self.config.host.default_base_image.clone()),
            volume: None,
        };

        let created = self.host.create(&request).await?;
        let mut events = vec![Event::SandboxPlaced {
            id: record.id,
            placement: self.placement_for(&created.host_id, created.host_port, &record.name),
        }];
        if created.retries > 0 {
            events.push(Event::SandboxRetryRecorded { id: record.id, retry_count: created.retries });
        }
        self.store.commit(&events)?;
        Ok(())
    }

    /// Verify the branch, then hand the host the setup job. Progress past
    /// this point arrives as status callbacks.
    async fn setup_on_host(&self, id: &SandboxId) -> Result<(), EngineError> {
        let Some(record) = self.store.read(|s| s.sandboxes.get(id).cloned()) else {
            return Err(EngineError::SandboxNotFound(id.to_string()));
        };

        let token = self
            .credentials
            .fresh_token(self.githost.as_ref(), &record.owner_id, self.now_ms())
            .await?;

        let repo = self.githost.get_repo(&token, &record.repo_id).await?;
        let mut effective_branch = record.effective_branch.clone();
        if !record.branch_fell_back
            && self.githost.get_branch(&token, &record.repo_id, &effective_branch).await?.is_none()
        {
            effective_branch = repo.default_branch.clone();
            tracing::info!(
                sandbox_id = %id,
                target = %record.target_branch,
                fallback = %effective_branch,
                "target branch missing, using default branch"
            );
            self.store.commit(&[Event::SandboxBranchFellBack {
                id: *id,
                effective_branch: effective_branch.clone(),
                at_ms: self.now_ms(),
            }])?;
        }

        let image_hint = self.store.read(|s| {
            s.repo_images
                .get(&sb_core::RepoImage::key(&record.repo_id, &effective_branch))
                .filter(|i| i.status == sb_core::ImageStatus::Ready)
                .map(|i| i.tag.clone())
        });
        let checkpoint_hint = self.store.read(|s| {
            s.checkpoints
                .get(&sb_core::RepoImage::key(&record.repo_id, &effective_branch))
                .map(|c| c.name.clone())
        });

        let request = SetupSandboxRequest {
            repo: record.repo_id.clone(),
            target_branch: effective_branch.clone(),
            default_branch: repo.default_branch,
            token,
            callback_url: format!("{}/sandbox-status", self.config.host.callback_base_url),
            callback_secret: record.api_secret.clone(),
            image_hint: image_hint.clone(),
            checkpoint_hint,
            env: HashMap::new(),
        };

        let retries = self.host.setup(&record.placement.host_id, &request).await?;

        let mut events = Vec::new();
        if retries > 0 {
            events.push(Event::SandboxRetryRecorded { id: *id, retry_count: retries });
        }
        if image_hint.is_some() {
            events.push(Event::RepoImageUsed {
                repo_id: record.repo_id.clone(),
                branch: effective_branch,
                at_ms: self.now_ms(),
            });
        }
        self.store.commit(&events)?;
        Ok(())
    }

    /// Fold a failure into `unhealthy` with the error recorded. Transition
    /// rejections here mean the record has already moved on; they only log.
    pub(crate) fn mark_unhealthy(&self, id: &SandboxId, reason: &str, error: &str) {
        if let Err(e) = self
            .store
            .commit(&[Event::SandboxErrorRecorded { id: *id, error: error.to_string() }])
        {
            tracing::error!(sandbox_id = %id, error = %e, "failed to record error");
        }
        if let Err(e) = self.transition(id, SandboxStatus::Unhealthy, reason) {
            tracing::warn!(sandbox_id = %id, reason, error = %e, "unhealthy transition rejected");
        }
    }

    fn placement_for(
        &self,
        host_id: &str,
        host_port: u16,
        name: &str,
    ) -> sb_core::sandbox::Placement {
        let base = &self.config.host.preview_base_url;
        sb_core::sandbox::Placement {
            host_id: host_id.to_string(),
            host_port,
            preview_url: Some(format!("{base}:{host_port}")),
            exec_url: Some(format!("{base}:{host_port}/exec")),
            log_url: Some(format!("{base}:{host_port}/logs")),
            terminal_url: Some(format!("{base}:{host_port}/terminal/{name}")),
        }
    }
}

#[cfg(test)]
#[path = "provision_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The orchestrator: every component's shared handle onto the store, the
//! host gateway, the source host, and configuration.
//!
//! Cheap to clone; spawned tasks capture their own handle.

use crate::error::EngineError;
use sb_core::{Clock, Config, Event, SessionId};
use sb_githost::{CredentialStore, SourceHost};
use sb_host::{HostBackend, HostGateway};
use sb_storage::{Store, StoreError};
use std::sync::Arc;

pub struct Orchestrator<H, S, C: Clock> {
    pub(crate) store: Store,
    pub(crate) host: Arc<HostGateway<H>>,
    pub(crate) githost: Arc<S>,
    pub(crate) credentials: CredentialStore,
    pub(crate) config: Arc<Config>,
    pub(crate) clock: C,
}

impl<H, S, C: Clock> Clone for Orchestrator<H, S, C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            host: Arc::clone(&self.host),
            githost: Arc::clone(&self.githost),
            credentials: self.credentials.clone(),
            config: Arc::clone(&self.config),
            clock: self.clock.clone(),
        }
    }
}

impl<H, S, C> Orchestrator<H, S, C>
where
    H: HostBackend,
    S: SourceHost,
    C: Clock,
{
    pub fn new(
        store: Store,
        host: HostGateway<H>,
        githost: Arc<S>,
        credentials: CredentialStore,
        config: Arc<Config>,
        clock: C,
    ) -> Self {
        Self { store, host: Arc::new(host), githost, credentials, config, clock }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn host(&self) -> &HostGateway<H> {
        &self.host
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn githost(&self) -> &Arc<S> {
        &self.githost
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    /// Create an editing session. Sessions arrive from the product surface;
    /// this is the minimal entry point the control plane needs.
    pub fn create_session(
        &self,
        repo_id: &str,
        branch: &str,
        work_branch: Option<&str>,
    ) -> Result<SessionId, EngineError> {
        let id = SessionId::new();
        self.store.commit(&[Event::SessionCreated {
            id,
            repo_id: repo_id.to_string(),
            branch: branch.to_string(),
            work_branch: work_branch.map(str::to_string),
            at_ms: self.now_ms(),
        }])?;
        Ok(id)
    }

    /// Flip the session's stop flag; the agent loop observes it within its
    /// stop-check interval.
    pub fn request_stop(&self, session_id: &SessionId, stop: bool) -> Result<(), StoreError> {
        self.store.commit(&[Event::SessionStopRequested { id: *session_id, stop }])
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sandbox record and lifecycle state machine.

use serde::{Deserialize, Serialize};

use crate::SessionId;

crate::id_type! {
    /// Unique identifier for a sandbox record.
    ///
    /// Distinct from the host-side sandbox id, which is owned by the host
    /// daemon and only referenced here.
    pub struct SandboxId("sbx-");
}

/// Length of the random API secret embedded in status callbacks.
pub const API_SECRET_LEN: usize = 64;

/// Generate a fresh API secret for a sandbox.
///
/// Chosen once at request time and immutable for the life of the record.
pub fn generate_api_secret() -> String {
    nanoid::nanoid!(API_SECRET_LEN)
}

/// Lifecycle status of a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxStatus {
    /// Record created, awaiting scheduler pickup
    Requested,
    /// Host sandbox being created
    Creating,
    /// Repository clone in progress
    Cloning,
    /// Dependency install in progress
    Installing,
    /// Dev server starting
    Starting,
    /// Preview listening, no recent user activity
    Ready,
    /// Recent heartbeat
    Active,
    /// Termination requested by user or scheduler
    Stopping,
    /// Host teardown in progress
    Destroying,
    /// Host teardown complete (terminal)
    Destroyed,
    /// Failed; will be destroyed by the scheduler
    Unhealthy,
}

crate::label_enum! {
    SandboxStatus {
        Requested: "requested",
        Creating: "creating",
        Cloning: "cloning",
        Installing: "installing",
        Starting: "starting",
        Ready: "ready",
        Active: "active",
        Stopping: "stopping",
        Destroying: "destroying",
        Destroyed: "destroyed",
        Unhealthy: "unhealthy",
    }
}

impl SandboxStatus {
    /// Allowed successor statuses.
    pub fn successors(self) -> &'static [SandboxStatus] {
        use SandboxStatus::*;
        match self {
            Requested => &[Creating, Unhealthy],
            Creating => &[Cloning, Unhealthy],
            // Cloning → Creating is the rare fresh-create fallback when the
            // host lost a pool sandbox (404 on setup).
            Cloning => &[Installing, Creating, Unhealthy],
            Installing => &[Starting, Unhealthy],
            Starting => &[Ready, Unhealthy],
            Ready => &[Active, Stopping, Unhealthy],
            Active => &[Ready, Stopping, Unhealthy],
            Stopping => &[Destroying],
            Destroying => &[Destroyed, Unhealthy],
            Unhealthy => &[Destroying],
            Destroyed => &[],
        }
    }

    /// Whether `to` is an allowed successor of `self`.
    pub fn can_transition(self, to: SandboxStatus) -> bool {
        self.successors().contains(&to)
    }

    /// Monotone ordering of setup phases, used to reject stale host callbacks.
    ///
    /// Returns `None` for statuses outside the setup pipeline; callbacks are
    /// only compared when both sides carry an order.
    pub fn phase_order(self) -> Option<u8> {
        match self {
            SandboxStatus::Creating => Some(0),
            SandboxStatus::Cloning => Some(1),
            SandboxStatus::Installing => Some(2),
            SandboxStatus::Starting => Some(3),
            SandboxStatus::Ready => Some(4),
            _ => None,
        }
    }

    /// Terminal: no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, SandboxStatus::Destroyed)
    }

    /// Teardown statuses for which host callbacks are silently ignored.
    pub fn is_teardown(self) -> bool {
        matches!(
            self,
            SandboxStatus::Stopping | SandboxStatus::Destroying | SandboxStatus::Destroyed
        )
    }

    /// Transitional statuses bounded by a per-state timeout.
    pub fn is_transitional(self) -> bool {
        matches!(
            self,
            SandboxStatus::Requested
                | SandboxStatus::Creating
                | SandboxStatus::Cloning
                | SandboxStatus::Installing
                | SandboxStatus::Starting
                | SandboxStatus::Destroying
        )
    }

    /// All defined statuses, in phase order where one exists.
    pub fn all() -> &'static [SandboxStatus] {
        use SandboxStatus::*;
        &[
            Requested, Creating, Cloning, Installing, Starting, Ready, Active, Stopping,
            Destroying, Destroyed, Unhealthy,
        ]
    }
}

/// Progress status reported by the host daemon in a setup callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
    Cloning,
    Installing,
    Starting,
    Ready,
    Failed,
}

crate::label_enum! {
    CallbackStatus {
        Cloning: "cloning",
        Installing: "installing",
        Starting: "starting",
        Ready: "ready",
        Failed: "failed",
    }
}

impl CallbackStatus {
    /// The sandbox status a successful callback advances to.
    /// `Failed` has no target status; the engine routes it to `unhealthy`.
    pub fn target_status(self) -> Option<SandboxStatus> {
        match self {
            CallbackStatus::Cloning => Some(SandboxStatus::Cloning),
            CallbackStatus::Installing => Some(SandboxStatus::Installing),
            CallbackStatus::Starting => Some(SandboxStatus::Starting),
            CallbackStatus::Ready => Some(SandboxStatus::Ready),
            CallbackStatus::Failed => None,
        }
    }
}

/// One entry in a sandbox's append-only audit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: SandboxStatus,
    pub at_ms: u64,
    /// Short snake_case tag describing the originator of the transition.
    pub reason: String,
}

/// Host-side placement of a sandbox. Empty until the host create completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Host daemon's sandbox id
    #[serde(default)]
    pub host_id: String,
    #[serde(default)]
    pub host_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_url: Option<String>,
}

impl Placement {
    pub fn is_placed(&self) -> bool {
        !self.host_id.is_empty()
    }
}

/// Configuration for creating a new sandbox record
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub id: SandboxId,
    pub name: String,
    pub session_id: SessionId,
    pub repo_id: String,
    pub team_id: String,
    pub owner_id: String,
    pub api_secret: String,
    pub target_branch: String,
}

impl SandboxConfig {
    pub fn builder(
        id: SandboxId,
        session_id: SessionId,
        repo_id: impl Into<String>,
    ) -> SandboxConfigBuilder {
        SandboxConfigBuilder {
            name: format!("sbx-{}", id.short(8)),
            id,
            session_id,
            repo_id: repo_id.into(),
            team_id: String::new(),
            owner_id: String::new(),
            api_secret: generate_api_secret(),
            target_branch: "main".to_string(),
        }
    }
}

pub struct SandboxConfigBuilder {
    id: SandboxId,
    name: String,
    session_id: SessionId,
    repo_id: String,
    team_id: String,
    owner_id: String,
    api_secret: String,
    target_branch: String,
}

impl SandboxConfigBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn team_id(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = team_id.into();
        self
    }

    pub fn owner_id(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = owner_id.into();
        self
    }

    pub fn api_secret(mut self, api_secret: impl Into<String>) -> Self {
        self.api_secret = api_secret.into();
        self
    }

    pub fn target_branch(mut self, target_branch: impl Into<String>) -> Self {
        self.target_branch = target_branch.into();
        self
    }

    pub fn build(self) -> SandboxConfig {
        SandboxConfig {
            id: self.id,
            name: self.name,
            session_id: self.session_id,
            repo_id: self.repo_id,
            team_id: self.team_id,
            owner_id: self.owner_id,
            api_secret: self.api_secret,
            target_branch: self.target_branch,
        }
    }
}

/// History length above which ready↔active runs are compacted.
pub const HISTORY_COMPACT_THRESHOLD: usize = 200;

/// A sandbox record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxRecord {
    pub id: SandboxId,
    /// Human-readable name; also the key the host daemon calls back with
    pub name: String,
    pub session_id: SessionId,
    pub repo_id: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub placement: Placement,
    /// Immutable after creation; authenticates status callbacks
    pub api_secret: String,
    pub status: SandboxStatus,
    pub status_changed_at_ms: u64,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destroyed_at_ms: Option<u64>,
    pub target_branch: String,
    /// May differ from `target_branch` after default-branch fallback
    pub effective_branch: String,
    #[serde(default)]
    pub branch_fell_back: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    /// Append-only audit history; every transition appends exactly one entry
    pub status_history: Vec<StatusEntry>,
}

impl SandboxRecord {
    /// Create a new record in `requested`, history seeded with one entry.
    pub fn new(config: SandboxConfig, epoch_ms: u64) -> Self {
        Self::with_initial_status(config, SandboxStatus::Requested, "session_request", epoch_ms)
    }

    /// Create a record starting at an arbitrary status.
    ///
    /// Pool-assigned sandboxes begin life in `cloning` — the host sandbox
    /// already exists and only the user's repo needs cloning in.
    pub fn with_initial_status(
        config: SandboxConfig,
        status: SandboxStatus,
        reason: &str,
        epoch_ms: u64,
    ) -> Self {
        Self {
            id: config.id,
            name: config.name,
            session_id: config.session_id,
            repo_id: config.repo_id,
            team_id: config.team_id,
            owner_id: config.owner_id,
            placement: Placement::default(),
            api_secret: config.api_secret,
            status,
            status_changed_at_ms: epoch_ms,
            retry_count: 0,
            last_error: None,
            created_at_ms: epoch_ms,
            last_heartbeat_ms: None,
            destroyed_at_ms: None,
            effective_branch: config.target_branch.clone(),
            target_branch: config.target_branch,
            branch_fell_back: false,
            commit_sha: None,
            status_history: vec![StatusEntry {
                status,
                at_ms: epoch_ms,
                reason: reason.to_string(),
            }],
        }
    }

    /// Apply a transition: set the status, stamp `status_changed_at_ms`, and
    /// append one history entry. Duplicate transitions to the current status
    /// are collapsed (no second entry).
    ///
    /// Validation against the successor set happens in the engine before the
    /// transition event is committed; this method applies blindly so that WAL
    /// replay reproduces exactly what was accepted.
    pub fn transition(&mut self, status: SandboxStatus, reason: &str, at_ms: u64) {
        if self.status == status {
            return;
        }
        self.status = status;
        self.status_changed_at_ms = at_ms;
        self.status_history.push(StatusEntry { status, at_ms, reason: reason.to_string() });
        if status == SandboxStatus::Destroyed {
            self.destroyed_at_ms = Some(at_ms);
        }
        if self.status_history.len() > HISTORY_COMPACT_THRESHOLD {
            self.compact_history();
        }
    }

    /// Annotate the history without changing status (e.g. branch fallback).
    /// The entry carries the current status so the last-entry invariant holds.
    pub fn annotate(&mut self, reason: &str, at_ms: u64) {
        self.status_history.push(StatusEntry {
            status: self.status,
            at_ms,
            reason: reason.to_string(),
        });
    }

    /// Record a heartbeat; timestamps only move forward.
    pub fn record_heartbeat(&mut self, at_ms: u64) {
        let prev = self.last_heartbeat_ms.unwrap_or(0);
        self.last_heartbeat_ms = Some(prev.max(at_ms));
    }

    /// Milliseconds since the last heartbeat, falling back to the last status
    /// change so fresh sandboxes are not reaped before their first beat.
    pub fn heartbeat_lapse_ms(&self, now_ms: u64) -> u64 {
        let anchor = self.last_heartbeat_ms.unwrap_or(self.status_changed_at_ms);
        now_ms.saturating_sub(anchor)
    }

    /// Milliseconds spent in the current status.
    pub fn ms_in_status(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.status_changed_at_ms)
    }

    /// Collapse interior runs of ready↔active flips into single aggregated
    /// entries so long-lived sandboxes keep a bounded history. The first and
    /// last entry of each run are preserved.
    fn compact_history(&mut self) {
        let mut compacted: Vec<StatusEntry> = Vec::with_capacity(self.status_history.len());
        let mut run: Vec<StatusEntry> = Vec::new();
        let flush_run = |run: &mut Vec<StatusEntry>, out: &mut Vec<StatusEntry>| {
            if run.len() <= 2 {
                out.append(run);
                return;
            }
            let collapsed = run.len() - 2;
            let first = run.remove(0);
            let last = match run.pop() {
                Some(e) => e,
                None => return,
            };
            out.push(first);
            out.push(StatusEntry {
                status: last.status,
                at_ms: last.at_ms,
                reason: format!("activity_compacted:{collapsed}"),
            });
        };
        for entry in self.status_history.drain(..) {
            let is_activity =
                matches!(entry.status, SandboxStatus::Ready | SandboxStatus::Active);
            if is_activity {
                run.push(entry);
            } else {
                flush_run(&mut run, &mut compacted);
                compacted.push(entry);
            }
        }
        flush_run(&mut run, &mut compacted);
        self.status_history = compacted;
    }
}

/// Test builder: a record with plausible defaults, adjusted in place.
#[cfg(any(test, feature = "test-support"))]
pub struct SandboxRecordBuilder {
    record: SandboxRecord,
}

#[cfg(any(test, feature = "test-support"))]
impl SandboxRecordBuilder {
    /// A sandbox that looks freshly requested at epoch 1_000_000.
    fn with_test_defaults() -> Self {
        let config = SandboxConfig::builder(
            SandboxId::from_string("sbx-test0000000000000"),
            SessionId::from_string("sess-test000000000000"),
            "acme/widgets",
        )
        .name("sbx-test")
        .api_secret("secret-0000")
        .target_branch("main")
        .build();
        Self { record: SandboxRecord::new(config, 1_000_000) }
    }

    /// Force a status without touching the seeded history; tests asserting
    /// history start from the transition under test.
    pub fn status(mut self, status: SandboxStatus) -> Self {
        self.record.status = status;
        self
    }

    pub fn status_changed_at_ms(mut self, at_ms: u64) -> Self {
        self.record.status_changed_at_ms = at_ms;
        self
    }

    pub fn last_heartbeat_ms(mut self, at_ms: u64) -> Self {
        self.record.last_heartbeat_ms = Some(at_ms);
        self
    }

    pub fn build(self) -> SandboxRecord {
        self.record
    }
}

#[cfg(any(test, feature = "test-support"))]
impl SandboxRecord {
    /// Create a builder with test defaults.
    pub fn builder() -> SandboxRecordBuilder {
        SandboxRecordBuilder::with_test_defaults()
    }
}

#[cfg(test)]
#[path = "sandbox_tests.rs"]
mod tests;

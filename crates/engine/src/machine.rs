// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Central transition enforcement and host-callback application.
//!
//! All status mutations flow through here. A transition is validated against
//! the successor set and committed in the same store critical section, so a
//! decision can never race another committer. Host callbacks get the looser
//! monotone-phase rule: setup phases may be skipped forward, never crossed
//! backward.

use crate::error::EngineError;
use crate::orchestrator::Orchestrator;
use sb_core::sandbox::{CallbackStatus, SandboxId, SandboxStatus};
use sb_core::{Clock, Event};
use sb_githost::SourceHost;
use sb_host::HostBackend;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("sandbox not found: {0}")]
    NotFound(String),

    #[error("invalid transition {from} -> {to}")]
    Invalid { from: SandboxStatus, to: SandboxStatus },
}

/// Inbound `POST /sandbox-status` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCallback {
    pub sandbox_name: String,
    pub api_secret: String,
    pub status: CallbackStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_log: Option<String>,
    /// Cache artifacts the host built or restored during this setup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<CheckpointReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageReport {
    pub tag: String,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub commit_sha: String,
    #[serde(default)]
    pub failed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointReport {
    pub name: String,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub commit_sha: String,
}

/// How a callback was handled. Accepted and Ignored both answer
/// `{success: true}`; the failure outcomes answer `{success: false}` with an
/// error string (still HTTP 200, to avoid client retry storms).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    Accepted,
    /// Duplicate, stale, or teardown-phase callback — idempotent no-op
    Ignored,
    SecretMismatch,
    UnknownSandbox,
}

impl CallbackOutcome {
    pub fn success(self) -> bool {
        matches!(self, CallbackOutcome::Accepted | CallbackOutcome::Ignored)
    }

    pub fn error(self) -> Option<&'static str> {
        match self {
            CallbackOutcome::SecretMismatch => Some("secret mismatch"),
            CallbackOutcome::UnknownSandbox => Some("unknown sandbox"),
            _ => None,
        }
    }
}

impl<H, S, C> Orchestrator<H, S, C>
where
    H: HostBackend,
    S: SourceHost,
    C: Clock,
{
    /// Transition a sandbox, enforcing the successor set. Rejected
    /// transitions leave the record untouched and return the failure;
    /// the caller decides whether to retry or escalate.
    pub fn transition(
        &self,
        id: &SandboxId,
        to: SandboxStatus,
        reason: &str,
    ) -> Result<(), EngineError> {
        let at_ms = self.now_ms();
        let result = self.store.transact(|state| {
            let Some(record) = state.sandboxes.get(id) else {
                return (Vec::new(), Err(TransitionError::NotFound(id.to_string())));
            };
            if record.status == to {
                // Re-asserting the current status is a no-op, not an error.
                return (Vec::new(), Ok(()));
            }
            if !record.status.can_transition(to) {
                return (
                    Vec::new(),
                    Err(TransitionError::Invalid { from: record.status, to }),
                );
            }
            (
                vec![Event::SandboxTransitioned {
                    id: *id,
                    status: to,
                    reason: reason.to_string(),
                    at_ms,
                }],
                Ok(()),
            )
        })?;
        if let Err(e) = &result {
            tracing::warn!(sandbox_id = %id, to = %to, reason, error = %e, "transition rejected");
        }
        result.map_err(EngineError::from)
    }

    /// Apply a host status callback from `POST /sandbox-status`.
    ///
    /// Rules, in order: unknown name and secret mismatch fail (soft);
    /// teardown statuses ignore everything; `failed` routes to unhealthy;
    /// duplicates are no-ops; setup phases advance only monotonically.
    pub fn apply_callback(&self, callback: &StatusCallback) -> Result<CallbackOutcome, EngineError> {
        let at_ms = self.now_ms();
        let outcome = self.store.transact(|state| {
            let Some(record) = state.sandbox_by_name(&callback.sandbox_name) else {
                return (Vec::new(), CallbackOutcome::UnknownSandbox);
            };
            if record.api_secret != callback.api_secret {
                return (Vec::new(), CallbackOutcome::SecretMismatch);
            }
            if record.status.is_teardown() {
                return (Vec::new(), CallbackOutcome::Ignored);
            }

            let mut events = Vec::new();
            discovery_events(&mut events, record.repo_id.clone(), record, callback, at_ms);

            match callback.status.target_status() {
                None => {
                    // Host reported failure at some phase.
                    if let Some(message) = &callback.error_message {
                        events.push(Event::SandboxErrorRecorded {
                            id: record.id,
                            error: message.clone(),
                        });
                    }
                    if record.status.can_transition(SandboxStatus::Unhealthy) {
                        events.push(Event::SandboxTransitioned {
                            id: record.id,
                            status: SandboxStatus::Unhealthy,
                            reason: "host_reported_failure".to_string(),
                            at_ms,
                        });
                        (events, CallbackOutcome::Accepted)
                    } else {
                        (events, CallbackOutcome::Ignored)
                    }
                }
                Some(target) if target == record.status => {
                    // Duplicate callback at the current phase.
                    (events, CallbackOutcome::Ignored)
                }
                Some(target) => {
                    match (record.status.phase_order(), target.phase_order()) {
                        (Some(current), Some(next)) if next > current => {
                            events.push(Event::SandboxTransitioned {
                                id: record.id,
                                status: target,
                                reason: "host_callback".to_string(),
                                at_ms,
                            });
                            (events, CallbackOutcome::Accepted)
                        }
                        // Out-of-order (stale) or outside the setup pipeline.
                        _ => (events, CallbackOutcome::Ignored),
                    }
                }
            }
        })?;
        Ok(outcome)
    }

    /// Record a browser heartbeat by sandbox name. Promotes `ready` to
    /// `active`; the demotion path belongs to check-heartbeats.
    pub fn record_heartbeat(&self, sandbox_name: &str) -> Result<(), EngineError> {
        let at_ms = self.now_ms();
        let found = self.store.transact(|state| {
            let Some(record) = state.sandbox_by_name(sandbox_name) else {
                return (Vec::new(), false);
            };
            let mut events = vec![Event::SandboxHeartbeat { id: record.id, at_ms }];
            if record.status == SandboxStatus::Ready {
                events.push(Event::SandboxTransitioned {
                    id: record.id,
                    status: SandboxStatus::Active,
                    reason: "heartbeat".to_string(),
                    at_ms,
                });
            }
            (events, true)
        })?;
        if found {
            Ok(())
        } else {
            Err(EngineError::SandboxNotFound(sandbox_name.to_string()))
        }
    }

    /// User-requested termination.
    pub fn stop_sandbox(&self, id: &SandboxId) -> Result<(), EngineError> {
        self.transition(id, SandboxStatus::Stopping, "user_stop")
    }
}

/// Image/checkpoint hints carried on the callback become discovery events.
fn discovery_events(
    events: &mut Vec<Event>,
    repo_id: String,
    record: &sb_core::SandboxRecord,
    callback: &StatusCallback,
    at_ms: u64,
) {
    if let Some(image) = &callback.image {
        events.push(Event::RepoImageDiscovered {
            repo_id: repo_id.clone(),
            branch: record.effective_branch.clone(),
            tag: image.tag.clone(),
            size_bytes: image.size_bytes,
            commit_sha: image.commit_sha.clone(),
            status: if image.failed {
                sb_core::ImageStatus::Failed
            } else {
                sb_core::ImageStatus::Ready
            },
            at_ms,
        });
    }
    if let Some(checkpoint) = &callback.checkpoint {
        events.push(Event::CheckpointDiscovered {
            repo_id,
            branch: record.effective_branch.clone(),
            name: checkpoint.name.clone(),
            size_bytes: checkpoint.size_bytes,
            commit_sha: checkpoint.commit_sha.clone(),
            at_ms,
        });
    }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::event::Event;
use crate::pool::PoolKind;
use crate::sandbox::{SandboxId, SandboxStatus};
use crate::session::MessageRole;
use crate::{MessageId, PoolEntryId, SessionId};

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for core state machine types.
pub mod strategies {
    use crate::pool::PoolStatus;
    use crate::sandbox::SandboxStatus;
    use proptest::prelude::*;

    pub fn arb_sandbox_status() -> impl Strategy<Value = SandboxStatus> {
        prop::sample::select(SandboxStatus::all().to_vec())
    }

    pub fn arb_pool_status() -> impl Strategy<Value = PoolStatus> {
        prop_oneof![
            Just(PoolStatus::Creating),
            Just(PoolStatus::Ready),
            Just(PoolStatus::Assigned),
            Just(PoolStatus::Destroying),
            Just(PoolStatus::Failed),
        ]
    }
}

// ── Event factory functions ─────────────────────────────────────────────────

pub fn sandbox_requested_event(id: &str, session: &str, repo: &str) -> Event {
    Event::SandboxRequested {
        id: SandboxId::from_string(id),
        name: format!("sbx-{id}"),
        session_id: SessionId::from_string(session),
        repo_id: repo.to_string(),
        team_id: String::new(),
        owner_id: String::new(),
        api_secret: "secret-0000".to_string(),
        target_branch: "main".to_string(),
        at_ms: 1_000_000,
    }
}

pub fn sandbox_transitioned_event(id: &str, status: SandboxStatus, reason: &str) -> Event {
    Event::SandboxTransitioned {
        id: SandboxId::from_string(id),
        status,
        reason: reason.to_string(),
        at_ms: 1_000_000,
    }
}

pub fn pool_entry_created_event(id: &str, kind: PoolKind) -> Event {
    Event::PoolEntryCreated {
        id: PoolEntryId::from_string(id),
        name: format!("pool-{id}"),
        kind,
        at_ms: 1_000_000,
    }
}

pub fn session_created_event(id: &str, repo: &str, branch: &str) -> Event {
    Event::SessionCreated {
        id: SessionId::from_string(id),
        repo_id: repo.to_string(),
        branch: branch.to_string(),
        work_branch: None,
        at_ms: 1_000_000,
    }
}

pub fn message_created_event(id: &str, session: &str, role: MessageRole, content: &str) -> Event {
    Event::MessageCreated {
        id: MessageId::from_string(id),
        session_id: SessionId::from_string(session),
        role,
        content: content.to_string(),
        at_ms: 1_000_000,
    }
}

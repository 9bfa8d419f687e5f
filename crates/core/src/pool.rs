// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pre-warmed pool entries.

use serde::{Deserialize, Serialize};

use crate::sandbox::Placement;
use crate::PoolEntryId;

/// Which pool an entry belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PoolKind {
    /// Base image, no repo affinity
    Generic,
    /// Pre-built repo image with a persistent dependency-cache volume
    RepoAffine {
        repo_id: String,
        image_tag: String,
        volume_name: String,
    },
}

impl PoolKind {
    pub fn repo_id(&self) -> Option<&str> {
        match self {
            PoolKind::Generic => None,
            PoolKind::RepoAffine { repo_id, .. } => Some(repo_id),
        }
    }
}

crate::label_enum! {
    PoolKind {
        Generic: "generic",
        RepoAffine { .. }: "repo_affine",
    }
}

/// Linear pool-entry status. No retries: failed entries are destroyed
/// and replaced by the next replenish tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    Creating,
    Ready,
    Assigned,
    Destroying,
    Failed,
}

crate::label_enum! {
    PoolStatus {
        Creating: "creating",
        Ready: "ready",
        Assigned: "assigned",
        Destroying: "destroying",
        Failed: "failed",
    }
}

/// A pre-created sandbox held ready for assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolEntry {
    pub id: PoolEntryId,
    /// Host-facing sandbox name
    pub name: String,
    pub kind: PoolKind,
    pub status: PoolStatus,
    #[serde(default)]
    pub placement: Placement,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl PoolEntry {
    pub fn new(id: PoolEntryId, name: impl Into<String>, kind: PoolKind, epoch_ms: u64) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            status: PoolStatus::Creating,
            placement: Placement::default(),
            created_at_ms: epoch_ms,
            assigned_at_ms: None,
            last_error: None,
        }
    }

    /// Counts toward the pool's fill level (target comparison).
    pub fn is_pending_or_ready(&self) -> bool {
        matches!(self.status, PoolStatus::Creating | PoolStatus::Ready)
    }

    /// An `assigned` entry older than the GC window is considered leaked.
    pub fn assignment_age_ms(&self, now_ms: u64) -> Option<u64> {
        self.assigned_at_ms.map(|at| now_ms.saturating_sub(at))
    }
}

/// Test builder: an entry with plausible defaults, adjusted in place.
#[cfg(any(test, feature = "test-support"))]
pub struct PoolEntryBuilder {
    entry: PoolEntry,
}

#[cfg(any(test, feature = "test-support"))]
impl PoolEntryBuilder {
    pub fn kind(mut self, kind: PoolKind) -> Self {
        self.entry.kind = kind;
        self
    }

    pub fn status(mut self, status: PoolStatus) -> Self {
        self.entry.status = status;
        self
    }

    pub fn assigned_at_ms(mut self, at_ms: u64) -> Self {
        self.entry.assigned_at_ms = Some(at_ms);
        self
    }

    pub fn build(self) -> PoolEntry {
        self.entry
    }
}

#[cfg(any(test, feature = "test-support"))]
impl PoolEntry {
    /// Create a builder with test defaults.
    pub fn builder() -> PoolEntryBuilder {
        PoolEntryBuilder {
            entry: PoolEntry::new(
                PoolEntryId::from_string("pool-test000000000000"),
                "pool-test",
                PoolKind::Generic,
                1_000_000,
            ),
        }
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `(status, status_changed_at)` range index over sandbox records.
//!
//! Backs the scheduler's batch scans: "oldest N records in status S" and
//! "records in S older than T" without walking the whole table.

use sb_core::sandbox::{SandboxId, SandboxStatus};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default, Clone)]
pub(crate) struct StatusIndex {
    by_status: HashMap<SandboxStatus, BTreeSet<(u64, SandboxId)>>,
}

impl StatusIndex {
    pub(crate) fn insert(&mut self, status: SandboxStatus, at_ms: u64, id: SandboxId) {
        self.by_status.entry(status).or_default().insert((at_ms, id));
    }

    pub(crate) fn remove(&mut self, status: SandboxStatus, at_ms: u64, id: SandboxId) {
        if let Some(set) = self.by_status.get_mut(&status) {
            set.remove(&(at_ms, id));
            if set.is_empty() {
                self.by_status.remove(&status);
            }
        }
    }

    /// Oldest `limit` ids in `status`, ascending by status-change time.
    pub(crate) fn scan(&self, status: SandboxStatus, limit: usize) -> Vec<SandboxId> {
        match self.by_status.get(&status) {
            Some(set) => set.iter().take(limit).map(|(_, id)| *id).collect(),
            None => Vec::new(),
        }
    }

    /// Oldest `limit` ids in `status` with change time strictly before
    /// `cutoff_ms`.
    pub(crate) fn scan_older_than(
        &self,
        status: SandboxStatus,
        cutoff_ms: u64,
        limit: usize,
    ) -> Vec<SandboxId> {
        match self.by_status.get(&status) {
            Some(set) => set
                .iter()
                .take_while(|(at, _)| *at < cutoff_ms)
                .take(limit)
                .map(|(_, id)| *id)
                .collect(),
            None => Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.by_status.values().map(|s| s.len()).sum()
    }
}

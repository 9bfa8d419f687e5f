// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconciliation between the store's view and the host daemon's actual set.
//!
//! Drift is repaired in both directions: records pointing at host sandboxes
//! that no longer exist go unhealthy; host sandboxes nothing references are
//! orphans and get deleted. Ready pool entries are held to the same
//! standard — their invariant is a live host sandbox.

use crate::error::EngineError;
use crate::orchestrator::Orchestrator;
use sb_core::pool::PoolStatus;
use sb_core::sandbox::{SandboxId, SandboxStatus};
use sb_core::{Clock, Event, PoolEntryId};
use sb_githost::SourceHost;
use sb_host::HostBackend;
use std::collections::HashSet;

impl<H, S, C> Orchestrator<H, S, C>
where
    H: HostBackend,
    S: SourceHost,
    C: Clock + 'static,
{
    /// One reconcile pass. Returns the number of repairs made.
    pub async fn reconcile(&self) -> Result<usize, EngineError> {
        let live: HashSet<String> =
            self.host.list().await?.into_iter().map(|s| s.id).collect();

        struct Drift {
            lost_sandboxes: Vec<SandboxId>,
            lost_pool_entries: Vec<PoolEntryId>,
            orphans: Vec<String>,
        }

        let drift = self.store.read(|state| {
            let mut referenced: HashSet<&str> = HashSet::new();
            let mut lost_sandboxes = Vec::new();
            for record in state.sandboxes.values() {
                if !record.placement.is_placed() {
                    continue;
                }
                referenced.insert(record.placement.host_id.as_str());
                let reapable = !record.status.is_terminal()
                    && !record.status.is_teardown()
                    && record.status != SandboxStatus::Unhealthy;
                if reapable && !live.contains(&record.placement.host_id) {
                    lost_sandboxes.push(record.id);
                }
            }

            let mut lost_pool_entries = Vec::new();
            for entry in state.pool.values() {
                if entry.placement.is_placed() {
                    referenced.insert(entry.placement.host_id.as_str());
                    if entry.status == PoolStatus::Ready
                        && !live.contains(&entry.placement.host_id)
                    {
                        lost_pool_entries.push(entry.id);
                    }
                }
            }

            let orphans: Vec<String> = live
                .iter()
                .filter(|id| !referenced.contains(id.as_str()))
                .cloned()
                .collect();

            Drift { lost_sandboxes, lost_pool_entries, orphans }
        });

        let mut repairs = 0;

        for id in drift.lost_sandboxes {
            match self.transition(&id, SandboxStatus::Unhealthy, "host_missing") {
                Ok(()) => repairs += 1,
                Err(e) => tracing::warn!(sandbox_id = %id, error = %e, "reconcile reap skipped"),
            }
        }

        for id in drift.lost_pool_entries {
            self.store.commit(&[Event::PoolEntryStatusChanged {
                id,
                status: PoolStatus::Failed,
                at_ms: self.now_ms(),
                error: Some("host sandbox missing".to_string()),
            }])?;
            repairs += 1;
        }

        for host_id in drift.orphans {
            tracing::warn!(host_id = %host_id, "destroying orphan host sandbox");
            if let Err(e) = self.host.destroy(&host_id).await {
                tracing::warn!(host_id = %host_id, error = %e, "orphan destroy failed");
                continue;
            }
            repairs += 1;
        }

        Ok(repairs)
    }

    /// Startup recovery: one reconcile pass, then resume provisioning for
    /// records whose create/setup task died with the previous process.
    /// Every provisioning step is restartable, so re-running is safe.
    pub async fn recover_on_startup(&self) -> Result<(), EngineError> {
        match self.reconcile().await {
            Ok(repairs) if repairs > 0 => {
                tracing::info!(repairs, "startup reconcile repaired drift")
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "startup reconcile failed, continuing"),
        }

        let resumable: Vec<SandboxId> = self.store.read(|state| {
            state
                .sandboxes
                .values()
                .filter(|r| {
                    matches!(r.status, SandboxStatus::Creating)
                        || (r.status == SandboxStatus::Cloning && r.placement.is_placed())
                })
                .map(|r| r.id)
                .collect()
        });

        if !resumable.is_empty() {
            tracing::info!(count = resumable.len(), "resuming interrupted provisioning");
        }
        for id in resumable {
            let this = self.clone();
            tokio::spawn(async move { this.provision(id).await });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;

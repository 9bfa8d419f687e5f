// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pool manager: replenishment and garbage collection.
//!
//! Assignment lives in the provisioning flow — it must share a transaction
//! with the sandbox-record insert. Replenishment runs under one creation
//! budget shared between the generic and repo-affine pools; the generic pool
//! is filled first.

use crate::orchestrator::Orchestrator;
use sb_core::pool::{PoolKind, PoolStatus};
use sb_core::sandbox::Placement;
use sb_core::{Clock, Event, PoolEntryId};
use sb_githost::SourceHost;
use sb_host::{CreateSandboxRequest, HostBackend};
use sb_storage::StoreError;

impl<H, S, C> Orchestrator<H, S, C>
where
    H: HostBackend,
    S: SourceHost,
    C: Clock + 'static,
{
    /// One replenish pass. Returns how many entries were scheduled.
    pub async fn replenish_pool(&self) -> Result<usize, StoreError> {
        let now_ms = self.now_ms();
        let pool = &self.config.pool;

        let plan: Vec<PoolKind> = self.store.read(|state| {
            let mut budget =
                pool.max_creating.saturating_sub(state.pool_creating_total());
            let generic_fill = state.pool_fill(None);
            // The floor overrides the budget: a drained pool refills even
            // when every creation slot is busy.
            if generic_fill < pool.min_size {
                budget = budget.max(pool.min_size - generic_fill);
            }
            let mut plan = Vec::new();

            // Generic pool first.
            let deficit = pool.target_size.saturating_sub(generic_fill);
            for _ in 0..deficit {
                if budget == 0 {
                    break;
                }
                plan.push(PoolKind::Generic);
                budget -= 1;
            }

            // One warm entry per hot repo, with whatever budget remains.
            for image in state.hot_repo_images(now_ms, pool.hot_repo_window_ms()) {
                if budget == 0 {
                    break;
                }
                if state.pool_fill(Some(&image.repo_id)) < pool.repo_target {
                    plan.push(PoolKind::RepoAffine {
                        repo_id: image.repo_id.clone(),
                        image_tag: image.tag.clone(),
                        volume_name: volume_name(&image.repo_id),
                    });
                    budget -= 1;
                }
            }
            plan
        });

        let scheduled = plan.len();
        for kind in plan {
            let id = PoolEntryId::new();
            let name = format!("pool-{}", id.short(8));
            self.store.commit(&[Event::PoolEntryCreated {
                id,
                name: name.clone(),
                kind: kind.clone(),
                at_ms: now_ms,
            }])?;

            let this = self.clone();
            tokio::spawn(async move { this.create_pool_entry(id, name, kind).await });
        }
        Ok(scheduled)
    }

    /// Create the host sandbox behind a pool entry and mark it ready.
    pub async fn create_pool_entry(&self, id: PoolEntryId, name: String, kind: PoolKind) {
        let (image, volume) = match &kind {
            PoolKind::Generic => (self.config.host.default_base_image.clone(), None),
            PoolKind::RepoAffine { image_tag, volume_name, .. } => {
                (image_tag.clone(), Some(volume_name.clone()))
            }
        };
        let request = CreateSandboxRequest { name, image, volume };

        let events = match self.host.create(&request).await {
            Ok(created) => vec![
                Event::PoolEntryPlaced {
                    id,
                    placement: Placement {
                        host_id: created.host_id,
                        host_port: created.host_port,
                        ..Placement::default()
                    },
                },
                Event::PoolEntryStatusChanged {
                    id,
                    status: PoolStatus::Ready,
                    at_ms: self.now_ms(),
                    error: None,
                },
            ],
            Err(e) => {
                tracing::warn!(pool_entry = %id, error = %e, "pool entry create failed");
                vec![Event::PoolEntryStatusChanged {
                    id,
                    status: PoolStatus::Failed,
                    at_ms: self.now_ms(),
                    error: Some(e.to_string()),
                }]
            }
        };
        if let Err(e) = self.store.commit(&events) {
            tracing::error!(pool_entry = %id, error = %e, "failed to record pool entry state");
        }
    }

    /// One GC pass: destroy failed entries, drop leaked assignments.
    pub async fn gc_pool(&self) -> Result<usize, StoreError> {
        let now_ms = self.now_ms();
        let stale_ms = self.config.pool.stale_assignment_ms();

        let (failed, leaked) = self.store.read(|state| {
            let failed: Vec<(PoolEntryId, String)> = state
                .pool_in_status(PoolStatus::Failed)
                .into_iter()
                .map(|e| (e.id, e.placement.host_id.clone()))
                .collect();
            let leaked: Vec<PoolEntryId> = state
                .pool_in_status(PoolStatus::Assigned)
                .into_iter()
                .filter(|e| e.assignment_age_ms(now_ms).map(|age| age > stale_ms).unwrap_or(false))
                .map(|e| e.id)
                .collect();
            (failed, leaked)
        });

        let mut collected = 0;
        for (id, host_id) in failed {
            if !host_id.is_empty() {
                if let Err(e) = self.host.destroy(&host_id).await {
                    tracing::warn!(pool_entry = %id, error = %e, "pool destroy failed, retrying next pass");
                    continue;
                }
            }
            self.store.commit(&[Event::PoolEntryDeleted { id }])?;
            collected += 1;
        }

        for id in leaked {
            // The sandbox record took ownership of the host sandbox when it
            // was assigned; only the pool row is deleted.
            tracing::warn!(pool_entry = %id, "stale assigned pool entry, dropping row");
            self.store.commit(&[Event::PoolEntryDeleted { id }])?;
            collected += 1;
        }
        Ok(collected)
    }
}

/// Stable volume name for a repo's dependency cache.
fn volume_name(repo_id: &str) -> String {
    let slug: String = repo_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    format!("deps-{slug}")
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic scheduler tasks.
//!
//! Every task is idempotent: it scans the store by `(status, changed_at)`,
//! takes a bounded batch, and commits per record, so a crash mid-tick just
//! means the next tick re-observes the same records. One record's failure
//! never blocks the rest of its batch.

use crate::orchestrator::Orchestrator;
use futures_util::future::join_all;
use sb_core::sandbox::{SandboxId, SandboxStatus};
use sb_core::{Clock, Event};
use sb_githost::SourceHost;
use sb_host::HostBackend;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

impl<H, S, C> Orchestrator<H, S, C>
where
    H: HostBackend,
    S: SourceHost,
    C: Clock + 'static,
{
    /// Pick up `requested` sandboxes, move them to `creating`, and run the
    /// provisioning flow for each.
    pub async fn process_requested(&self) -> usize {
        let batch: Vec<SandboxId> = self.store.read(|s| {
            s.sandboxes_in_status(SandboxStatus::Requested, self.config.scheduler.batch_size)
                .iter()
                .map(|r| r.id)
                .collect()
        });

        let mut picked = Vec::new();
        for id in batch {
            // The transition is the claim: a record in `creating` is
            // off-limits to the next tick.
            match self.transition(&id, SandboxStatus::Creating, "scheduler_pickup") {
                Ok(()) => picked.push(id),
                Err(e) => {
                    tracing::warn!(sandbox_id = %id, error = %e, "requested pickup skipped")
                }
            }
        }

        let count = picked.len();
        join_all(picked.into_iter().map(|id| {
            let this = self.clone();
            async move { this.provision(id).await }
        }))
        .await;
        count
    }

    /// Reap sandboxes stuck in a transitional status past its timeout.
    pub async fn check_timeouts(&self) -> usize {
        let now_ms = self.now_ms();
        let batch_size = self.config.scheduler.batch_size;
        let mut reaped = 0;

        for status in SandboxStatus::all().iter().filter(|s| s.is_transitional()) {
            let Some(timeout) = self.config.timeouts.for_status(*status) else {
                continue;
            };
            let cutoff = now_ms.saturating_sub(timeout.as_millis() as u64);
            let stale: Vec<SandboxId> = self.store.read(|s| {
                s.sandboxes_in_status_older_than(*status, cutoff, batch_size)
                    .iter()
                    .map(|r| r.id)
                    .collect()
            });
            for id in stale {
                let reason = format!("{}_timeout", status.label());
                match self.transition(&id, SandboxStatus::Unhealthy, &reason) {
                    Ok(()) => reaped += 1,
                    Err(e) => {
                        tracing::warn!(sandbox_id = %id, error = %e, "timeout reap skipped")
                    }
                }
            }
        }
        reaped
    }

    /// Demote or stop sandboxes whose heartbeats lapsed.
    pub async fn check_heartbeats(&self) -> usize {
        let now_ms = self.now_ms();
        let warning_ms = self.config.heartbeat.warning_ms();
        let stop_ms = self.config.heartbeat.stop_ms();
        let batch_size = self.config.scheduler.batch_size;

        #[derive(Clone, Copy)]
        enum Action {
            Stop,
            Demote,
        }

        let mut plan: Vec<(SandboxId, Action, &'static str)> = Vec::new();
        self.store.read(|s| {
            for record in s.sandboxes_in_status(SandboxStatus::Active, batch_size) {
                let lapse = record.heartbeat_lapse_ms(now_ms);
                if lapse > stop_ms {
                    plan.push((record.id, Action::Stop, "no_heartbeat_timeout"));
                } else if lapse > warning_ms {
                    plan.push((record.id, Action::Demote, "heartbeat_warning"));
                }
            }
            for record in s.sandboxes_in_status(SandboxStatus::Ready, batch_size) {
                if record.heartbeat_lapse_ms(now_ms) > stop_ms {
                    plan.push((record.id, Action::Stop, "no_activity_timeout"));
                }
            }
        });

        let mut changed = 0;
        for (id, action, reason) in plan {
            let target = match action {
                Action::Stop => SandboxStatus::Stopping,
                Action::Demote => SandboxStatus::Ready,
            };
            match self.transition(&id, target, reason) {
                Ok(()) => changed += 1,
                Err(e) => tracing::warn!(sandbox_id = %id, error = %e, "heartbeat action skipped"),
            }
        }
        changed
    }

    /// `stopping → destroying`, destroying on the host.
    pub async fn process_stopping(&self) -> usize {
        self.drive_teardown(SandboxStatus::Stopping, "scheduler_destroy").await
    }

    /// `unhealthy → destroying`, destroying on the host.
    pub async fn process_unhealthy(&self) -> usize {
        self.drive_teardown(SandboxStatus::Unhealthy, "unhealthy_destroy").await
    }

    async fn drive_teardown(&self, from: SandboxStatus, reason: &str) -> usize {
        let batch: Vec<(SandboxId, String)> = self.store.read(|s| {
            s.sandboxes_in_status(from, self.config.scheduler.batch_size)
                .iter()
                .map(|r| (r.id, r.placement.host_id.clone()))
                .collect()
        });

        let mut claimed = Vec::new();
        for (id, host_id) in batch {
            match self.transition(&id, SandboxStatus::Destroying, reason) {
                Ok(()) => claimed.push((id, host_id)),
                Err(e) => tracing::warn!(sandbox_id = %id, error = %e, "teardown claim skipped"),
            }
        }

        let count = claimed.len();
        join_all(claimed.into_iter().map(|(id, host_id)| {
            let this = self.clone();
            async move { this.destroy_on_host(id, host_id).await }
        }))
        .await;
        count
    }

    pub(crate) async fn destroy_on_host(&self, id: SandboxId, host_id: String) {
        let result = if host_id.is_empty() {
            // Never placed; nothing to tear down on the host.
            Ok(())
        } else {
            self.host.destroy(&host_id).await
        };
        match result {
            Ok(()) => {
                if let Err(e) =
                    self.transition(&id, SandboxStatus::Destroyed, "host_destroy_complete")
                {
                    tracing::warn!(sandbox_id = %id, error = %e, "destroyed transition rejected");
                }
            }
            Err(e) => {
                self.mark_unhealthy(&id, "host_destroy_failed", &e.to_string());
            }
        }
    }

    pub(crate) async fn reconcile_tick(&self) -> usize {
        self.reconcile().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "reconcile tick failed");
            0
        })
    }

    pub(crate) async fn replenish_tick(&self) -> usize {
        self.replenish_pool().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "pool replenish tick failed");
            0
        })
    }

    pub(crate) async fn gc_tick(&self) -> usize {
        self.gc_pool().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "pool gc tick failed");
            0
        })
    }

    /// Delete tombstones older than the retention window.
    pub async fn cleanup_old(&self) -> usize {
        let cutoff = self
            .now_ms()
            .saturating_sub(self.config.scheduler.destroyed_retention_ms());
        let old: Vec<SandboxId> = self.store.read(|s| {
            s.sandboxes_in_status_older_than(
                SandboxStatus::Destroyed,
                cutoff,
                self.config.scheduler.batch_size,
            )
            .iter()
            .filter(|r| r.destroyed_at_ms.map(|at| at < cutoff).unwrap_or(true))
            .map(|r| r.id)
            .collect()
        });

        let mut deleted = 0;
        for id in old {
            match self.store.commit(&[Event::SandboxDeleted { id }]) {
                Ok(()) => deleted += 1,
                Err(e) => tracing::warn!(sandbox_id = %id, error = %e, "cleanup delete failed"),
            }
        }
        deleted
    }
}

/// Spawn every periodic task at its configured cadence. Loops exit when
/// `shutdown` fires.
pub fn spawn_scheduler<H, S, C>(
    orchestrator: Orchestrator<H, S, C>,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>>
where
    H: HostBackend,
    S: SourceHost,
    C: Clock + 'static,
{
    let cfg = Arc::new(orchestrator.config().scheduler.clone());

    macro_rules! tick_loop {
        ($name:literal, $period_secs:expr, $method:ident) => {{
            let orch = orchestrator.clone();
            let shutdown = shutdown.clone();
            let period = Duration::from_secs($period_secs);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = interval.tick() => {
                            let n = orch.$method().await;
                            if n > 0 {
                                tracing::debug!(task = $name, records = n, "tick");
                            }
                        }
                    }
                }
            })
        }};
    }

    vec![
        tick_loop!("process-requested", cfg.process_requested_secs, process_requested),
        tick_loop!("check-heartbeats", cfg.check_heartbeats_secs, check_heartbeats),
        tick_loop!("check-timeouts", cfg.check_timeouts_secs, check_timeouts),
        tick_loop!("process-stopping", cfg.process_stopping_secs, process_stopping),
        tick_loop!("process-unhealthy", cfg.process_unhealthy_secs, process_unhealthy),
        tick_loop!("reconcile", cfg.reconcile_secs, reconcile_tick),
        tick_loop!("cleanup-old", cfg.cleanup_old_secs, cleanup_old),
        tick_loop!("pool-replenish", cfg.pool_replenish_secs, replenish_tick),
        tick_loop!("pool-gc", cfg.pool_gc_secs, gc_tick),
    ]
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

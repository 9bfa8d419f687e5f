// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The durable store: WAL + snapshot + materialized state behind one lock.
//!
//! `commit` is the transaction boundary of the whole control plane: events
//! are appended to the WAL, flushed, and applied to the materialized state
//! while the lock is held. Concurrent tasks therefore observe state only at
//! commit boundaries, and per-record transition order is total.

use crate::snapshot::{load_snapshot, Snapshot, SnapshotError};
use crate::state::MaterializedState;
use crate::wal::{Wal, WalError};
use parking_lot::Mutex;
use sb_core::Event;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Snapshot every this many committed events.
const SNAPSHOT_INTERVAL: u64 = 4096;

const WAL_FILE: &str = "events.wal";
const SNAPSHOT_FILE: &str = "state.snap.zst";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

struct StoreInner {
    wal: Wal,
    state: MaterializedState,
    since_snapshot: u64,
}

/// Handle to the durable state store. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<StoreInner>>,
    snapshot_path: PathBuf,
}

impl Store {
    /// Open the store in `dir`, recovering state from the latest snapshot
    /// plus WAL replay.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        let snapshot_path = dir.join(SNAPSHOT_FILE);
        let wal_path = dir.join(WAL_FILE);

        let (mut state, seq) = match load_snapshot(&snapshot_path)? {
            Some(snapshot) => (snapshot.state, snapshot.seq),
            None => (MaterializedState::default(), 0),
        };

        let mut wal = Wal::open(&wal_path, seq)?;
        let mut replayed = 0u64;
        while let Some(entry) = wal.next_unprocessed()? {
            state.apply_event(&entry.event);
            wal.mark_processed(entry.seq);
            replayed += 1;
        }
        if replayed > 0 {
            tracing::info!(replayed, "replayed WAL entries over snapshot");
        }
        state.rebuild_indexes();

        Ok(Self {
            inner: Arc::new(Mutex::new(StoreInner { wal, state, since_snapshot: 0 })),
            snapshot_path,
        })
    }

    /// Commit a batch of events atomically: append all, flush once, apply all.
    pub fn commit(&self, events: &[Event]) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock();
        Self::commit_locked(&mut inner, events)?;
        let due = inner.since_snapshot >= SNAPSHOT_INTERVAL;
        drop(inner);
        self.maybe_snapshot(due);
        Ok(())
    }

    /// Decide events against the current state and commit them in the same
    /// critical section, so validation cannot race another committer.
    pub fn transact<T>(
        &self,
        f: impl FnOnce(&MaterializedState) -> (Vec<Event>, T),
    ) -> Result<T, StoreError> {
        let mut inner = self.inner.lock();
        let (events, value) = f(&inner.state);
        if !events.is_empty() {
            Self::commit_locked(&mut inner, &events)?;
        }
        let due = inner.since_snapshot >= SNAPSHOT_INTERVAL;
        drop(inner);
        self.maybe_snapshot(due);
        Ok(value)
    }

    fn commit_locked(inner: &mut StoreInner, events: &[Event]) -> Result<(), StoreError> {
        let mut seqs = Vec::with_capacity(events.len());
        for event in events {
            seqs.push(inner.wal.append(event)?);
        }
        inner.wal.flush()?;
        for (event, seq) in events.iter().zip(seqs) {
            inner.state.apply_event(event);
            inner.wal.mark_processed(seq);
        }
        inner.since_snapshot += events.len() as u64;
        Ok(())
    }

    fn maybe_snapshot(&self, due: bool) {
        if due {
            if let Err(e) = self.snapshot_now() {
                // Snapshot failures are not fatal: the WAL still has everything.
                tracing::warn!(error = %e, "periodic snapshot failed");
            }
        }
    }

    /// Read a value out of the materialized state under the lock.
    pub fn read<T>(&self, f: impl FnOnce(&MaterializedState) -> T) -> T {
        let inner = self.inner.lock();
        f(&inner.state)
    }

    /// Write the current state as a snapshot and truncate the WAL.
    pub fn snapshot_now(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let snapshot = Snapshot::new(inner.wal.processed_seq(), inner.state.clone());
        snapshot.save(&self.snapshot_path)?;
        inner.wal.truncate()?;
        inner.since_snapshot = 0;
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

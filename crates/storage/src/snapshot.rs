// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable snapshots of the materialized state.
//!
//! A snapshot is the compacted form of everything the WAL said up to its
//! `seq` cursor: recovery loads it, then replays only the WAL tail. Writes
//! land in a staging file and are renamed into place, and the two most
//! recent prior generations stay on disk as `.prev` / `.prev2` for manual
//! rollback after a bad deploy.

use crate::state::MaterializedState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current snapshot schema version
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

const ZSTD_LEVEL: i32 = 3;

/// Errors that can occur in snapshot operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported snapshot version {0} (current: {CURRENT_SNAPSHOT_VERSION})")]
    Version(u32),
}

/// The complete materialized state as of one WAL position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Schema version for migrations
    pub version: u32,
    /// WAL sequence this snapshot covers; replay resumes after it
    pub seq: u64,
    pub state: MaterializedState,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(seq: u64, state: MaterializedState) -> Self {
        Self { version: CURRENT_SNAPSHOT_VERSION, seq, state, created_at: Utc::now() }
    }

    /// Write zstd-compressed JSON through a staging file and rename it into
    /// place, so a crash mid-write never corrupts the live snapshot. The
    /// file being replaced is retired to a `.prev` generation first.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let staging = suffixed(path, "staging");
        {
            let file = File::create(&staging)?;
            let mut encoder = zstd::stream::write::Encoder::new(BufWriter::new(file), ZSTD_LEVEL)?;
            serde_json::to_writer(&mut encoder, self)?;
            let mut writer = encoder.finish()?;
            writer.flush()?;
        }
        if path.exists() {
            retire_current(path);
        }
        fs::rename(&staging, path)?;
        Ok(())
    }
}

/// Load a snapshot, rebuilding the state's runtime indexes.
/// Returns `Ok(None)` when no snapshot exists yet.
pub fn load_snapshot(path: &Path) -> Result<Option<Snapshot>, SnapshotError> {
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(path)?;
    let mut decoder = zstd::stream::read::Decoder::new(BufReader::new(file))?;
    // Decode fully before parsing: id keys deserialize from borrowed strs,
    // which a streaming reader cannot lend.
    let mut json = String::new();
    decoder.read_to_string(&mut json)?;
    let mut snapshot: Snapshot = serde_json::from_str(&json)?;
    if snapshot.version > CURRENT_SNAPSHOT_VERSION {
        return Err(SnapshotError::Version(snapshot.version));
    }
    snapshot.state.rebuild_indexes();
    Ok(Some(snapshot))
}

/// `<path>.<suffix>`, appended to the full file name so the compression
/// extension stays visible.
fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Slide the live snapshot into the `.prev` slot. An existing `.prev` moves
/// to `.prev2`, whose previous occupant is overwritten by the rename.
fn retire_current(path: &Path) {
    let prev = suffixed(path, "prev");
    if prev.exists() {
        let _ = fs::rename(&prev, suffixed(path, "prev2"));
    }
    let _ = fs::rename(path, &prev);
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;

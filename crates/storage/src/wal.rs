// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only write-ahead log of events.
//!
//! One JSON entry per line, each carrying a monotonically increasing sequence
//! number. Recovery opens the log with the snapshot's sequence and replays
//! only entries after it.

use sb_core::Event;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur in WAL operations
#[derive(Debug, Error)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One durable log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    pub event: Event,
}

/// Append-only event log.
pub struct Wal {
    path: PathBuf,
    writer: BufWriter<File>,
    /// Highest sequence ever written
    write_seq: u64,
    /// Highest sequence applied to the materialized state
    processed_seq: u64,
    /// Entries after `processed_seq` found at open time, pending replay
    pending: VecDeque<WalEntry>,
}

impl Wal {
    /// Open (or create) the log at `path`. Entries with seq > `processed_seq`
    /// are queued for replay via [`Wal::next_unprocessed`].
    ///
    /// Lines that fail to parse are skipped with a warning — a torn final
    /// write after a crash must not block recovery.
    pub fn open(path: &Path, processed_seq: u64) -> Result<Self, WalError> {
        let mut write_seq = processed_seq;
        let mut pending = VecDeque::new();

        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<WalEntry>(&line) {
                    Ok(entry) => {
                        write_seq = write_seq.max(entry.seq);
                        if entry.seq > processed_seq {
                            pending.push_back(entry);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping unparseable WAL line");
                    }
                }
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.seek(SeekFrom::End(0))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            write_seq,
            processed_seq,
            pending,
        })
    }

    /// Append an event, returning its sequence number. Not yet flushed.
    pub fn append(&mut self, event: &Event) -> Result<u64, WalError> {
        self.write_seq += 1;
        let entry = WalEntry { seq: self.write_seq, event: event.clone() };
        let line = serde_json::to_string(&entry)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(entry.seq)
    }

    /// Flush buffered appends and fsync to disk.
    pub fn flush(&mut self) -> Result<(), WalError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    /// Next entry awaiting replay, if any.
    pub fn next_unprocessed(&mut self) -> Result<Option<WalEntry>, WalError> {
        Ok(self.pending.pop_front())
    }

    /// Record that `seq` has been applied to the materialized state.
    pub fn mark_processed(&mut self, seq: u64) {
        self.processed_seq = self.processed_seq.max(seq);
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }

    /// Drop all entries from disk after a snapshot has captured them.
    ///
    /// Sequence numbers keep counting from `write_seq`; the snapshot's
    /// `seq` field is the replay cursor for the truncated log.
    pub fn truncate(&mut self) -> Result<(), WalError> {
        self.writer.flush()?;
        let file = OpenOptions::new().write(true).truncate(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;

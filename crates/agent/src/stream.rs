// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream accumulation with paced excerpt flushes and stop checks.
//!
//! Chunks append to an accumulator. Roughly every 300 ms — and only when at
//! least 50 new characters arrived — a user-facing excerpt is flushed. The
//! session's stop flag is consulted about every 2 s, including while the
//! stream is idle, so a stop lands within its interval even mid-chunk.

use crate::model::{ChunkStream, ModelError};
use futures_util::StreamExt;
use std::time::Duration;

/// Cadence of excerpt flushes while streaming.
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(300);

/// Minimum new characters before an excerpt flush fires.
pub const FLUSH_MIN_CHARS: usize = 50;

/// Cadence of stop-flag checks.
pub const STOP_CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// Accumulates streamed text and decides when an excerpt is due.
pub struct Accumulator {
    text: String,
    flushed_len: usize,
    last_flush: tokio::time::Instant,
}

impl Accumulator {
    pub fn new() -> Self {
        Self { text: String::new(), flushed_len: 0, last_flush: tokio::time::Instant::now() }
    }

    pub fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// An excerpt is due when the interval elapsed and enough new text
    /// arrived since the last flush.
    pub fn flush_due(&self, now: tokio::time::Instant) -> bool {
        now.duration_since(self.last_flush) >= FLUSH_INTERVAL
            && self.text.len() - self.flushed_len >= FLUSH_MIN_CHARS
    }

    pub fn mark_flushed(&mut self, now: tokio::time::Instant) {
        self.flushed_len = self.text.len();
        self.last_flush = now;
    }
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// How a driven stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    Complete(String),
    /// Stop was requested; carries whatever had streamed so far
    Stopped(String),
}

impl StreamEnd {
    pub fn text(&self) -> &str {
        match self {
            StreamEnd::Complete(t) | StreamEnd::Stopped(t) => t,
        }
    }

    pub fn was_stopped(&self) -> bool {
        matches!(self, StreamEnd::Stopped(_))
    }
}

/// Drive a chunk stream to completion, flushing excerpts through `on_flush`
/// and polling `stop_requested` on the stop interval. Cancels the in-flight
/// stream by dropping it when stop is observed.
pub async fn drive_stream(
    mut stream: ChunkStream,
    mut on_flush: impl FnMut(&str),
    stop_requested: impl Fn() -> bool,
) -> Result<StreamEnd, ModelError> {
    let mut acc = Accumulator::new();
    let mut stop_timer = tokio::time::interval(STOP_CHECK_INTERVAL);
    stop_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    stop_timer.reset();

    loop {
        tokio::select! {
            chunk = stream.next() => {
                match chunk {
                    Some(Ok(text)) => {
                        acc.push(&text);
                        let now = tokio::time::Instant::now();
                        if acc.flush_due(now) {
                            acc.mark_flushed(now);
                            on_flush(acc.text());
                        }
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        on_flush(acc.text());
                        return Ok(StreamEnd::Complete(acc.into_text()));
                    }
                }
            }
            _ = stop_timer.tick() => {
                if stop_requested() {
                    on_flush(acc.text());
                    return Ok(StreamEnd::Stopped(acc.into_text()));
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;

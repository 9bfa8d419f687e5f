// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! sb-storage: durable state store for the Sandbar control plane.
//!
//! Event-sourced: an append-only WAL of events is the source of truth;
//! [`MaterializedState`] is rebuilt by replaying the WAL over the latest
//! snapshot. [`Store`] bundles both behind one lock — a committed event batch
//! is the unit of atomicity.

mod snapshot;
mod state;
mod store;
mod wal;

pub use snapshot::{load_snapshot, Snapshot, SnapshotError, CURRENT_SNAPSHOT_VERSION};
pub use state::MaterializedState;
pub use store::{Store, StoreError};
pub use wal::{Wal, WalEntry, WalError};

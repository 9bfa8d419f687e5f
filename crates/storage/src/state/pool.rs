// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pool entry event handlers.
//!
//! Pool assignment itself is handled by the sandboxes module — the
//! `SandboxAssignedFromPool` event mutates both tables atomically.

use sb_core::{Event, PoolEntry};

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::PoolEntryCreated { id, name, kind, at_ms } => {
            if !state.pool.contains_key(id) {
                state.pool.insert(*id, PoolEntry::new(*id, name.clone(), kind.clone(), *at_ms));
            }
        }

        Event::PoolEntryPlaced { id, placement } => {
            if let Some(entry) = state.pool.get_mut(id) {
                entry.placement = placement.clone();
            }
        }

        Event::PoolEntryStatusChanged { id, status, at_ms, error } => {
            if let Some(entry) = state.pool.get_mut(id) {
                if entry.status == *status {
                    return;
                }
                entry.status = *status;
                if *status == sb_core::pool::PoolStatus::Assigned {
                    entry.assigned_at_ms = Some(*at_ms);
                }
                if let Some(e) = error {
                    entry.last_error = Some(e.clone());
                }
            }
        }

        Event::PoolEntryDeleted { id } => {
            state.pool.remove(id);
        }

        _ => {}
    }
}

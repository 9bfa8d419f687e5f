// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;

#[test]
fn lock_is_exclusive_per_state_dir() {
    let dir = tempdir().unwrap();
    let first = acquire_lock(dir.path()).unwrap();

    let second = acquire_lock(dir.path());
    assert!(matches!(second, Err(DaemonError::Locked(_))));

    drop(first);
    // fs2 releases on drop; the directory is lockable again.
    acquire_lock(dir.path()).unwrap();
}

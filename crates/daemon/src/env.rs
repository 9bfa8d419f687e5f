// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path and environment resolution for the daemon.

use std::path::PathBuf;

/// State directory: `SANDBAR_STATE_DIR`, else the platform state dir,
/// else `~/.local/state`, else /tmp.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SANDBAR_STATE_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/state")))
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("sandbar")
}

/// Config file: `SANDBAR_CONFIG`, else `<state_dir>/sandbar.toml`.
/// Missing files fall back to defaults plus env overrides.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("SANDBAR_CONFIG") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    state_dir().join("sandbar.toml")
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;

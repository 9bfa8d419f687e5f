// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn state_dir_ends_with_sandbar_by_default() {
    // Only meaningful when the override is unset in the test environment.
    if std::env::var("SANDBAR_STATE_DIR").is_err() {
        assert!(state_dir().ends_with("sandbar"));
    }
}

#[test]
fn config_path_defaults_into_state_dir() {
    if std::env::var("SANDBAR_CONFIG").is_err() {
        assert!(config_path().ends_with("sandbar.toml"));
    }
}

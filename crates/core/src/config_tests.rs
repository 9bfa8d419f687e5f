// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn defaults_match_backend_tuning() {
    let config = Config::default();
    assert_eq!(config.pool.target_size, 3);
    assert_eq!(config.pool.min_size, 1);
    assert_eq!(config.pool.max_creating, 2);
    assert_eq!(config.heartbeat.warning_secs, 60);
    assert_eq!(config.heartbeat.stop_secs, 300);
    assert_eq!(config.agent.max_iterations, 5);
    assert_eq!(config.agent.context_file_cap, 15);
    assert_eq!(config.agent.context_byte_cap, 50 * 1024);
    assert_eq!(config.agent.output_truncate_bytes, 8 * 1024);
    assert_eq!(config.host.exec_timeout_secs, 120);
}

#[parameterized(
    requested = { SandboxStatus::Requested, Some(120) },
    creating = { SandboxStatus::Creating, Some(120) },
    cloning = { SandboxStatus::Cloning, Some(300) },
    installing = { SandboxStatus::Installing, Some(900) },
    starting = { SandboxStatus::Starting, Some(120) },
    ready = { SandboxStatus::Ready, None },
    active = { SandboxStatus::Active, None },
    unhealthy = { SandboxStatus::Unhealthy, None },
)]
fn timeout_per_status(status: SandboxStatus, secs: Option<u64>) {
    let timeouts = TimeoutConfig::default();
    assert_eq!(timeouts.for_status(status), secs.map(Duration::from_secs));
}

#[test]
fn partial_toml_keeps_defaults() {
    let config: Config = toml::from_str(
        r#"
        [pool]
        target_size = 5

        [host]
        base_url = "http://host:9000"
        auth_secret = "shh"
        "#,
    )
    .unwrap();

    assert_eq!(config.pool.target_size, 5);
    assert_eq!(config.pool.max_creating, 2);
    assert_eq!(config.host.base_url, "http://host:9000");
    assert_eq!(config.host.auth_secret, "shh");
    assert_eq!(config.timeouts.installing_secs, 900);
}

#[test]
fn empty_toml_is_valid() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.scheduler.batch_size, 5);
}

#[test]
fn load_reports_missing_file() {
    let err = Config::load(Path::new("/nonexistent/sandbar.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn hot_window_and_retention_conversions() {
    let config = Config::default();
    assert_eq!(config.pool.hot_repo_window_ms(), 7 * 24 * 3600 * 1000);
    assert_eq!(config.scheduler.destroyed_retention_ms(), 24 * 3600 * 1000);
    assert_eq!(config.pool.stale_assignment_ms(), 300_000);
}

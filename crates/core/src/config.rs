// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane configuration: TOML file with env-var overrides.
//!
//! Every option has a default matching the documented backend tuning, so an
//! empty file (or none at all) yields a runnable config — only secrets and
//! endpoint URLs genuinely need to be supplied.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::sandbox::SandboxStatus;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse error in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub host: HostConfig,
    pub githost: GitHostConfig,
    pub pool: PoolConfig,
    pub timeouts: TimeoutConfig,
    pub heartbeat: HeartbeatConfig,
    pub scheduler: SchedulerConfig,
    pub agent: AgentConfig,
}

impl Config {
    /// Load from a TOML file, then apply env overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Config =
            toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus env overrides; used when no config file exists.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Secrets and endpoints come from the environment in deployments;
    /// file values are overridden when the variable is set and non-empty.
    pub fn apply_env(&mut self) {
        let over = |target: &mut String, var: &str| {
            if let Ok(v) = std::env::var(var) {
                if !v.is_empty() {
                    *target = v;
                }
            }
        };
        over(&mut self.host.base_url, "SANDBAR_HOST_URL");
        over(&mut self.host.auth_secret, "SANDBAR_HOST_SECRET");
        over(&mut self.host.callback_base_url, "SANDBAR_CALLBACK_URL");
        over(&mut self.githost.base_url, "SANDBAR_GITHOST_URL");
        over(&mut self.agent.model.base_url, "SANDBAR_MODEL_URL");
        over(&mut self.agent.model.api_key, "SANDBAR_MODEL_KEY");
        over(&mut self.agent.model.model_id, "SANDBAR_MODEL_ID");
        over(&mut self.server.listen_addr, "SANDBAR_LISTEN_ADDR");
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen_addr: "127.0.0.1:8641".to_string() }
    }
}

/// Host daemon endpoint and create/setup tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub base_url: String,
    /// Bearer secret for all host calls
    pub auth_secret: String,
    /// Base URL the host posts status callbacks to
    pub callback_base_url: String,
    /// Base URL sandbox preview/exec/terminal links are minted under
    pub preview_base_url: String,
    /// Image tag used when no repo image exists
    pub default_base_image: String,
    pub exec_timeout_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8700".to_string(),
            auth_secret: String::new(),
            callback_base_url: "http://127.0.0.1:8641".to_string(),
            preview_base_url: "http://127.0.0.1".to_string(),
            default_base_image: "sandbar/base:latest".to_string(),
            exec_timeout_secs: 120,
        }
    }
}

impl HostConfig {
    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHostConfig {
    pub base_url: String,
}

impl Default for GitHostConfig {
    fn default() -> Self {
        Self { base_url: "https://api.github.com".to_string() }
    }
}

/// Pre-warmed pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Generic pool fill target
    pub target_size: usize,
    pub min_size: usize,
    /// Shared creation budget across generic and repo-affine replenishment
    pub max_creating: usize,
    /// Per hot repo fill target
    pub repo_target: usize,
    /// A repo is hot when its image was used within this window
    pub hot_repo_window_days: u64,
    /// Assigned entries older than this are leaked and GC'd
    pub stale_assignment_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            target_size: 3,
            min_size: 1,
            max_creating: 2,
            repo_target: 1,
            hot_repo_window_days: 7,
            stale_assignment_secs: 300,
        }
    }
}

impl PoolConfig {
    pub fn hot_repo_window_ms(&self) -> u64 {
        self.hot_repo_window_days * 24 * 3600 * 1000
    }

    pub fn stale_assignment_ms(&self) -> u64 {
        self.stale_assignment_secs * 1000
    }
}

/// Per-state residence timeouts for transitional statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub requested_secs: u64,
    pub creating_secs: u64,
    pub cloning_secs: u64,
    pub installing_secs: u64,
    pub starting_secs: u64,
    pub destroying_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            requested_secs: 120,
            creating_secs: 120,
            cloning_secs: 300,
            installing_secs: 900,
            starting_secs: 120,
            destroying_secs: 120,
        }
    }
}

impl TimeoutConfig {
    /// Timeout for a transitional status; `None` for statuses not bounded
    /// by a residence timeout.
    pub fn for_status(&self, status: SandboxStatus) -> Option<Duration> {
        let secs = match status {
            SandboxStatus::Requested => self.requested_secs,
            SandboxStatus::Creating => self.creating_secs,
            SandboxStatus::Cloning => self.cloning_secs,
            SandboxStatus::Installing => self.installing_secs,
            SandboxStatus::Starting => self.starting_secs,
            SandboxStatus::Destroying => self.destroying_secs,
            _ => return None,
        };
        Some(Duration::from_secs(secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Lapse after which `active` demotes to `ready`
    pub warning_secs: u64,
    /// Lapse after which the sandbox is stopped
    pub stop_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { warning_secs: 60, stop_secs: 300 }
    }
}

impl HeartbeatConfig {
    pub fn warning_ms(&self) -> u64 {
        self.warning_secs * 1000
    }

    pub fn stop_ms(&self) -> u64 {
        self.stop_secs * 1000
    }
}

/// Scheduler cadences and batch bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Records per tick per task; bounds work so one tick stays short
    pub batch_size: usize,
    pub process_requested_secs: u64,
    pub check_heartbeats_secs: u64,
    pub check_timeouts_secs: u64,
    pub process_stopping_secs: u64,
    pub process_unhealthy_secs: u64,
    pub reconcile_secs: u64,
    pub cleanup_old_secs: u64,
    pub pool_replenish_secs: u64,
    pub pool_gc_secs: u64,
    /// Destroyed records older than this are deleted by cleanup-old
    pub destroyed_retention_hours: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            process_requested_secs: 5,
            check_heartbeats_secs: 30,
            check_timeouts_secs: 15,
            process_stopping_secs: 10,
            process_unhealthy_secs: 30,
            reconcile_secs: 60,
            cleanup_old_secs: 3600,
            pool_replenish_secs: 30,
            pool_gc_secs: 60,
            destroyed_retention_hours: 24,
        }
    }
}

impl SchedulerConfig {
    pub fn destroyed_retention_ms(&self) -> u64 {
        self.destroyed_retention_hours * 3600 * 1000
    }
}

/// Agent loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_iterations: u32,
    /// Conversation context window (most recent messages)
    pub history_messages: usize,
    pub context_file_cap: usize,
    pub context_byte_cap: usize,
    /// Largest single file eligible for the context selection
    pub context_max_file_bytes: usize,
    pub output_truncate_bytes: usize,
    pub model: ModelConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            history_messages: 10,
            context_file_cap: 15,
            context_byte_cap: 50 * 1024,
            context_max_file_bytes: 32 * 1024,
            output_truncate_bytes: 8 * 1024,
            model: ModelConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: String,
    pub model_id: String,
    pub max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            api_key: String::new(),
            model_id: "claude-sonnet-4-5".to_string(),
            max_tokens: 8192,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

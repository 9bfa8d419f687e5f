// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire DTOs for the host daemon API. Field names follow the daemon's
//! camelCase JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `POST /sandboxes`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSandboxRequest {
    pub name: String,
    /// Image tag; the default base image when no repo image exists
    pub image: String,
    /// Named persistent volume to mount (repo-affine pool entries)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSandboxResponse {
    pub id: String,
    pub host_port: u16,
}

/// `POST /sandboxes/{id}/setup`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupSandboxRequest {
    /// Repo slug, e.g. `acme/widgets`
    pub repo: String,
    pub target_branch: String,
    pub default_branch: String,
    /// Source-host access token used for the clone
    pub token: String,
    /// Where the daemon posts progress callbacks
    pub callback_url: String,
    /// Echoed back as `apiSecret` in every callback
    pub callback_secret: String,
    /// Image-cache hint: pre-built repo image tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_hint: Option<String>,
    /// Checkpoint-restore hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_hint: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

/// `POST /sandboxes/{id}/exec`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecRequest {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ExecRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into(), timeout_secs: None }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecResponse {
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    /// Combined stream when the daemon does not split them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ExecResponse {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Best available output: combined stream, else stdout + stderr.
    pub fn combined_output(&self) -> String {
        if let Some(out) = &self.output {
            return out.clone();
        }
        let mut combined = self.stdout.clone().unwrap_or_default();
        if let Some(err) = &self.stderr {
            if !combined.is_empty() && !err.is_empty() {
                combined.push('\n');
            }
            combined.push_str(err);
        }
        combined
    }
}

/// One element of `GET /sandboxes`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSandbox {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

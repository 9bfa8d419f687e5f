// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP implementation of [`HostBackend`] over reqwest.
//!
//! Every request carries `Authorization: Bearer <secret>` and a per-call
//! deadline; exceeding the deadline surfaces as a transient error so the
//! gateway's backoff applies.

use crate::backend::HostBackend;
use crate::error::HostError;
use crate::types::{
    CreateSandboxRequest, CreateSandboxResponse, ExecRequest, ExecResponse, HostSandbox,
    SetupSandboxRequest,
};
use async_trait::async_trait;
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpHost {
    client: reqwest::Client,
    base_url: String,
    auth_secret: String,
}

impl HttpHost {
    pub fn new(base_url: impl Into<String>, auth_secret: impl Into<String>) -> Self {
        Self::with_timeout(base_url, auth_secret, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Exec calls run long commands; the per-call timeout is set per request,
    /// so the client itself carries only the control-call deadline.
    pub fn with_timeout(
        base_url: impl Into<String>,
        auth_secret: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_secret: auth_secret.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, HostError> {
        let response = req
            .bearer_auth(&self.auth_secret)
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_reqwest_error)?;
        if !(200..300).contains(&status) {
            return Err(HostError::from_status(status, &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| HostError::Fatal(format!("malformed host response: {e}")))
    }

    async fn send_expect_ok(&self, req: reqwest::RequestBuilder) -> Result<(), HostError> {
        let response = req
            .bearer_auth(&self.auth_secret)
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(HostError::from_status(status, &body));
        }
        Ok(())
    }
}

/// Network-level failures (connect, reset, EOF, DNS, timeout) are transient.
fn classify_reqwest_error(e: reqwest::Error) -> HostError {
    if e.is_decode() {
        HostError::Fatal(format!("malformed host response: {e}"))
    } else {
        HostError::Transient(e.to_string())
    }
}

#[async_trait]
impl HostBackend for HttpHost {
    async fn create_sandbox(
        &self,
        req: &CreateSandboxRequest,
    ) -> Result<CreateSandboxResponse, HostError> {
        self.send_json(self.client.post(self.url("/sandboxes")).json(req)).await
    }

    async fn setup_sandbox(
        &self,
        host_id: &str,
        req: &SetupSandboxRequest,
    ) -> Result<(), HostError> {
        self.send_expect_ok(
            self.client.post(self.url(&format!("/sandboxes/{host_id}/setup"))).json(req),
        )
        .await
    }

    async fn exec(&self, host_id: &str, req: &ExecRequest) -> Result<ExecResponse, HostError> {
        // Command deadline plus headroom for transport
        let timeout = Duration::from_secs(req.timeout_secs.unwrap_or(120)) + Duration::from_secs(10);
        self.send_json(
            self.client
                .post(self.url(&format!("/sandboxes/{host_id}/exec")))
                .timeout(timeout)
                .json(req),
        )
        .await
    }

    async fn list_sandboxes(&self) -> Result<Vec<HostSandbox>, HostError> {
        self.send_json(self.client.get(self.url("/sandboxes"))).await
    }

    async fn destroy_sandbox(&self, host_id: &str) -> Result<(), HostError> {
        match self
            .send_expect_ok(self.client.delete(self.url(&format!("/sandboxes/{host_id}"))))
            .await
        {
            // DELETE on a missing sandbox is success
            Err(HostError::NotFound(_)) => Ok(()),
            other => other,
        }
    }
}

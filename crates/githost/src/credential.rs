// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stored source-host credentials with refresh-before-expiry.
//!
//! Tokens are refreshed when expiry is five minutes away or less. A failed
//! refresh revokes the stored credential: every subsequent use surfaces
//! reconnect-required until the user reconnects their account.

use crate::client::SourceHost;
use crate::error::SourceHostError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Refresh when expiry is this close.
pub const TOKEN_REFRESH_MARGIN_MS: u64 = 5 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at_ms: u64,
    pub revoked: bool,
}

impl StoredCredential {
    pub fn new(access_token: &str, refresh_token: &str, expires_at_ms: u64) -> Self {
        Self {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            expires_at_ms,
            revoked: false,
        }
    }

    fn needs_refresh(&self, now_ms: u64) -> bool {
        self.expires_at_ms.saturating_sub(now_ms) <= TOKEN_REFRESH_MARGIN_MS
    }
}

/// Per-owner credential store.
#[derive(Clone, Default)]
pub struct CredentialStore {
    credentials: Arc<Mutex<HashMap<String, StoredCredential>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, owner_id: &str, credential: StoredCredential) {
        self.credentials.lock().insert(owner_id.to_string(), credential);
    }

    pub fn get(&self, owner_id: &str) -> Option<StoredCredential> {
        self.credentials.lock().get(owner_id).cloned()
    }

    /// A valid access token for `owner_id`, refreshing through `host` when
    /// expiry is near. Refresh failure revokes the credential.
    pub async fn fresh_token<S: SourceHost>(
        &self,
        host: &S,
        owner_id: &str,
        now_ms: u64,
    ) -> Result<String, SourceHostError> {
        let credential = {
            let creds = self.credentials.lock();
            creds
                .get(owner_id)
                .cloned()
                .ok_or(SourceHostError::ReconnectRequired)?
        };
        if credential.revoked {
            return Err(SourceHostError::ReconnectRequired);
        }
        if !credential.needs_refresh(now_ms) {
            return Ok(credential.access_token);
        }

        match host.refresh_token(&credential.refresh_token).await {
            Ok(token) => {
                let refreshed = StoredCredential::new(
                    &token.access_token,
                    &token.refresh_token,
                    token.expires_at_ms,
                );
                let access = refreshed.access_token.clone();
                self.credentials.lock().insert(owner_id.to_string(), refreshed);
                Ok(access)
            }
            Err(e) => {
                tracing::warn!(owner_id, error = %e, "token refresh failed, revoking credential");
                if let Some(stored) = self.credentials.lock().get_mut(owner_id) {
                    stored.revoked = true;
                }
                Err(SourceHostError::ReconnectRequired)
            }
        }
    }
}

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;

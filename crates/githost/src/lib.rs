// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sb-githost: minimal source-host client.
//!
//! Covers exactly the contract the orchestrator consumes: list repos, read
//! trees and file content, create branches and commits, open or reuse pull
//! requests, and refresh OAuth tokens.

mod client;
mod credential;
mod error;
mod http;
mod types;

pub use client::SourceHost;
pub use credential::{CredentialStore, StoredCredential, TOKEN_REFRESH_MARGIN_MS};
pub use error::SourceHostError;
pub use http::HttpSourceHost;
pub use types::{Branch, CommitFile, PullRequest, Repo, Token, TreeEntry};

#[cfg(any(test, feature = "test-support"))]
pub use client::FakeSourceHost;

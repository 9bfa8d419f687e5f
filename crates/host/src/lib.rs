// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sb-host: typed client over the host daemon's HTTP surface.
//!
//! [`HostBackend`] is the single-attempt wire contract; [`HostGateway`] wraps
//! any backend with the retry, conflict-self-heal, and not-found semantics
//! the orchestrator relies on. One HTTP backend ships; a fake is available
//! behind `test-support`.

mod backend;
mod error;
mod gateway;
mod http;
mod types;

pub use backend::HostBackend;
pub use error::HostError;
pub use gateway::{Created, HostGateway, DEFAULT_BACKOFF_BASE, MAX_RETRIES};
pub use http::HttpHost;
pub use types::{
    CreateSandboxRequest, CreateSandboxResponse, ExecRequest, ExecResponse, HostSandbox,
    SetupSandboxRequest,
};

#[cfg(any(test, feature = "test-support"))]
pub use backend::{FakeCall, FakeHost};

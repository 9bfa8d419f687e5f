// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sb-server: the control plane's inbound HTTP surface.
//!
//! Hosts the sandbox status callback and browser heartbeats, plus the
//! minimal session endpoints that let a product surface start sessions and
//! send agent turns. Callback responses are always HTTP 200 — failures ride
//! in the body as `{success: false}` so host-side clients never retry-storm.

mod routes;

pub use routes::{router, ServerState};

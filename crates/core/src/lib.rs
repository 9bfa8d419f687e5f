// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sb-core: Core library for the Sandbar sandbox control plane

pub mod macros;

pub mod clock;
pub mod config;
pub mod event;
pub mod id;
pub mod image;
pub mod pool;
pub mod sandbox;
pub mod session;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{Config, ConfigError, PoolConfig, TimeoutConfig};
pub use event::Event;
pub use id::{short, RawId, ID_CAPACITY};
pub use image::{Checkpoint, ImageStatus, RepoImage};
pub use pool::{PoolEntry, PoolKind, PoolStatus};
#[cfg(any(test, feature = "test-support"))]
pub use sandbox::SandboxRecordBuilder;
pub use sandbox::{
    generate_api_secret, CallbackStatus, Placement, SandboxConfig, SandboxId, SandboxRecord,
    SandboxStatus, StatusEntry, API_SECRET_LEN,
};
pub use session::{
    BashCommandRecord, FileChange, FileChangeSet, Message, MessageRole, MessageStatus, Session,
};

crate::id_type! {
    /// Unique identifier for an editing session.
    pub struct SessionId("sess");
}

crate::id_type! {
    /// Unique identifier for a chat message.
    pub struct MessageId("msg-");
}

crate::id_type! {
    /// Unique identifier for a pool entry.
    pub struct PoolEntryId("pool");
}

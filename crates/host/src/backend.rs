// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend seam: single-attempt host operations.
//!
//! The state machine, scheduler, pool, and agent loop are identical across
//! sandbox backends; only this trait's implementation differs. Retry and
//! self-heal policy lives in [`crate::HostGateway`], above the seam, so every
//! backend (including the fake) gets the same recovery behavior.

use crate::error::HostError;
use crate::types::{
    CreateSandboxRequest, CreateSandboxResponse, ExecRequest, ExecResponse, HostSandbox,
    SetupSandboxRequest,
};
use async_trait::async_trait;

#[async_trait]
pub trait HostBackend: Send + Sync + 'static {
    async fn create_sandbox(
        &self,
        req: &CreateSandboxRequest,
    ) -> Result<CreateSandboxResponse, HostError>;

    async fn setup_sandbox(
        &self,
        host_id: &str,
        req: &SetupSandboxRequest,
    ) -> Result<(), HostError>;

    async fn exec(&self, host_id: &str, req: &ExecRequest) -> Result<ExecResponse, HostError>;

    async fn list_sandboxes(&self) -> Result<Vec<HostSandbox>, HostError>;

    /// Destroy a sandbox. Implementations treat 404 as success.
    async fn destroy_sandbox(&self, host_id: &str) -> Result<(), HostError>;
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeCall, FakeHost};

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;

    /// Recorded calls, for assertions.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum FakeCall {
        Create { name: String, image: String },
        Setup { host_id: String, repo: String, branch: String },
        Exec { host_id: String, command: String },
        List,
        Destroy { host_id: String },
    }

    #[derive(Default)]
    struct FakeHostState {
        next_id: u32,
        live: HashMap<String, String>, // host_id → name
        calls: Vec<FakeCall>,
        create_results: VecDeque<Result<CreateSandboxResponse, HostError>>,
        setup_results: VecDeque<Result<(), HostError>>,
        exec_results: VecDeque<Result<ExecResponse, HostError>>,
    }

    /// In-process host double. Creates succeed with synthetic placements
    /// unless a scripted result is queued; every call is recorded.
    #[derive(Clone, Default)]
    pub struct FakeHost {
        state: Arc<Mutex<FakeHostState>>,
    }

    impl FakeHost {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_create_result(&self, result: Result<CreateSandboxResponse, HostError>) {
            self.state.lock().create_results.push_back(result);
        }

        pub fn push_setup_result(&self, result: Result<(), HostError>) {
            self.state.lock().setup_results.push_back(result);
        }

        pub fn push_exec_result(&self, result: Result<ExecResponse, HostError>) {
            self.state.lock().exec_results.push_back(result);
        }

        /// Queue a successful exec with the given stdout and exit code.
        pub fn push_exec_output(&self, stdout: &str, exit_code: i32) {
            self.push_exec_result(Ok(ExecResponse {
                exit_code,
                stdout: Some(stdout.to_string()),
                stderr: None,
                output: None,
            }));
        }

        pub fn calls(&self) -> Vec<FakeCall> {
            self.state.lock().calls.clone()
        }

        pub fn live_ids(&self) -> Vec<String> {
            let mut ids: Vec<String> = self.state.lock().live.keys().cloned().collect();
            ids.sort();
            ids
        }

        /// Drop a sandbox behind the orchestrator's back (reconcile tests).
        pub fn lose_sandbox(&self, host_id: &str) {
            self.state.lock().live.remove(host_id);
        }

        /// Register a sandbox the orchestrator does not know about.
        pub fn plant_orphan(&self, host_id: &str) {
            self.state.lock().live.insert(host_id.to_string(), String::new());
        }
    }

    #[async_trait]
    impl HostBackend for FakeHost {
        async fn create_sandbox(
            &self,
            req: &CreateSandboxRequest,
        ) -> Result<CreateSandboxResponse, HostError> {
            let mut state = self.state.lock();
            state.calls.push(FakeCall::Create {
                name: req.name.clone(),
                image: req.image.clone(),
            });
            if let Some(result) = state.create_results.pop_front() {
                if let Ok(resp) = &result {
                    state.live.insert(resp.id.clone(), req.name.clone());
                }
                return result;
            }
            state.next_id += 1;
            let resp = CreateSandboxResponse {
                id: format!("host-{}", state.next_id),
                host_port: 40_000 + state.next_id as u16,
            };
            state.live.insert(resp.id.clone(), req.name.clone());
            Ok(resp)
        }

        async fn setup_sandbox(
            &self,
            host_id: &str,
            req: &SetupSandboxRequest,
        ) -> Result<(), HostError> {
            let mut state = self.state.lock();
            state.calls.push(FakeCall::Setup {
                host_id: host_id.to_string(),
                repo: req.repo.clone(),
                branch: req.target_branch.clone(),
            });
            if let Some(result) = state.setup_results.pop_front() {
                return result;
            }
            if !state.live.contains_key(host_id) {
                return Err(HostError::NotFound(format!("sandbox {host_id}")));
            }
            Ok(())
        }

        async fn exec(&self, host_id: &str, req: &ExecRequest) -> Result<ExecResponse, HostError> {
            let mut state = self.state.lock();
            state.calls.push(FakeCall::Exec {
                host_id: host_id.to_string(),
                command: req.command.clone(),
            });
            if let Some(result) = state.exec_results.pop_front() {
                return result;
            }
            Ok(ExecResponse::default())
        }

        async fn list_sandboxes(&self) -> Result<Vec<HostSandbox>, HostError> {
            let mut state = self.state.lock();
            state.calls.push(FakeCall::List);
            let mut sandboxes: Vec<HostSandbox> = state
                .live
                .iter()
                .map(|(id, name)| HostSandbox {
                    id: id.clone(),
                    name: if name.is_empty() { None } else { Some(name.clone()) },
                })
                .collect();
            sandboxes.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(sandboxes)
        }

        async fn destroy_sandbox(&self, host_id: &str) -> Result<(), HostError> {
            let mut state = self.state.lock();
            state.calls.push(FakeCall::Destroy { host_id: host_id.to_string() });
            state.live.remove(host_id);
            Ok(())
        }
    }
}

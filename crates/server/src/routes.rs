// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use sb_agent::{AgentLoop, ModelClient};
use sb_core::{Clock, SessionId};
use sb_engine::{Orchestrator, StatusCallback};
use sb_githost::SourceHost;
use sb_host::HostBackend;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

/// Shared state for all routes.
pub struct ServerState<H, S, C: Clock, M> {
    pub orch: Orchestrator<H, S, C>,
    pub agent: AgentLoop<H, S, C, M>,
}

impl<H, S, C: Clock, M> Clone for ServerState<H, S, C, M> {
    fn clone(&self) -> Self {
        Self { orch: self.orch.clone(), agent: self.agent.clone() }
    }
}

/// Body of every callback-style response. Always HTTP 200.
#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AckResponse {
    fn ok() -> Self {
        Self { success: true, error: None }
    }

    fn err(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()) }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    repo_id: String,
    branch: String,
    #[serde(default)]
    work_branch: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    session_id: String,
    sandbox_id: String,
}

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    text: String,
}

pub fn router<H, S, C, M>(state: ServerState<H, S, C, M>) -> Router
where
    H: HostBackend,
    S: SourceHost,
    C: Clock + 'static,
    M: ModelClient,
{
    Router::new()
        .route("/sandbox-status", post(sandbox_status::<H, S, C, M>))
        .route("/sandboxes/:name/heartbeat", post(heartbeat::<H, S, C, M>))
        .route("/sessions", post(create_session::<H, S, C, M>))
        .route("/sessions/:id/messages", post(send_message::<H, S, C, M>))
        .route("/sessions/:id/stop", post(stop_session::<H, S, C, M>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Host daemon progress callback. Accepted and idempotent-ignored both
/// answer success; secret mismatch and unknown sandboxes answer
/// `success: false` in a 200 body.
async fn sandbox_status<H, S, C, M>(
    State(state): State<ServerState<H, S, C, M>>,
    Json(callback): Json<StatusCallback>,
) -> Json<AckResponse>
where
    H: HostBackend,
    S: SourceHost,
    C: Clock + 'static,
    M: ModelClient,
{
    match state.orch.apply_callback(&callback) {
        Ok(outcome) => match outcome.error() {
            None => Json(AckResponse::ok()),
            Some(error) => Json(AckResponse::err(error)),
        },
        Err(e) => {
            tracing::error!(error = %e, "callback application failed");
            Json(AckResponse::err("internal error"))
        }
    }
}

/// Browser heartbeat keeping a sandbox active.
async fn heartbeat<H, S, C, M>(
    State(state): State<ServerState<H, S, C, M>>,
    Path(name): Path<String>,
) -> Json<AckResponse>
where
    H: HostBackend,
    S: SourceHost,
    C: Clock + 'static,
    M: ModelClient,
{
    match state.orch.record_heartbeat(&name) {
        Ok(()) => Json(AckResponse::ok()),
        Err(e) => Json(AckResponse::err(e.to_string())),
    }
}

/// Create a session and provision (or pool-assign) its sandbox.
async fn create_session<H, S, C, M>(
    State(state): State<ServerState<H, S, C, M>>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, Json<AckResponse>>
where
    H: HostBackend,
    S: SourceHost,
    C: Clock + 'static,
    M: ModelClient,
{
    let session_id = state
        .orch
        .create_session(&request.repo_id, &request.branch, request.work_branch.as_deref())
        .map_err(|e| Json(AckResponse::err(e.to_string())))?;
    let sandbox_id = state
        .orch
        .request_sandbox(&session_id)
        .await
        .map_err(|e| Json(AckResponse::err(e.to_string())))?;
    Ok(Json(CreateSessionResponse {
        session_id: session_id.to_string(),
        sandbox_id: sandbox_id.to_string(),
    }))
}

/// A user message starts an agent turn. The turn runs in the background;
/// progress lands on the message record.
async fn send_message<H, S, C, M>(
    State(state): State<ServerState<H, S, C, M>>,
    Path(id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Json<AckResponse>
where
    H: HostBackend,
    S: SourceHost,
    C: Clock + 'static,
    M: ModelClient,
{
    let session_id = SessionId::from_string(&id);
    let agent = state.agent.clone();
    tokio::spawn(async move {
        if let Err(e) = agent.run_turn(&session_id, &request.text).await {
            tracing::warn!(session_id = %session_id, error = %e, "agent turn failed to start");
        }
    });
    Json(AckResponse::ok())
}

async fn stop_session<H, S, C, M>(
    State(state): State<ServerState<H, S, C, M>>,
    Path(id): Path<String>,
) -> Json<AckResponse>
where
    H: HostBackend,
    S: SourceHost,
    C: Clock + 'static,
    M: ModelClient,
{
    let session_id = SessionId::from_string(&id);
    match state.orch.request_stop(&session_id, true) {
        Ok(()) => Json(AckResponse::ok()),
        Err(e) => Json(AckResponse::err(e.to_string())),
    }
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;

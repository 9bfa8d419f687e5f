// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI-variant agent driver.
//!
//! Instead of streaming a model from this process, a CLI agent binary runs
//! inside the sandbox and appends JSONL progress events to an output file.
//! This driver polls that file through the exec gateway, forwards stop
//! requests as a process signal, and on success derives the changed-file set
//! from `git diff` inside the sandbox. Its contract to the rest of the
//! system — messages, file changes, auto-commit — is identical to the
//! primary loop.

use crate::error::AgentLoopError;
use crate::turn::{finalize_turn, shell_quote, TurnOutcome};
use sb_core::session::{MessageRole, Session};
use sb_core::{Clock, Event, MessageId, SessionId};
use sb_engine::Orchestrator;
use sb_githost::SourceHost;
use sb_host::{ExecRequest, HostBackend};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

const OUTPUT_FILE: &str = "/tmp/sandbar-agent/out.jsonl";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Stop polling a silent agent after this many intervals.
const MAX_SILENT_POLLS: u32 = 600;

/// One progress event from the CLI agent's JSONL output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliEvent {
    Progress { text: String },
    Explanation { text: String },
    Done,
    Error { message: String },
}

/// Incremental JSONL reader: complete lines parse into events, a trailing
/// partial line waits for the next poll.
#[derive(Default)]
pub struct JsonlCursor {
    buffer: String,
}

impl JsonlCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Vec<CliEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_event(line) {
                Some(event) => events.push(event),
                None => tracing::debug!(line, "unrecognized agent output line"),
            }
        }
        events
    }
}

fn parse_event(line: &str) -> Option<CliEvent> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    let kind = value.get("type")?.as_str()?;
    match kind {
        "progress" => Some(CliEvent::Progress {
            text: value.get("text")?.as_str()?.to_string(),
        }),
        "explanation" => Some(CliEvent::Explanation {
            text: value.get("text")?.as_str()?.to_string(),
        }),
        "done" => Some(CliEvent::Done),
        "error" => Some(CliEvent::Error {
            message: value
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("agent failed")
                .to_string(),
        }),
        _ => None,
    }
}

pub struct CliAgentDriver<H, S, C: Clock> {
    orch: Orchestrator<H, S, C>,
    /// Agent binary invoked inside the sandbox
    binary: String,
    poll_interval: Duration,
}

impl<H, S, C> CliAgentDriver<H, S, C>
where
    H: HostBackend,
    S: SourceHost,
    C: Clock,
{
    pub fn new(orch: Orchestrator<H, S, C>, binary: impl Into<String>) -> Self {
        Self { orch, binary: binary.into(), poll_interval: DEFAULT_POLL_INTERVAL }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run one user turn through the in-sandbox CLI agent.
    pub async fn run_turn(
        &self,
        session_id: &SessionId,
        user_text: &str,
    ) -> Result<TurnOutcome, AgentLoopError> {
        let session = self
            .orch
            .store()
            .read(|s| s.sessions.get(session_id).cloned())
            .ok_or_else(|| AgentLoopError::SessionNotFound(session_id.to_string()))?;
        self.orch.request_stop(session_id, false)?;

        let now = self.orch.clock().epoch_ms();
        let user_id = MessageId::new();
        let assistant_id = MessageId::new();
        self.orch.store().commit(&[
            Event::MessageCreated {
                id: user_id,
                session_id: *session_id,
                role: MessageRole::User,
                content: user_text.to_string(),
                at_ms: now,
            },
            Event::MessageCreated {
                id: assistant_id,
                session_id: *session_id,
                role: MessageRole::Assistant,
                content: String::new(),
                at_ms: now,
            },
        ])?;

        match self.drive(&session, assistant_id, user_text).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let summary = format!("Sorry, I ran into an error: {e}");
                self.orch.store().commit(&[Event::MessageFinalized {
                    id: assistant_id,
                    content: summary,
                    committed: false,
                    at_ms: self.orch.clock().epoch_ms(),
                }])?;
                Ok(TurnOutcome {
                    message_id: assistant_id,
                    iterations: 0,
                    stopped: false,
                    committed: false,
                    errored: true,
                    changed_paths: Vec::new(),
                })
            }
        }
    }

    async fn drive(
        &self,
        session: &Session,
        assistant_id: MessageId,
        user_text: &str,
    ) -> Result<TurnOutcome, AgentLoopError> {
        let sandbox = self
            .orch
            .store()
            .read(|s| s.active_sandbox_for_session(&session.id).cloned())
            .filter(|r| r.placement.is_placed() && crate::turn::usable_for_exec(r))
            .ok_or_else(|| AgentLoopError::NoSandbox(session.id.to_string()))?;
        let host_id = sandbox.placement.host_id.clone();

        let pid = self.spawn_agent(&host_id, user_text).await?;
        tracing::info!(session_id = %session.id, pid = %pid, "cli agent started");

        let mut cursor = JsonlCursor::new();
        let mut offset = 0usize;
        let mut explanations: Vec<String> = Vec::new();
        let mut progress = String::new();
        let mut stopped = false;
        let mut agent_error: Option<String> = None;
        let mut done = false;
        let mut silent_polls = 0u32;

        while !done {
            tokio::time::sleep(self.poll_interval).await;

            let stop = self
                .orch
                .store()
                .read(|s| s.sessions.get(&session.id).map(|s| s.stop_requested))
                .unwrap_or(false);
            if stop {
                self.signal_agent(&host_id, &pid).await;
                stopped = true;
                break;
            }

            let chunk = self.read_output(&host_id, offset).await?;
            if chunk.is_empty() {
                silent_polls += 1;
                if silent_polls > MAX_SILENT_POLLS {
                    agent_error = Some("agent produced no output".to_string());
                    break;
                }
                continue;
            }
            silent_polls = 0;
            offset += chunk.len();

            for event in cursor.push(&chunk) {
                match event {
                    CliEvent::Progress { text } => {
                        progress.push_str(&text);
                        let flush = self.orch.store().commit(&[Event::MessageStreamed {
                            id: assistant_id,
                            content: progress.clone(),
                        }]);
                        if let Err(e) = flush {
                            tracing::warn!(error = %e, "excerpt flush failed");
                        }
                    }
                    CliEvent::Explanation { text } => explanations.push(text),
                    CliEvent::Done => done = true,
                    CliEvent::Error { message } => {
                        agent_error = Some(message);
                        done = true;
                    }
                }
            }
        }

        if let Some(message) = agent_error {
            return Err(AgentLoopError::Model(crate::model::ModelError::Stream(message)));
        }

        // Derive the changed-file set from the sandbox's own git state.
        let (originals, file_cache) = if done {
            self.collect_changes(&host_id).await?
        } else {
            (BTreeMap::new(), HashMap::new())
        };

        finalize_turn(
            &self.orch,
            session,
            &sandbox,
            assistant_id,
            originals,
            file_cache,
            explanations,
            Vec::new(),
            stopped,
            1,
        )
        .await
    }

    async fn spawn_agent(&self, host_id: &str, prompt: &str) -> Result<String, AgentLoopError> {
        let command = format!(
            "mkdir -p /tmp/sandbar-agent && rm -f {out} && \
             nohup {binary} --prompt {prompt} --output {out} >/dev/null 2>&1 & echo $!",
            out = OUTPUT_FILE,
            binary = self.binary,
            prompt = shell_quote(prompt),
        );
        let response = self.orch.host().exec(host_id, &ExecRequest::new(command)).await?;
        Ok(response.combined_output().trim().to_string())
    }

    async fn signal_agent(&self, host_id: &str, pid: &str) {
        let command = format!("kill -INT {pid}");
        if let Err(e) = self.orch.host().exec(host_id, &ExecRequest::new(command)).await {
            tracing::warn!(pid, error = %e, "failed to signal cli agent");
        }
    }

    async fn read_output(&self, host_id: &str, offset: usize) -> Result<String, AgentLoopError> {
        let command = format!("tail -c +{} {} 2>/dev/null || true", offset + 1, OUTPUT_FILE);
        let response = self.orch.host().exec(host_id, &ExecRequest::new(command)).await?;
        Ok(response.combined_output())
    }

    /// `git diff --name-only` for the set, `git show` for originals, `cat`
    /// for current contents.
    async fn collect_changes(
        &self,
        host_id: &str,
    ) -> Result<(BTreeMap<String, Option<String>>, HashMap<String, String>), AgentLoopError> {
        let diff = self
            .orch
            .host()
            .exec(host_id, &ExecRequest::new("git diff --name-only HEAD"))
            .await?;
        let paths: Vec<String> = diff
            .combined_output()
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        let mut originals = BTreeMap::new();
        let mut file_cache = HashMap::new();
        for path in paths {
            let original = self
                .orch
                .host()
                .exec(
                    host_id,
                    &ExecRequest::new(format!("git show HEAD:{}", shell_quote(&path))),
                )
                .await
                .ok()
                .filter(|r| r.success())
                .map(|r| r.combined_output());
            let current = self
                .orch
                .host()
                .exec(host_id, &ExecRequest::new(format!("cat -- {}", shell_quote(&path))))
                .await
                .ok()
                .filter(|r| r.success())
                .map(|r| r.combined_output());

            if let Some(current) = current {
                originals.insert(path.clone(), original);
                file_cache.insert(path, current);
            }
        }
        Ok((originals, file_cache))
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;

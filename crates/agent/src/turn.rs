// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-turn driver: model ↔ sandbox iterations plus finalization.
//!
//! Invariants: at most one active turn per session; cancellable at every
//! suspension point; every file write and shell command lands in the store
//! for audit and replay before the turn finishes.

use crate::blocks::{apply_edits, parse_blocks, Block};
use crate::context::{ContextBuilder, ContextFile};
use crate::error::AgentLoopError;
use crate::guard::{denied_reason, REFUSAL};
use crate::model::{ModelClient, ModelMessage, ModelRequest};
use crate::stream::drive_stream;
use crate::truncate::truncate_middle;
use parking_lot::Mutex;
use sb_core::session::{FileChange, MessageRole, Session};
use sb_core::{Clock, Event, MessageId, SandboxRecord, SessionId};
use sb_engine::Orchestrator;
use sb_githost::{CommitFile, SourceHost};
use sb_host::{ExecRequest, HostBackend};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Result of one finished turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub message_id: MessageId,
    pub iterations: u32,
    pub stopped: bool,
    pub committed: bool,
    pub errored: bool,
    pub changed_paths: Vec<String>,
}

/// One executed (or refused) command, kept for the summary block.
pub(crate) struct CommandResult {
    pub(crate) command: String,
    pub(crate) exit_code: i32,
    pub(crate) output: String,
}

pub struct AgentLoop<H, S, C: Clock, M> {
    orch: Orchestrator<H, S, C>,
    model: Arc<M>,
    active: Arc<Mutex<HashSet<SessionId>>>,
}

impl<H, S, C: Clock, M> Clone for AgentLoop<H, S, C, M> {
    fn clone(&self) -> Self {
        Self {
            orch: self.orch.clone(),
            model: Arc::clone(&self.model),
            active: Arc::clone(&self.active),
        }
    }
}

/// RAII claim on a session's single active turn.
struct TurnClaim {
    session_id: SessionId,
    active: Arc<Mutex<HashSet<SessionId>>>,
}

impl Drop for TurnClaim {
    fn drop(&mut self) {
        self.active.lock().remove(&self.session_id);
    }
}

impl<H, S, C, M> AgentLoop<H, S, C, M>
where
    H: HostBackend,
    S: SourceHost,
    C: Clock,
    M: ModelClient,
{
    pub fn new(orch: Orchestrator<H, S, C>, model: Arc<M>) -> Self {
        Self { orch, model, active: Arc::new(Mutex::new(HashSet::new())) }
    }

    /// Run one user turn end to end.
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

        let _claim = {
            let mut active = self.active.lock();
            if !active.insert(*session_id) {
                return Err(AgentLoopError::TurnInProgress(session_id.to_string()));
            }
            TurnClaim { session_id: *session_id, active: Arc::clone(&self.active) }
        };

        // A fresh turn clears any stale stop flag.
        self.orch.request_stop(session_id, false)?;

        // Conversation context is the window before this turn's messages.
        let history = self.orch.store().read(|s| {
            s.recent_messages(session_id, self.orch.config().agent.history_messages)
                .iter()
                .map(|m| ModelMessage {
                    role: match m.role {
                        MessageRole::User => "user".to_string(),
                        MessageRole::Assistant => "assistant".to_string(),
                    },
                    content: m.content.clone(),
                })
                .collect::<Vec<_>>()
        });

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

        let outcome = self
            .drive_turn(&session, assistant_id, user_text, history)
            .await;

        match outcome {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Every failure still produces a finalized assistant message.
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

    async fn drive_turn(
        &self,
        session: &Session,
        assistant_id: MessageId,
        user_text: &str,
        mut conversation: Vec<ModelMessage>,
    ) -> Result<TurnOutcome, AgentLoopError> {
        let sandbox = self
            .orch
            .store()
            .read(|s| s.active_sandbox_for_session(&session.id).cloned())
            .filter(|r| r.placement.is_placed() && usable_for_exec(r))
            .ok_or_else(|| AgentLoopError::NoSandbox(session.id.to_string()))?;

        let agent_cfg = &self.orch.config().agent;
        let context = ContextBuilder::from_config(agent_cfg);
        let token = self
            .orch
            .credentials()
            .fresh_token(
                self.orch.githost().as_ref(),
                &sandbox.owner_id,
                self.orch.clock().epoch_ms(),
            )
            .await?;

        let tree = self
            .orch
            .githost()
            .get_tree(&token, &session.repo_id, &sandbox.effective_branch)
            .await?;
        let mut files = Vec::new();
        for path in context.select_paths(&tree) {
            if let Some(content) = self
                .orch
                .githost()
                .get_file(&token, &session.repo_id, &sandbox.effective_branch, &path)
                .await?
            {
                files.push(ContextFile { path, content });
            }
        }
        let instructions = self
            .orch
            .githost()
            .get_file(&token, &session.repo_id, &sandbox.effective_branch, "AGENTS.md")
            .await?;

        conversation.push(ModelMessage::user(user_text));

        // The session's view of file contents: overlays for the prompt and
        // the base for exact-substring edits. Seeded from the session's
        // prior turns so the model sees its own edits, never stale disk.
        let mut file_cache: HashMap<String, String> = self.orch.store().read(|s| {
            let mut sets: Vec<&sb_core::FileChangeSet> =
                s.file_changes.values().filter(|f| f.session_id == session.id).collect();
            sets.sort_by_key(|f| (f.recorded_at_ms, f.message_id));
            let mut cache = HashMap::new();
            for set in sets {
                for change in &set.changes {
                    cache.insert(change.path.clone(), change.content.clone());
                }
            }
            cache
        });
        let mut originals: BTreeMap<String, Option<String>> = BTreeMap::new();
        let mut explanations: Vec<String> = Vec::new();
        let mut commands: Vec<CommandResult> = Vec::new();
        let mut stopped = false;
        let mut iterations = 0u32;

        'turn: for _ in 0..agent_cfg.max_iterations {
            iterations += 1;

            let prompt =
                context.build_prompt(&tree, &files, instructions.as_deref(), &file_cache);
            let request = ModelRequest {
                system: prompt,
                messages: conversation.clone(),
                model_id: agent_cfg.model.model_id.clone(),
                max_tokens: agent_cfg.model.max_tokens,
            };

            let stream = self.model.stream(request).await?;
            let store = self.orch.store().clone();
            let session_id = session.id;
            let end = drive_stream(
                stream,
                |excerpt| {
                    let flush = store.commit(&[Event::MessageStreamed {
                        id: assistant_id,
                        content: excerpt.to_string(),
                    }]);
                    if let Err(e) = flush {
                        tracing::warn!(error = %e, "excerpt flush failed");
                    }
                },
                || store.read(|s| s.sessions.get(&session_id).map(|s| s.stop_requested))
                    .unwrap_or(false),
            )
            .await?;

            stopped = end.was_stopped();
            let full_text = end.text().to_string();
            let blocks = parse_blocks(&full_text);
            let mut iteration_outputs: Vec<String> = Vec::new();
            let mut saw_bash = false;

            for block in blocks {
                match block {
                    Block::Explanation(text) => explanations.push(text),

                    Block::File { path, content } => {
                        if !originals.contains_key(&path) {
                            let prior = match file_cache.get(&path) {
                                Some(cached) => Some(cached.clone()),
                                None => self.read_sandbox_file(&sandbox, &path).await,
                            };
                            originals.insert(path.clone(), prior);
                        }
                        self.write_sandbox_file(&sandbox, &path, &content).await;
                        file_cache.insert(path, content);
                    }

                    Block::Edit { path, edits } => {
                        let current = match file_cache.get(&path) {
                            Some(cached) => Some(cached.clone()),
                            None => self.read_sandbox_file(&sandbox, &path).await,
                        };
                        let Some(current) = current else {
                            tracing::warn!(path = %path, "edit target unreadable, skipping block");
                            continue;
                        };
                        originals.entry(path.clone()).or_insert_with(|| Some(current.clone()));

                        let outcome = apply_edits(&current, &edits);
                        if outcome.failed > 0 {
                            tracing::warn!(
                                path = %path,
                                failed = outcome.failed,
                                applied = outcome.applied,
                                "some edits did not match"
                            );
                        }
                        self.write_sandbox_file(&sandbox, &path, &outcome.content).await;
                        file_cache.insert(path, outcome.content);
                    }

                    Block::Bash(command) => {
                        saw_bash = true;
                        let result = self.run_command(&sandbox, &command).await;
                        self.record_command(session, assistant_id, &result);
                        iteration_outputs
                            .push(format!("$ {}\n{}", result.command, result.output));
                        commands.push(result);
                    }
                }
            }

            if stopped {
                break 'turn;
            }
            if !saw_bash {
                break 'turn;
            }

            conversation.push(ModelMessage::assistant(full_text));
            conversation
                .push(ModelMessage::user(format!("[bash output]\n{}", iteration_outputs.join("\n\n"))));
        }

        finalize_turn(
            &self.orch,
            session,
            &sandbox,
            assistant_id,
            originals,
            file_cache,
            explanations,
            commands,
            stopped,
            iterations,
        )
        .await
    }

    async fn run_command(&self, sandbox: &SandboxRecord, command: &str) -> CommandResult {
        if let Some(reason) = denied_reason(command) {
            tracing::info!(command, reason = %reason, "command denied");
            return CommandResult {
                command: command.to_string(),
                exit_code: 1,
                output: REFUSAL.to_string(),
            };
        }

        let request = ExecRequest {
            command: command.to_string(),
            timeout_secs: Some(self.orch.config().host.exec_timeout_secs),
        };
        match self.orch.host().exec(&sandbox.placement.host_id, &request).await {
            Ok(response) => CommandResult {
                command: command.to_string(),
                exit_code: response.exit_code,
                output: truncate_middle(
                    &response.combined_output(),
                    self.orch.config().agent.output_truncate_bytes,
                ),
            },
            Err(e) => CommandResult {
                command: command.to_string(),
                exit_code: -1,
                output: format!("command did not run: {e}"),
            },
        }
    }

    fn record_command(&self, session: &Session, assistant_id: MessageId, result: &CommandResult) {
        let blocked = result.output == REFUSAL;
        let record = Event::BashCommandRecorded {
            message_id: assistant_id,
            session_id: session.id,
            command: result.command.clone(),
            exit_code: result.exit_code,
            output: result.output.clone(),
            blocked,
            at_ms: self.orch.clock().epoch_ms(),
        };
        if let Err(e) = self.orch.store().commit(&[record]) {
            tracing::error!(error = %e, "failed to record command");
        }
    }

    async fn read_sandbox_file(&self, sandbox: &SandboxRecord, path: &str) -> Option<String> {
        let request = ExecRequest::new(format!("cat -- {}", shell_quote(path)));
        match self.orch.host().exec(&sandbox.placement.host_id, &request).await {
            Ok(response) if response.success() => Some(response.combined_output()),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "sandbox read failed");
                None
            }
        }
    }

    async fn write_sandbox_file(&self, sandbox: &SandboxRecord, path: &str, content: &str) {
        let dir = path.rsplit_once('/').map(|(d, _)| d).unwrap_or(".");
        let command = format!(
            "mkdir -p {} && cat > {} <<'SANDBAR_EOF'\n{}\nSANDBAR_EOF",
            shell_quote(dir),
            shell_quote(path),
            content,
        );
        let request = ExecRequest::new(command);
        match self.orch.host().exec(&sandbox.placement.host_id, &request).await {
            Ok(response) if !response.success() => {
                tracing::warn!(path = %path, exit = response.exit_code, "sandbox write failed");
            }
            Err(e) => tracing::warn!(path = %path, error = %e, "sandbox write failed"),
            _ => {}
        }
    }
}

/// Finalization shared by both drivers: dedupe changes, build the summary,
/// auto-commit when configured, and complete the assistant message.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn finalize_turn<H, S, C>(
    orch: &Orchestrator<H, S, C>,
    session: &Session,
    sandbox: &SandboxRecord,
    assistant_id: MessageId,
    originals: BTreeMap<String, Option<String>>,
    file_cache: HashMap<String, String>,
    explanations: Vec<String>,
    commands: Vec<CommandResult>,
    stopped: bool,
    iterations: u32,
) -> Result<TurnOutcome, AgentLoopError>
where
    H: HostBackend,
    S: SourceHost,
    C: Clock,
{
    // Last write per path wins; untouched cache entries are reads.
    let changes: Vec<FileChange> = originals
        .into_iter()
        .filter_map(|(path, original_content)| {
            file_cache.get(&path).map(|content| FileChange {
                path,
                content: content.clone(),
                original_content,
            })
        })
        .collect();
    let changed_paths: Vec<String> = changes.iter().map(|c| c.path.clone()).collect();

    let mut summary = build_summary(&explanations, &commands);
    if stopped {
        summary.push_str("\n\n*(Stopped)*");
    }

    let mut committed = false;
    if !stopped && !changes.is_empty() {
        if let Some(work_branch) = &session.work_branch {
            match commit_turn_changes(orch, session, sandbox, work_branch, &summary, &changes)
                .await
            {
                Ok(sha) => {
                    committed = true;
                    orch.store().commit(&[Event::SandboxCommitRecorded {
                        id: sandbox.id,
                        commit_sha: sha,
                    }])?;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "auto-commit failed");
                }
            }
        }
    }

    let now = orch.clock().epoch_ms();
    let mut events = Vec::new();
    if !changes.is_empty() {
        events.push(Event::FileChangesRecorded {
            message_id: assistant_id,
            session_id: session.id,
            changes,
            at_ms: now,
        });
    }
    events.push(Event::MessageFinalized {
        id: assistant_id,
        content: summary,
        committed,
        at_ms: now,
    });
    orch.store().commit(&events)?;

    Ok(TurnOutcome {
        message_id: assistant_id,
        iterations,
        stopped,
        committed,
        errored: false,
        changed_paths,
    })
}

/// Commit the turn's changes to the work branch and open (or reuse) a pull
/// request against the default branch.
pub(crate) async fn commit_turn_changes<H, S, C>(
    orch: &Orchestrator<H, S, C>,
    session: &Session,
    sandbox: &SandboxRecord,
    work_branch: &str,
    summary: &str,
    changes: &[FileChange],
) -> Result<String, AgentLoopError>
where
    H: HostBackend,
    S: SourceHost,
    C: Clock,
{
    let token = orch
        .credentials()
        .fresh_token(orch.githost().as_ref(), &sandbox.owner_id, orch.clock().epoch_ms())
        .await?;
    let githost = orch.githost();
    let repo = githost.get_repo(&token, &session.repo_id).await?;

    if githost.get_branch(&token, &session.repo_id, work_branch).await?.is_none() {
        let base = githost
            .get_branch(&token, &session.repo_id, &repo.default_branch)
            .await?
            .ok_or_else(|| sb_githost::SourceHostError::NotFound(repo.default_branch.clone()))?;
        githost.create_branch(&token, &session.repo_id, work_branch, &base.sha).await?;
    }

    let message = commit_message(summary);
    let files: Vec<CommitFile> = changes
        .iter()
        .map(|c| CommitFile { path: c.path.clone(), content: c.content.clone() })
        .collect();
    let sha = githost.commit_files(&token, &session.repo_id, work_branch, &message, &files).await?;

    githost
        .open_or_reuse_pull_request(
            &token,
            &session.repo_id,
            work_branch,
            &repo.default_branch,
            &message,
        )
        .await?;
    Ok(sha)
}

pub(crate) fn usable_for_exec(record: &SandboxRecord) -> bool {
    use sb_core::SandboxStatus::*;
    matches!(record.status, Ready | Active)
}

pub(crate) fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// First explanation, the per-command status block, then any later
/// explanations.
fn build_summary(explanations: &[String], commands: &[CommandResult]) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(first) = explanations.first() {
        parts.push(first.clone());
    }

    if !commands.is_empty() {
        let mut block = String::new();
        for result in commands {
            let mark = if result.exit_code == 0 { "✓" } else { "✗" };
            block.push_str(&format!("{mark} `{}`", result.command));
            if result.exit_code != 0 {
                block.push_str(&format!(" (exit {})", result.exit_code));
                for line in last_lines(&result.output, 3) {
                    block.push_str(&format!("\n    {line}"));
                }
            }
            block.push('\n');
        }
        parts.push(block.trim_end().to_string());
    }

    for explanation in explanations.iter().skip(1) {
        parts.push(explanation.clone());
    }

    if parts.is_empty() {
        parts.push("Done.".to_string());
    }
    parts.join("\n\n")
}

fn last_lines(text: &str, n: usize) -> Vec<&str> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].to_vec()
}

/// Commit message: first line of the summary, markdown stripped, bounded.
fn commit_message(summary: &str) -> String {
    let first_line = summary.lines().next().unwrap_or("Update files");
    let cleaned: String = first_line
        .chars()
        .filter(|c| *c != '`' && *c != '*' && *c != '#')
        .collect();
    let cleaned = cleaned.trim();
    let mut message: String = cleaned.chars().take(72).collect();
    message = message.trim_end().to_string();
    if message.is_empty() {
        message = "Update files".to_string();
    }
    message
}

#[cfg(test)]
#[path = "turn_tests.rs"]
mod tests;

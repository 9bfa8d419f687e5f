// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session, message, and agent-record event handlers.

use sb_core::{BashCommandRecord, Event, FileChangeSet, Message, MessageStatus, Session};

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::SessionCreated { id, repo_id, branch, work_branch, at_ms } => {
            if !state.sessions.contains_key(id) {
                state.sessions.insert(
                    *id,
                    Session {
                        id: *id,
                        repo_id: repo_id.clone(),
                        branch: branch.clone(),
                        work_branch: work_branch.clone(),
                        sandbox_id: None,
                        stop_requested: false,
                        created_at_ms: *at_ms,
                    },
                );
            }
        }

        Event::SessionSandboxAttached { id, sandbox_id } => {
            if let Some(session) = state.sessions.get_mut(id) {
                session.sandbox_id = Some(*sandbox_id);
            }
        }

        Event::SessionStopRequested { id, stop } => {
            if let Some(session) = state.sessions.get_mut(id) {
                session.stop_requested = *stop;
            }
        }

        Event::MessageCreated { id, session_id, role, content, at_ms } => {
            if !state.messages.contains_key(id) {
                state.messages.insert(
                    *id,
                    Message {
                        id: *id,
                        session_id: *session_id,
                        role: *role,
                        content: content.clone(),
                        status: MessageStatus::Streaming,
                        committed: false,
                        created_at_ms: *at_ms,
                    },
                );
            }
        }

        Event::MessageStreamed { id, content } => {
            if let Some(message) = state.messages.get_mut(id) {
                // Excerpts never regress a finalized message.
                if message.status == MessageStatus::Streaming {
                    message.content = content.clone();
                }
            }
        }

        Event::MessageFinalized { id, content, committed, at_ms: _ } => {
            if let Some(message) = state.messages.get_mut(id) {
                message.content = content.clone();
                message.status = MessageStatus::Complete;
                message.committed = *committed;
            }
        }

        Event::FileChangesRecorded { message_id, session_id, changes, at_ms } => {
            state.file_changes.insert(
                *message_id,
                FileChangeSet {
                    message_id: *message_id,
                    session_id: *session_id,
                    changes: changes.clone(),
                    recorded_at_ms: *at_ms,
                },
            );
        }

        Event::BashCommandRecorded {
            message_id,
            session_id,
            command,
            exit_code,
            output,
            blocked,
            at_ms,
        } => {
            let records = state.bash_commands.entry(*message_id).or_default();
            let record = BashCommandRecord {
                message_id: *message_id,
                session_id: *session_id,
                command: command.clone(),
                exit_code: *exit_code,
                output: output.clone(),
                blocked: *blocked,
                ran_at_ms: *at_ms,
            };
            // Replay guard: the same command may complete once but be
            // committed twice across a crash boundary.
            let duplicate = records
                .last()
                .map(|r| r.command == record.command && r.ran_at_ms == record.ran_at_ms)
                .unwrap_or(false);
            if !duplicate {
                records.push(record);
            }
        }

        _ => {}
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::state::MaterializedState;
use sb_core::session::{MessageRole, MessageStatus};
use sb_core::test_support::*;
use sb_core::{Event, FileChange, MessageId, SessionId};

#[test]
fn session_lifecycle() {
    let mut state = MaterializedState::default();
    state.apply_event(&session_created_event("sess-1", "acme/widgets", "main"));
    state.apply_event(&Event::SessionStopRequested {
        id: SessionId::from_string("sess-1"),
        stop: true,
    });

    let session = state.sessions.get("sess-1").unwrap();
    assert!(session.stop_requested);
    assert_eq!(session.repo_id, "acme/widgets");
}

#[test]
fn streamed_excerpts_update_until_finalized() {
    let mut state = MaterializedState::default();
    state.apply_event(&message_created_event("msg-1", "sess-1", MessageRole::Assistant, ""));
    state.apply_event(&Event::MessageStreamed {
        id: MessageId::from_string("msg-1"),
        content: "Working on it".to_string(),
    });
    assert_eq!(state.messages.get("msg-1").unwrap().content, "Working on it");

    state.apply_event(&Event::MessageFinalized {
        id: MessageId::from_string("msg-1"),
        content: "All done".to_string(),
        committed: true,
        at_ms: 2_000,
    });
    // Late excerpt flushes never regress a finalized message
    state.apply_event(&Event::MessageStreamed {
        id: MessageId::from_string("msg-1"),
        content: "stale".to_string(),
    });

    let message = state.messages.get("msg-1").unwrap();
    assert_eq!(message.content, "All done");
    assert_eq!(message.status, MessageStatus::Complete);
    assert!(message.committed);
}

#[test]
fn recent_messages_returns_window_oldest_first() {
    let mut state = MaterializedState::default();
    for i in 0..5u64 {
        state.apply_event(&Event::MessageCreated {
            id: MessageId::from_string(format!("msg-{i}")),
            session_id: SessionId::from_string("sess-1"),
            role: MessageRole::User,
            content: format!("m{i}"),
            at_ms: 1_000 + i,
        });
    }

    let recent: Vec<&str> =
        state.recent_messages(&SessionId::from_string("sess-1"), 3).iter().map(|m| m.content.as_str()).collect();
    assert_eq!(recent, vec!["m2", "m3", "m4"]);
}

#[test]
fn file_changes_and_bash_records() {
    let mut state = MaterializedState::default();
    let message_id = MessageId::from_string("msg-1");
    let session_id = SessionId::from_string("sess-1");

    state.apply_event(&Event::FileChangesRecorded {
        message_id,
        session_id,
        changes: vec![FileChange {
            path: "src/app.ts".to_string(),
            content: "new".to_string(),
            original_content: Some("old".to_string()),
        }],
        at_ms: 2_000,
    });
    let bash = Event::BashCommandRecorded {
        message_id,
        session_id,
        command: "npm test".to_string(),
        exit_code: 0,
        output: "ok".to_string(),
        blocked: false,
        at_ms: 2_100,
    };
    state.apply_event(&bash);
    // Replay of the same committed record is collapsed
    state.apply_event(&bash);

    assert_eq!(state.file_changes.get("msg-1").unwrap().changes.len(), 1);
    assert_eq!(state.bash_commands.get("msg-1").unwrap().len(), 1);
}

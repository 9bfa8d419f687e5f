// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::model::FakeModel;
use sb_core::sandbox::CallbackStatus;
use sb_core::{Config, FakeClock};
use sb_engine::StatusCallback;
use sb_githost::{CredentialStore, FakeSourceHost, StoredCredential};
use sb_host::{FakeHost, HostGateway};
use sb_storage::Store;
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    agent: AgentLoop<FakeHost, FakeSourceHost, FakeClock, FakeModel>,
    orch: Orchestrator<FakeHost, FakeSourceHost, FakeClock>,
    host: FakeHost,
    githost: FakeSourceHost,
    model: FakeModel,
    session: SessionId,
    _dir: tempfile::TempDir,
}

async fn fixture(work_branch: Option<&str>, mut config: Config) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    config.host.auth_secret = "host-secret".to_string();

    let clock = FakeClock::new();
    let host = FakeHost::new();
    let githost = FakeSourceHost::new();
    githost.add_file("acme/widgets", "main", "src/app.ts", "let x: string = 1;\n");
    githost.add_file("acme/widgets", "main", "AGENTS.md", "Prefer small diffs.");
    let credentials = CredentialStore::new();
    credentials.put("", StoredCredential::new("token", "refresh", u64::MAX));

    let gateway = HostGateway::new(host.clone()).with_backoff_base(Duration::from_millis(1));
    let orch = Orchestrator::new(
        store,
        gateway,
        Arc::new(githost.clone()),
        credentials,
        Arc::new(config),
        clock.clone(),
    );

    let session = orch.create_session("acme/widgets", "main", work_branch).unwrap();
    let sandbox = orch.request_sandbox(&session).await.unwrap();
    orch.process_requested().await;
    let record = orch.store().read(|s| s.sandboxes.get(&sandbox).cloned()).unwrap();
    for status in [
        CallbackStatus::Cloning,
        CallbackStatus::Installing,
        CallbackStatus::Starting,
        CallbackStatus::Ready,
    ] {
        orch.apply_callback(&StatusCallback {
            sandbox_name: record.name.clone(),
            api_secret: record.api_secret.clone(),
            status,
            error_message: None,
            build_log: None,
            image: None,
            checkpoint: None,
        })
        .unwrap();
    }

    let model = FakeModel::new();
    let agent = AgentLoop::new(orch.clone(), Arc::new(model.clone()));
    Fixture { agent, orch, host, githost, model, session, _dir: dir }
}

fn exec_ok(fx: &Fixture, stdout: &str) {
    fx.host.push_exec_output(stdout, 0);
}

const EDIT_RESPONSE: &str = concat!(
    "<explanation>\nFix the type annotation.\n</explanation>\n",
    "<edit path=\"src/app.ts\">\n",
    "<<<<<<< SEARCH\nlet x: string = 1;\n=======\nlet x: number = 1;\n>>>>>>> REPLACE\n",
    "</edit>\n",
);

#[tokio::test]
async fn edit_only_turn_finishes_in_one_iteration() {
    let fx = fixture(None, Config::default()).await;
    fx.model.push_response(EDIT_RESPONSE);
    exec_ok(&fx, "let x: string = 1;\n"); // cat of the edit target
    exec_ok(&fx, ""); // write-back

    let outcome = fx.agent.run_turn(&fx.session, "fix the type error").await.unwrap();

    assert_eq!(outcome.iterations, 1);
    assert!(!outcome.stopped);
    assert!(!outcome.committed);
    assert_eq!(outcome.changed_paths, vec!["src/app.ts".to_string()]);

    let changes = fx
        .orch
        .store()
        .read(|s| s.file_changes.get(&outcome.message_id).cloned())
        .unwrap();
    assert_eq!(changes.changes.len(), 1);
    assert_eq!(changes.changes[0].content, "let x: number = 1;\n");
    assert_eq!(changes.changes[0].original_content.as_deref(), Some("let x: string = 1;\n"));

    let message = fx.orch.store().read(|s| s.messages.get(&outcome.message_id).cloned()).unwrap();
    assert!(message.content.starts_with("Fix the type annotation."));
    assert_eq!(message.status, sb_core::MessageStatus::Complete);
}

#[tokio::test]
async fn prompt_carries_tree_instructions_and_overlays() {
    let fx = fixture(None, Config::default()).await;
    fx.model.push_response(EDIT_RESPONSE);
    exec_ok(&fx, "let x: string = 1;\n");
    exec_ok(&fx, "");
    fx.agent.run_turn(&fx.session, "fix it").await.unwrap();

    // Second turn: the model must see the session's own edit, not the
    // original snapshot.
    fx.model.push_response("<explanation>\nLooks good.\n</explanation>");
    fx.agent.run_turn(&fx.session, "check it").await.unwrap();

    let requests = fx.model.requests();
    assert!(requests[0].system.contains("src/app.ts"));
    assert!(requests[0].system.contains("Prefer small diffs."));
    assert!(requests[0].system.contains("let x: string = 1;"));
    // The second turn overlays the session's own prior edit on the
    // snapshot instead of the stale branch content.
    assert!(requests[1].system.contains("let x: number = 1;"));
    assert!(!requests[1].system.contains("let x: string = 1;"));
    assert_eq!(requests[1].messages.len(), 3);
    assert_eq!(requests[1].messages[0].content, "fix it");
}

#[tokio::test]
async fn bash_failure_feeds_back_and_recovers_next_iteration() {
    let fx = fixture(Some("agent/fix-types"), Config::default()).await;

    let first = format!("{EDIT_RESPONSE}<bash>\ntsc --noEmit\n</bash>\n");
    let second = concat!(
        "<explanation>\nAlso update the declaration.\n</explanation>\n",
        "<edit path=\"src/app.ts\">\n",
        "<<<<<<< SEARCH\nlet x: number = 1;\n=======\nconst x: number = 1;\n>>>>>>> REPLACE\n",
        "</edit>\n",
        "<bash>\ntsc --noEmit\n</bash>\n",
    );
    let third = "<explanation>\nType check passes now.\n</explanation>";
    fx.model.push_response(&first);
    fx.model.push_response(second);
    fx.model.push_response(third);

    exec_ok(&fx, "let x: string = 1;\n"); // iteration 1: cat
    exec_ok(&fx, ""); // iteration 1: write
    fx.host.push_exec_output("error TS2322: type mismatch", 1); // tsc fails
    exec_ok(&fx, ""); // iteration 2: write (target already cached)
    exec_ok(&fx, ""); // iteration 2: tsc passes

    let outcome = fx.agent.run_turn(&fx.session, "fix the type error").await.unwrap();

    assert_eq!(outcome.iterations, 3);
    assert!(outcome.committed);

    // Per-path dedupe: one change carrying the final content and the
    // original from before the first edit.
    let changes = fx
        .orch
        .store()
        .read(|s| s.file_changes.get(&outcome.message_id).cloned())
        .unwrap();
    assert_eq!(changes.changes.len(), 1);
    assert_eq!(changes.changes[0].content, "const x: number = 1;\n");
    assert_eq!(changes.changes[0].original_content.as_deref(), Some("let x: string = 1;\n"));

    // Summary shows the failed and the successful run.
    let message = fx.orch.store().read(|s| s.messages.get(&outcome.message_id).cloned()).unwrap();
    assert!(message.content.contains("✗ `tsc --noEmit`"));
    assert!(message.content.contains("✓ `tsc --noEmit`"));
    assert!(message.committed);

    // Auto-commit went to the work branch and opened a PR.
    let commits = fx.githost.commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].branch, "agent/fix-types");
    assert_eq!(commits[0].files[0].path, "src/app.ts");
    assert_eq!(fx.githost.open_prs("acme/widgets").len(), 1);

    // The failing output was fed back to the model.
    let requests = fx.model.requests();
    assert!(requests[1]
        .messages
        .iter()
        .any(|m| m.content.contains("[bash output]") && m.content.contains("TS2322")));
}

#[tokio::test]
async fn denied_command_is_never_executed_but_reported() {
    let fx = fixture(None, Config::default()).await;
    fx.model.push_response("<bash>\nsed -i 's/a/b/' src/app.ts\n</bash>");
    fx.model.push_response("<explanation>\nUnderstood.\n</explanation>");

    let outcome = fx.agent.run_turn(&fx.session, "tweak it").await.unwrap();

    let records = fx
        .orch
        .store()
        .read(|s| s.bash_commands.get(&outcome.message_id).cloned())
        .unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].blocked);
    assert_eq!(records[0].exit_code, 1);
    assert_eq!(records[0].output, REFUSAL);

    // Never reached the host.
    assert!(!fx
        .host
        .calls()
        .iter()
        .any(|c| matches!(c, sb_host::FakeCall::Exec { command, .. } if command.contains("sed"))));

    // The refusal went back to the model so it could recover.
    let requests = fx.model.requests();
    assert!(requests[1].messages.iter().any(|m| m.content.contains(REFUSAL)));
}

#[tokio::test(start_paused = true)]
async fn stop_request_lands_within_the_check_interval() {
    let fx = fixture(Some("agent/work"), Config::default()).await;
    fx.model.push_hanging(vec!["<explanation>\nThinking…".to_string()]);

    let agent = fx.agent.clone();
    let session = fx.session;
    let turn = tokio::spawn(async move { agent.run_turn(&session, "do something").await });

    // Let the turn start (it clears the stop flag first), then stop it.
    tokio::time::sleep(Duration::from_millis(100)).await;
    fx.orch.request_stop(&fx.session, true).unwrap();

    let outcome = turn.await.unwrap().unwrap();
    assert!(outcome.stopped);
    assert!(!outcome.committed);

    let message = fx.orch.store().read(|s| s.messages.get(&outcome.message_id).cloned()).unwrap();
    assert!(message.content.ends_with("*(Stopped)*"));
    assert!(!message.committed);
}

#[tokio::test]
async fn model_error_finalizes_with_error_summary() {
    let fx = fixture(Some("agent/work"), Config::default()).await;
    // No scripted model response: the stream call fails.

    let outcome = fx.agent.run_turn(&fx.session, "do something").await.unwrap();

    assert!(outcome.errored);
    assert!(!outcome.committed);
    let message = fx.orch.store().read(|s| s.messages.get(&outcome.message_id).cloned()).unwrap();
    assert!(message.content.starts_with("Sorry, I ran into an error:"));
    assert!(!message.committed);
}

#[tokio::test]
async fn missing_sandbox_is_a_soft_error_turn() {
    let fx = fixture(None, Config::default()).await;
    // Tear the sandbox down first.
    let id = fx.orch.store().read(|s| {
        s.active_sandbox_for_session(&fx.session).map(|r| r.id)
    })
    .unwrap();
    fx.orch.stop_sandbox(&id).unwrap();
    fx.orch.process_stopping().await;

    let outcome = fx.agent.run_turn(&fx.session, "hello?").await.unwrap();
    assert!(outcome.errored);
    let message = fx.orch.store().read(|s| s.messages.get(&outcome.message_id).cloned()).unwrap();
    assert!(message.content.starts_with("Sorry, I ran into an error:"));
}

#[tokio::test(start_paused = true)]
async fn only_one_turn_per_session() {
    let fx = fixture(None, Config::default()).await;
    fx.model.push_hanging(vec![]);

    let agent = fx.agent.clone();
    let session = fx.session;
    let running = tokio::spawn(async move { agent.run_turn(&session, "first").await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = fx.agent.run_turn(&fx.session, "second").await.unwrap_err();
    assert!(matches!(err, AgentLoopError::TurnInProgress(_)));

    fx.orch.request_stop(&fx.session, true).unwrap();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn iteration_cap_bounds_the_loop() {
    let mut config = Config::default();
    config.agent.max_iterations = 2;
    let fx = fixture(None, config).await;

    // The model keeps asking for commands forever.
    for _ in 0..5 {
        fx.model.push_response("<bash>\nnpm test\n</bash>");
    }

    let outcome = fx.agent.run_turn(&fx.session, "loop forever").await.unwrap();
    assert_eq!(outcome.iterations, 2);
    assert_eq!(fx.model.requests().len(), 2);
}

#[test]
fn commit_message_is_first_line_sanitized() {
    assert_eq!(
        super::commit_message("Fix `parseUser` **crash**\n\nmore detail"),
        "Fix parseUser crash"
    );
    let long = "x".repeat(200);
    assert!(super::commit_message(&long).len() <= 72);
    assert_eq!(super::commit_message(""), "Update files");
}

//! End-to-end scenarios for the session orchestrator
//!
//! Each test drives the real control flow: SessionManager spawns an
//! ExecutionLoop over a scripted LLM client and the in-memory store, and
//! assertions read back what the loop persisted.

use std::sync::Arc;
use std::time::Duration;

use sessiond::llm::client::mock::MockLlmClient;
use sessiond::llm::{ContentBlock, Message};
use sessiond::{
    ActivityKind, ChannelBroadcaster, Checklist, ChecklistItem, Checkpoint, Config, ContextGuard, ContextThresholds,
    Hat, InMemoryStore, ItemStatus, Session, SessionManager, Store, Task, TaskStatus, TerminationReason, Topic,
};

fn manager_with(
    store: &Arc<InMemoryStore>,
    llm: &Arc<MockLlmClient>,
) -> Arc<SessionManager> {
    SessionManager::new(
        store.clone(),
        llm.clone(),
        Arc::new(ChannelBroadcaster::new(256)),
        Config::default(),
    )
}

async fn make_task(store: &InMemoryStore) -> Task {
    let task = Task::new("Wire up retries", "Add retry logic to the fetch path", "proj-1");
    store.create_task(task.clone()).await.unwrap();
    task
}

async fn wait_terminal(store: &InMemoryStore, session_id: &str) -> Session {
    for _ in 0..500 {
        if let Some(session) = store.get_session(session_id).await.unwrap() {
            if session.state.is_terminal() {
                return session;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session {} did not reach a terminal state", session_id);
}

async fn wait_task_status(store: &InMemoryStore, task_id: &str, status: TaskStatus) -> Task {
    for _ in 0..500 {
        let task = store.get_task(task_id).await.unwrap().unwrap();
        if task.status == status {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {} never reached {:?}", task_id, status);
}

/// Scenario 1: one-item checklist, the model marks it done and completes.
#[tokio::test]
async fn clean_completion() {
    let store = Arc::new(InMemoryStore::new());
    let llm = Arc::new(MockLlmClient::new(vec![MockLlmClient::text_response(
        "CHECKLIST_DONE:it-1\nEVENT:task.complete",
    )]));
    let manager = manager_with(&store, &llm);
    let temp = tempfile::tempdir().unwrap();

    let task = make_task(&store).await;
    store
        .create_checklist(Checklist::new(&task.id, vec![ChecklistItem::new("it-1", "retries wired")]))
        .await
        .unwrap();

    let session = manager
        .create_session(&task, Hat::Editor, &temp.path().to_string_lossy())
        .await
        .unwrap();
    manager.start(&session.id).await.unwrap();

    let finished = wait_terminal(&store, &session.id).await;
    assert_eq!(finished.state, sessiond::SessionState::Completed);
    assert_eq!(finished.termination_reason, Some(TerminationReason::Completed));

    let checklist = store.get_checklist_for_task(&task.id).await.unwrap().unwrap();
    assert_eq!(checklist.items[0].status, ItemStatus::Done);

    let completions: Vec<_> = store
        .list_activity_for_session(&session.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|a| a.kind == ActivityKind::Completion)
        .collect();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].payload["signal"], "task.complete");

    let events = store.list_events_for_session(&session.id).await.unwrap();
    assert!(events.iter().any(|e| e.topic == Topic::TaskComplete));
}

/// Scenario 2: completion without ACKNOWLEDGE_FAILURES while items are
/// open gets a corrective turn instead of a terminal event.
#[tokio::test]
async fn completion_blocked_by_open_item() {
    let store = Arc::new(InMemoryStore::new());
    let llm = Arc::new(MockLlmClient::new(vec![
        MockLlmClient::text_response("All finished, I believe.\nEVENT:task.complete"),
        MockLlmClient::text_response("CHECKLIST_DONE:it-1\nCHECKLIST_DONE:it-2\nEVENT:task.complete"),
    ]));
    let manager = manager_with(&store, &llm);
    let temp = tempfile::tempdir().unwrap();

    let task = make_task(&store).await;
    store
        .create_checklist(Checklist::new(
            &task.id,
            vec![
                ChecklistItem::new("it-1", "retries wired"),
                ChecklistItem::new("it-2", "tests added"),
            ],
        ))
        .await
        .unwrap();

    let session = manager
        .create_session(&task, Hat::Editor, &temp.path().to_string_lossy())
        .await
        .unwrap();
    manager.start(&session.id).await.unwrap();

    let finished = wait_terminal(&store, &session.id).await;
    assert_eq!(finished.termination_reason, Some(TerminationReason::Completed));
    assert_eq!(finished.iteration, 2);

    // The second request carried the corrective user turn enumerating the
    // open items; no terminal event was emitted for the first attempt.
    let requests = llm.requests();
    assert_eq!(requests.len(), 2);
    let corrective = requests[1].messages.last().unwrap().text();
    assert!(corrective.contains("not done"));
    assert!(corrective.contains("it-1"));
    assert!(corrective.contains("it-2"));
    assert!(corrective.contains("ACKNOWLEDGE_FAILURES"));

    let events = store.list_events_for_session(&session.id).await.unwrap();
    let completes = events.iter().filter(|e| e.topic == Topic::TaskComplete).count();
    assert_eq!(completes, 1);
}

/// Scenario 3: a bulky transcript over 50% of a 200k window compacts to
/// under the 35% target, keeping the head and the recent tail.
#[tokio::test]
async fn compaction_threshold() {
    let guard = ContextGuard::new(ContextThresholds {
        window: 200_000,
        ..Default::default()
    });

    let mut transcript = vec![Message::user("Work through the checklist for this task.")];
    for i in 0..40 {
        let id = format!("tu_{}", i);
        transcript.push(Message::assistant_blocks(vec![ContentBlock::ToolUse {
            id: id.clone(),
            name: "read_file".to_string(),
            input: serde_json::json!({"path": format!("src/file_{}.rs", i)}),
        }]));
        transcript.push(Message::user_blocks(vec![ContentBlock::tool_result(
            id,
            "x".repeat(10_000),
            false,
        )]));
    }
    assert!(sessiond::context::estimate_transcript(&transcript) > 100_000);

    let tail: Vec<Message> = transcript[transcript.len() - 6..].to_vec();
    let result = guard.check_and_compact(&transcript, "").await.expect("should compact");

    assert!(sessiond::context::estimate_transcript(&result.transcript) <= 70_000);

    // Head survives; the last six turns survive verbatim.
    let texts: Vec<String> = result.transcript.iter().map(|m| m.text()).collect();
    assert!(texts.iter().any(|t| t == "Work through the checklist for this task."));
    for turn in &tail {
        assert!(result.transcript.contains(turn), "recent tail turn evicted");
    }

    // Synthetic summary turn prepended iff the removal level reached 50%.
    let has_summary = result.transcript[0].text().starts_with("## Compacted Context Summary");
    assert_eq!(has_summary, result.level >= 0.50);
}

/// Scenario 4: six identical read_file calls - the sixth is blocked, and
/// after three blocks the loop terminates with repetition_loop.
#[tokio::test]
async fn repetition_loop_terminates() {
    let store = Arc::new(InMemoryStore::new());
    let responses = (0..8)
        .map(|i| {
            MockLlmClient::tool_response(
                &format!("tu_{}", i),
                "read_file",
                serde_json::json!({"path": "src/lib.rs"}),
            )
        })
        .collect();
    let llm = Arc::new(MockLlmClient::new(responses));
    let manager = manager_with(&store, &llm);

    let temp = tempfile::tempdir().unwrap();
    std::fs::create_dir(temp.path().join("src")).unwrap();
    std::fs::write(temp.path().join("src/lib.rs"), "fn main() {}").unwrap();

    let task = make_task(&store).await;
    let session = manager
        .create_session(&task, Hat::Creator, &temp.path().to_string_lossy())
        .await
        .unwrap();
    manager.start(&session.id).await.unwrap();

    let finished = wait_terminal(&store, &session.id).await;
    assert_eq!(finished.state, sessiond::SessionState::Failed);
    assert_eq!(finished.termination_reason, Some(TerminationReason::RepetitionLoop));

    // The final checkpoint holds the transcript: calls 6-8 were refused
    // with synthesized error results.
    let checkpoint = Checkpoint::from_value(store.latest_checkpoint(&session.id).await.unwrap().unwrap().payload);
    let blocked: Vec<&str> = checkpoint
        .transcript
        .iter()
        .filter_map(|m| match &m.content {
            sessiond::llm::MessageContent::Blocks(blocks) => Some(blocks),
            _ => None,
        })
        .flatten()
        .filter_map(|b| match b {
            ContentBlock::ToolResult { content, is_error: true, .. } if content.starts_with("Tool call blocked") => {
                Some(content.as_str())
            }
            _ => None,
        })
        .collect();
    assert_eq!(blocked.len(), 3);
}

/// Scenario 5: creator and critic ping-pong; the fourth hat in the
/// A-B-A-B pattern quarantines the task and no new session is created.
#[tokio::test]
async fn hat_oscillation_quarantines_task() {
    let store = Arc::new(InMemoryStore::new());
    let llm = Arc::new(MockLlmClient::new(vec![
        MockLlmClient::text_response("EVENT:implementation.done"),
        MockLlmClient::text_response("Needs rework.\nEVENT:review.rejected"),
        MockLlmClient::text_response("EVENT:implementation.done"),
    ]));
    let manager = manager_with(&store, &llm);
    let temp = tempfile::tempdir().unwrap();

    let task = make_task(&store).await;
    let session = manager
        .create_session(&task, Hat::Creator, &temp.path().to_string_lossy())
        .await
        .unwrap();
    manager.start(&session.id).await.unwrap();

    wait_task_status(&store, &task.id, TaskStatus::Quarantined).await;

    // Three sessions ran (creator, critic, creator); the oscillating
    // fourth was never created.
    assert_eq!(store.list_sessions().await.unwrap().len(), 3);
    assert!(manager.get_by_task(&task.id).is_none());

    // A quarantined task refuses new sessions outright.
    let quarantined = store.get_task(&task.id).await.unwrap().unwrap();
    let refused = manager
        .create_session(&quarantined, Hat::Creator, &temp.path().to_string_lossy())
        .await;
    assert!(refused.is_err());
}

/// Scenario 6: a write_file escaping the worktree comes back as an
/// is_error tool result and the file is never written.
#[tokio::test]
async fn path_sandbox_blocks_escape() {
    let store = Arc::new(InMemoryStore::new());
    let llm = Arc::new(MockLlmClient::new(vec![
        MockLlmClient::tool_response(
            "tu_0",
            "write_file",
            serde_json::json!({"path": "../../etc/passwd", "content": "oops"}),
        ),
        MockLlmClient::text_response("Understood, staying in the worktree.\nEVENT:task.complete"),
    ]));
    let manager = manager_with(&store, &llm);
    let temp = tempfile::tempdir().unwrap();

    let task = make_task(&store).await;
    let session = manager
        .create_session(&task, Hat::Editor, &temp.path().to_string_lossy())
        .await
        .unwrap();
    manager.start(&session.id).await.unwrap();

    let finished = wait_terminal(&store, &session.id).await;
    assert_eq!(finished.termination_reason, Some(TerminationReason::Completed));

    let results: Vec<_> = store
        .list_activity_for_session(&session.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|a| a.kind == ActivityKind::ToolResult)
        .collect();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].payload["is_error"], true);
    assert!(
        results[0].payload["content"]
            .as_str()
            .unwrap()
            .contains("path escapes worktree")
    );

    // Nothing was written outside the worktree and nothing new inside it.
    assert!(!temp.path().join("etc/passwd").exists());
}

//! Orchestrator integration test — full pipeline runs against scripted
//! inference, real record stores and the governance implementations.
//!
//! Covers: rework feedback, gate escalation, provider retries and failures,
//! fail-closed governance, cancellation, resume and concurrent sessions.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use coordination::flow::{StageOutcome, StageRecord, CHECKPOINT_FAILURE_REVIEWER};
use coordination::store::{PatternRecord, Severity};
use coordination::{
    ChannelCheckpoint, EscalationReason, FilePollingCheckpoint, FsRecordStore, GovernanceDecision,
    JsonlPatternSink, MemoryRecordStore, Orchestrator, PipelineSession, PipelineStage,
    RecordStore, TerminalOutcome,
};

use common::{
    accepted, fast_config, topic, BrokenCheckpoint, RecordingCheckpoint, Reply, ScriptedClient,
    Stage, ALL_PASS, ONE_PASS, THREE_PASS,
};

fn orchestrator(
    client: Arc<ScriptedClient>,
    governance: Arc<dyn coordination::GovernanceCheckpoint>,
    store: Arc<dyn RecordStore>,
) -> Orchestrator {
    Orchestrator::new(fast_config(), client, governance, store).unwrap()
}

// ── Rework with feedback, then publish ──────────────────────────────

#[tokio::test]
async fn test_rework_feeds_failures_back_then_publishes() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(ScriptedClient::newsroom().replies(
        Stage::Review,
        vec![Reply::Text(THREE_PASS.into()), Reply::Text(ALL_PASS.into())],
    ));
    let checkpoint = Arc::new(RecordingCheckpoint::approving());
    let sink = Arc::new(JsonlPatternSink::new(dir.path().join("patterns.jsonl")));
    let orch = orchestrator(client.clone(), checkpoint.clone(), Arc::new(MemoryRecordStore::new()))
        .with_pattern_sink(sink.clone());

    let t = topic("t-rework");
    let session = orch.start_session(t.clone(), &accepted(&t)).unwrap();
    let session = orch.run(session, CancellationToken::new()).await.unwrap();

    assert_eq!(session.outcome, Some(TerminalOutcome::Published));
    assert_eq!(session.rework_count(), 1);

    let revision = &client.prompts_for(Stage::Revision)[0];
    assert!(revision.contains("Quality review: 3/5 gates passed."));
    assert!(revision.contains("### Failed gates (2):"));
    assert!(revision.contains("sourcing: council vote figure has no source"));
    assert!(revision.contains("Water rates will rise 4% next year"));

    // governance sees the revised draft and the final gate summary
    let seen = checkpoint.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].draft.starts_with("Revised:"));
    assert_eq!(seen[0].gate_summary, "5/5 passed (pass-through)");
    assert!(seen[0].graphics.is_none());
    assert_eq!(session.governance.as_ref().unwrap().reviewer, "night-desk");

    // two failing gates on the first review → two high-severity patterns
    let text = std::fs::read_to_string(sink.path()).unwrap();
    let records: Vec<PatternRecord> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.severity == Severity::High));
    assert!(records.iter().all(|r| r.session_id == session.id));
}

#[tokio::test]
async fn test_low_pass_count_escalates_without_rework() {
    let client = Arc::new(ScriptedClient::newsroom().reply(Stage::Review, ONE_PASS));
    let orch = orchestrator(
        client.clone(),
        Arc::new(RecordingCheckpoint::approving()),
        Arc::new(MemoryRecordStore::new()),
    );
    let t = topic("t-low");
    let session = orch.start_session(t.clone(), &accepted(&t)).unwrap();
    let session = orch.run(session, CancellationToken::new()).await.unwrap();

    match &session.escalation.as_ref().unwrap().reason {
        EscalationReason::GateEscalation { pass_count, failing } => {
            assert_eq!(*pass_count, 1);
            assert_eq!(failing.len(), 4);
        }
        other => panic!("expected gate escalation, got {other:?}"),
    }
    assert_eq!(session.rework_count(), 0);
    assert!(client.prompts_for(Stage::Revision).is_empty());
}

// ── Provider failures ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_transient_failure_is_retried() {
    let client = Arc::new(ScriptedClient::newsroom().replies(
        Stage::Research,
        vec![
            Reply::Fail(Some(503)),
            Reply::Fail(None),
            Reply::Text("Research: budget office figures.".into()),
        ],
    ));
    let orch = orchestrator(
        client.clone(),
        Arc::new(RecordingCheckpoint::approving()),
        Arc::new(MemoryRecordStore::new()),
    );
    let t = topic("t-retry");
    let session = orch.start_session(t.clone(), &accepted(&t)).unwrap();
    let session = orch.run(session, CancellationToken::new()).await.unwrap();

    assert_eq!(session.outcome, Some(TerminalOutcome::Published));
    assert_eq!(client.prompts_for(Stage::Research).len(), 3);
    // retries never reach the session log
    assert_eq!(session.attempts(PipelineStage::Research), 1);
}

#[tokio::test]
async fn test_client_error_escalates_with_stage() {
    let client = Arc::new(ScriptedClient::newsroom().fail(Stage::Draft, Some(401)));
    let orch = orchestrator(
        client.clone(),
        Arc::new(RecordingCheckpoint::approving()),
        Arc::new(MemoryRecordStore::new()),
    );
    let t = topic("t-401");
    let session = orch.start_session(t.clone(), &accepted(&t)).unwrap();
    let session = orch.run(session, CancellationToken::new()).await.unwrap();

    let escalation = session.escalation.unwrap();
    assert!(matches!(
        escalation.reason,
        EscalationReason::ProviderError { stage: PipelineStage::Draft, .. }
    ));
    assert_eq!(escalation.last_completed_stage, Some(PipelineStage::Research));
    assert_eq!(client.prompts_for(Stage::Draft).len(), 1, "401 is not retried");
}

#[tokio::test]
async fn test_empty_draft_is_provider_error() {
    let client = Arc::new(ScriptedClient::newsroom().reply(Stage::Draft, "  \n"));
    let orch = orchestrator(
        client,
        Arc::new(RecordingCheckpoint::approving()),
        Arc::new(MemoryRecordStore::new()),
    );
    let t = topic("t-empty");
    let session = orch.start_session(t.clone(), &accepted(&t)).unwrap();
    let session = orch.run(session, CancellationToken::new()).await.unwrap();

    assert!(matches!(
        session.escalation.unwrap().reason,
        EscalationReason::ProviderError { stage: PipelineStage::Draft, .. }
    ));
}

// ── Governance ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_broken_checkpoint_fails_closed() {
    let orch = orchestrator(
        Arc::new(ScriptedClient::newsroom()),
        Arc::new(BrokenCheckpoint),
        Arc::new(MemoryRecordStore::new()),
    );
    let t = topic("t-broken");
    let session = orch.start_session(t.clone(), &accepted(&t)).unwrap();
    let session = orch.run(session, CancellationToken::new()).await.unwrap();

    match session.escalation.unwrap().reason {
        EscalationReason::GovernanceRejected { reviewer, .. } => {
            assert_eq!(reviewer, CHECKPOINT_FAILURE_REVIEWER)
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_file_checkpoint_approval_publishes() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint =
        FilePollingCheckpoint::new(dir.path()).with_poll_interval(Duration::from_millis(10));
    let store = Arc::new(FsRecordStore::new(dir.path()));
    let orch = Arc::new(orchestrator(
        Arc::new(ScriptedClient::newsroom().reply(Stage::Graphics, "{\"type\": \"bar\"}")),
        Arc::new(checkpoint.clone()),
        store.clone(),
    ));

    let t = topic("t-file");
    let session = orch.start_session(t.clone(), &accepted(&t)).unwrap();
    let id = session.id.clone();
    let runner = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.run(session, CancellationToken::new()).await })
    };

    let mut request = None;
    for _ in 0..500 {
        request = checkpoint.read_request(&id).unwrap();
        if request.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let request = request.expect("governance request written");
    assert_eq!(request.graphics.as_deref(), Some("{\"type\": \"bar\"}"));

    checkpoint
        .write_decision(&id, &GovernanceDecision::approve("standards", "checked"))
        .unwrap();
    let session = runner.await.unwrap().unwrap();

    assert_eq!(session.current, PipelineStage::Published);
    let entries = store.load_stage_entries(&id).unwrap();
    assert_eq!(entries.len(), session.log.len());
    assert_eq!(entries.last().unwrap().outcome, StageOutcome::Approved);
}

// ── Cancellation ────────────────────────────────────────────────────

#[tokio::test]
async fn test_cancelled_while_waiting_for_governance() {
    let (checkpoint, handle) = ChannelCheckpoint::new();
    let orch = Arc::new(orchestrator(
        Arc::new(ScriptedClient::newsroom()),
        Arc::new(checkpoint),
        Arc::new(MemoryRecordStore::new()),
    ));
    let cancel = CancellationToken::new();

    let t = topic("t-cancel");
    let session = orch.start_session(t.clone(), &accepted(&t)).unwrap();
    let runner = {
        let orch = Arc::clone(&orch);
        let cancel = cancel.clone();
        tokio::spawn(async move { orch.run(session, cancel).await })
    };
    while handle.pending().is_empty() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    cancel.cancel();

    let session = runner.await.unwrap().unwrap();
    let escalation = session.escalation.unwrap();
    assert_eq!(escalation.reason, EscalationReason::Cancelled);
    assert_eq!(escalation.last_completed_stage, Some(PipelineStage::Graphics));
    assert!(handle.pending().is_empty(), "waiter is cleaned up");
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let client = Arc::new(ScriptedClient::newsroom());
    let orch = orchestrator(
        client.clone(),
        Arc::new(RecordingCheckpoint::approving()),
        Arc::new(MemoryRecordStore::new()),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let t = topic("t-precancel");
    let session = orch.start_session(t.clone(), &accepted(&t)).unwrap();
    let session = orch.run(session, cancel).await.unwrap();

    assert_eq!(session.escalation.unwrap().reason, EscalationReason::Cancelled);
    assert_eq!(client.calls(), 0);
}

// ── Resume ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_resume_continues_from_stored_stage() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsRecordStore::new(dir.path()));
    let client = Arc::new(ScriptedClient::newsroom());
    let orch = orchestrator(
        client.clone(),
        Arc::new(RecordingCheckpoint::approving()),
        store.clone(),
    );

    // A run that stopped after research, with the research edited by hand.
    let t = topic("t-resume");
    let mut session = orch.start_session(t.clone(), &accepted(&t)).unwrap();
    session
        .advance(PipelineStage::Research, StageRecord::new(StageOutcome::Completed))
        .unwrap();
    session
        .advance(
            PipelineStage::Draft,
            StageRecord::new(StageOutcome::Completed).with_content("Edited research: 4.2%."),
        )
        .unwrap();
    store.save_session(&session).unwrap();

    let session = orch
        .resume(&session.id, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(session.outcome, Some(TerminalOutcome::Published));
    assert!(client.prompts_for(Stage::Research).is_empty());
    assert!(client.prompts_for(Stage::Draft)[0].contains("Edited research: 4.2%."));

    let reloaded: PipelineSession = store.load_session(&session.id).unwrap();
    assert_eq!(reloaded, session);
}

// ── Concurrency ─────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sessions_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsRecordStore::new(dir.path()));
    let orch = Arc::new(orchestrator(
        Arc::new(ScriptedClient::newsroom()),
        Arc::new(RecordingCheckpoint::approving()),
        store.clone(),
    ));

    let mut handles = Vec::new();
    for i in 0..8 {
        let orch = Arc::clone(&orch);
        handles.push(tokio::spawn(async move {
            let t = topic(&format!("t-{i}"));
            let session = orch.start_session(t.clone(), &accepted(&t))?;
            orch.run(session, CancellationToken::new()).await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        let session = handle.await.unwrap().unwrap();
        assert_eq!(session.outcome, Some(TerminalOutcome::Published));
        assert_eq!(session.log.len(), 6);
        ids.push(session.id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(store.list_sessions().unwrap(), ids);
}

//! Stage orchestrator — drives a session from DISCOVER_DONE to a terminal state.
//!
//! Each loop iteration runs the work of the current stage, then either
//! advances along the transition table or escalates. The session and the
//! newest log entry are persisted after every transition, so a crash or an
//! operator stop leaves a resumable record.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::prompts::{format_revision_feedback, render};
use super::session::{PipelineSession, SessionError, StageOutcome, StageRecord};
use super::state::PipelineStage;
use crate::config::PipelineConfig;
use crate::error::ValidationError;
use crate::escalation::{EscalationReason, ReworkController, ReworkDecision, ReworkPolicy};
use crate::gates::GateEvaluator;
use crate::governance::{GovernanceCheckpoint, GovernancePayload};
use crate::inference::{invoke_with_retry, InferenceClient, InferenceError, InferenceOutput};
use crate::store::{NullPatternSink, PatternRecord, PatternSink, RecordStore, StoreError};
use crate::topic::Topic;
use crate::voting::BoardDecision;

/// Marker the graphics desk returns when no chart applies.
pub const NOT_APPLICABLE: &str = "NOT_APPLICABLE";

/// Reviewer name recorded when the checkpoint itself fails.
pub const CHECKPOINT_FAILURE_REVIEWER: &str = "governance-checkpoint";

/// Errors that stop the orchestrator itself. Stage failures never show up
/// here; they end the session as ESCALATED instead.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("record store failure: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

pub struct Orchestrator {
    config: PipelineConfig,
    client: Arc<dyn InferenceClient>,
    governance: Arc<dyn GovernanceCheckpoint>,
    store: Arc<dyn RecordStore>,
    patterns: Arc<dyn PatternSink>,
    evaluator: GateEvaluator,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        client: Arc<dyn InferenceClient>,
        governance: Arc<dyn GovernanceCheckpoint>,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        let evaluator = GateEvaluator::new(&config.gates)?;
        Ok(Self {
            config,
            client,
            governance,
            store,
            patterns: Arc::new(NullPatternSink),
            evaluator,
        })
    }

    pub fn with_pattern_sink(mut self, patterns: Arc<dyn PatternSink>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Open and persist a session for an accepted topic.
    pub fn start_session(
        &self,
        topic: Topic,
        decision: &BoardDecision,
    ) -> Result<PipelineSession, FlowError> {
        let session = PipelineSession::new(topic, decision, self.config.rework.max_reworks)?;
        self.store.create_session(&session, decision)?;
        info!(
            session_id = %session.id,
            topic_id = %session.topic.id,
            composite = decision.composite_score,
            "Session opened"
        );
        Ok(session)
    }

    /// Load a stored session and continue it from its current stage.
    pub async fn resume(
        &self,
        session_id: &str,
        cancel: CancellationToken,
    ) -> Result<PipelineSession, FlowError> {
        let session = self.store.load_session(session_id)?;
        info!(session_id, stage = %session.current, "Resuming session");
        self.run(session, cancel).await
    }

    /// Operator stop for a non-terminal session.
    pub fn abandon(&self, session_id: &str, note: &str) -> Result<PipelineSession, FlowError> {
        let mut session = self.store.load_session(session_id)?;
        session.abandon(note)?;
        self.persist(&session)?;
        warn!(session_id, stage = %session.current, note, "Session abandoned");
        Ok(session)
    }

    /// Run until the session is terminal. Stage inputs come from the session
    /// log, so a loaded session picks up exactly where it stopped.
    pub async fn run(
        &self,
        mut session: PipelineSession,
        cancel: CancellationToken,
    ) -> Result<PipelineSession, FlowError> {
        while !session.is_finished() {
            if cancel.is_cancelled() {
                self.escalate(
                    &mut session,
                    EscalationReason::Cancelled,
                    StageRecord::new(StageOutcome::Completed),
                )?;
                break;
            }

            debug!(session_id = %session.id, stage = %session.current, "Running stage");
            match session.current {
                PipelineStage::DiscoverDone => self.transition(
                    &mut session,
                    PipelineStage::Research,
                    StageRecord::new(StageOutcome::Completed).with_note("board accepted topic"),
                )?,
                PipelineStage::Research => self.run_research(&mut session, &cancel).await?,
                PipelineStage::Draft => self.run_draft(&mut session, &cancel).await?,
                PipelineStage::Review => self.run_review(&mut session, &cancel).await?,
                PipelineStage::Rework => self.run_rework(&mut session)?,
                PipelineStage::Graphics => self.run_graphics(&mut session, &cancel).await?,
                PipelineStage::Governance => self.run_governance(&mut session, &cancel).await?,
                PipelineStage::Published | PipelineStage::Escalated => break,
            }
        }

        info!(
            session_id = %session.id,
            stage = %session.current,
            outcome = ?session.outcome,
            tokens = session.token_usage.total(),
            "Session finished"
        );
        Ok(session)
    }

    async fn run_research(
        &self,
        session: &mut PipelineSession,
        cancel: &CancellationToken,
    ) -> Result<(), FlowError> {
        let prompt = render(&self.config.prompts.research, &topic_vars(&session.topic));
        let output = match self.invoke(&prompt, cancel).await {
            Ok(output) => output,
            Err(e) => return self.provider_failure(session, e, cancel),
        };

        let record = StageRecord::new(StageOutcome::Completed).with_usage(output.token_usage);
        if output.text.trim().is_empty() {
            return self.escalate(session, EscalationReason::ResearchEmpty, record);
        }
        self.transition(session, PipelineStage::Draft, record.with_content(output.text))
    }

    async fn run_draft(
        &self,
        session: &mut PipelineSession,
        cancel: &CancellationToken,
    ) -> Result<(), FlowError> {
        let research = session
            .latest_content(PipelineStage::Research)
            .unwrap_or_default()
            .to_string();
        let mut vars = topic_vars(&session.topic);
        vars.push(("research", research.as_str()));

        let feedback = session.latest_content(PipelineStage::Rework).map(str::to_string);
        let previous = session.latest_content(PipelineStage::Draft).map(str::to_string);
        let prompt = match (&feedback, &previous) {
            (Some(feedback), Some(previous)) => {
                vars.push(("draft", previous.as_str()));
                vars.push(("feedback", feedback.as_str()));
                render(&self.config.prompts.revision, &vars)
            }
            _ => render(&self.config.prompts.draft, &vars),
        };

        let output = match self.invoke(&prompt, cancel).await {
            Ok(output) => output,
            Err(e) => return self.provider_failure(session, e, cancel),
        };
        if output.text.trim().is_empty() {
            let err = InferenceError::provider(None, "provider returned an empty draft");
            return self.provider_failure(session, err, cancel);
        }

        let record = StageRecord::new(StageOutcome::Completed)
            .with_content(output.text)
            .with_usage(output.token_usage);
        self.transition(session, PipelineStage::Review, record)
    }

    async fn run_review(
        &self,
        session: &mut PipelineSession,
        cancel: &CancellationToken,
    ) -> Result<(), FlowError> {
        let draft = session
            .latest_content(PipelineStage::Draft)
            .unwrap_or_default()
            .to_string();
        let gates = self.evaluator.gates().join(", ");
        let prompt = render(
            &self.config.prompts.review,
            &[
                ("title", session.topic.title.as_str()),
                ("draft", draft.as_str()),
                ("gates", gates.as_str()),
            ],
        );

        let output = match self.invoke(&prompt, cancel).await {
            Ok(output) => output,
            Err(e) => return self.provider_failure(session, e, cancel),
        };

        let gate_result = self.evaluator.evaluate(&output.text);
        info!(
            session_id = %session.id,
            review = session.attempts(PipelineStage::Review) + 1,
            summary = %gate_result.summary_line(),
            "Review scored"
        );
        self.emit_patterns(&session.id, &gate_result);

        let controller = ReworkController::new(ReworkPolicy {
            max_reworks: session.max_reworks,
        });
        let decision = controller.decide(&gate_result, session.rework_count());
        let record = StageRecord::new(StageOutcome::Completed)
            .with_content(output.text)
            .with_gate_result(gate_result)
            .with_usage(output.token_usage);

        match decision {
            ReworkDecision::Continue => {
                let record = StageRecord {
                    outcome: StageOutcome::Passed,
                    ..record
                };
                self.transition(session, PipelineStage::Graphics, record)
            }
            ReworkDecision::Rework { next_count } => {
                let record = StageRecord {
                    outcome: StageOutcome::ReworkRequested,
                    ..record
                }
                .with_note(format!("rework {next_count} of {}", session.max_reworks));
                self.transition(session, PipelineStage::Rework, record)
            }
            ReworkDecision::Escalate { reason } => self.escalate(session, reason, record),
        }
    }

    fn run_rework(&self, session: &mut PipelineSession) -> Result<(), FlowError> {
        let feedback = session
            .latest_gate_result()
            .map(format_revision_feedback)
            .unwrap_or_default();
        let record = StageRecord::new(StageOutcome::Completed).with_content(feedback);
        self.transition(session, PipelineStage::Draft, record)
    }

    async fn run_graphics(
        &self,
        session: &mut PipelineSession,
        cancel: &CancellationToken,
    ) -> Result<(), FlowError> {
        let draft = session
            .latest_content(PipelineStage::Draft)
            .unwrap_or_default()
            .to_string();
        let prompt = render(
            &self.config.prompts.graphics,
            &[
                ("title", session.topic.title.as_str()),
                ("draft", draft.as_str()),
            ],
        );

        let output = match self.invoke(&prompt, cancel).await {
            Ok(output) => output,
            Err(e) => return self.provider_failure(session, e, cancel),
        };

        let record = if is_not_applicable(&output.text) {
            StageRecord::new(StageOutcome::NotApplicable).with_content(NOT_APPLICABLE)
        } else {
            StageRecord::new(StageOutcome::Completed).with_content(output.text.trim())
        };
        self.transition(
            session,
            PipelineStage::Governance,
            record.with_usage(output.token_usage),
        )
    }

    async fn run_governance(
        &self,
        session: &mut PipelineSession,
        cancel: &CancellationToken,
    ) -> Result<(), FlowError> {
        let graphics = session
            .log
            .iter()
            .rev()
            .find(|e| e.stage == PipelineStage::Graphics && e.outcome == StageOutcome::Completed)
            .and_then(|e| e.content.clone());
        let payload = GovernancePayload {
            session_id: session.id.clone(),
            topic_id: session.topic.id.clone(),
            title: session.topic.title.clone(),
            draft: session
                .latest_content(PipelineStage::Draft)
                .unwrap_or_default()
                .to_string(),
            graphics,
            gate_summary: session
                .latest_gate_result()
                .map(|g| g.summary_line())
                .unwrap_or_default(),
            requested_at: Utc::now(),
        };

        let timeout = self.config.governance.timeout();
        let waited = tokio::select! {
            result = tokio::time::timeout(timeout, self.governance.await_decision(&session.id, &payload)) => Some(result),
            _ = cancel.cancelled() => None,
        };

        let record = StageRecord::new(StageOutcome::Completed);
        match waited {
            None => self.escalate(session, EscalationReason::Cancelled, record),
            Some(Err(_elapsed)) => self.escalate(
                session,
                EscalationReason::GovernanceTimeout {
                    waited_secs: timeout.as_secs(),
                },
                record,
            ),
            Some(Ok(Err(e))) => {
                warn!(session_id = %session.id, error = %e, "Governance checkpoint failed; treating as rejection");
                self.escalate(
                    session,
                    EscalationReason::GovernanceRejected {
                        reviewer: CHECKPOINT_FAILURE_REVIEWER.to_string(),
                        reason: e.to_string(),
                    },
                    record,
                )
            }
            Some(Ok(Ok(decision))) => {
                info!(
                    session_id = %session.id,
                    approved = decision.approved,
                    reviewer = %decision.reviewer,
                    "Governance decision"
                );
                session.governance = Some(decision.clone());
                if decision.approved {
                    let record = StageRecord::new(StageOutcome::Approved)
                        .with_note(format!("approved by {}", decision.reviewer));
                    self.transition(session, PipelineStage::Published, record)
                } else {
                    self.escalate(
                        session,
                        EscalationReason::GovernanceRejected {
                            reviewer: decision.reviewer,
                            reason: decision.reason,
                        },
                        record,
                    )
                }
            }
        }
    }

    async fn invoke(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<InferenceOutput, InferenceError> {
        invoke_with_retry(
            self.client.as_ref(),
            prompt,
            &self.config.inference,
            &self.config.retry,
            cancel,
        )
        .await
    }

    /// Inference gave up: cancelled sessions say so, others record the error.
    fn provider_failure(
        &self,
        session: &mut PipelineSession,
        err: InferenceError,
        cancel: &CancellationToken,
    ) -> Result<(), FlowError> {
        let reason = if cancel.is_cancelled() {
            EscalationReason::Cancelled
        } else {
            EscalationReason::ProviderError {
                stage: session.current,
                message: err.to_string(),
            }
        };
        self.escalate(session, reason, StageRecord::new(StageOutcome::Completed))
    }

    fn transition(
        &self,
        session: &mut PipelineSession,
        to: PipelineStage,
        record: StageRecord,
    ) -> Result<(), FlowError> {
        let from = session.current;
        session.advance(to, record)?;
        info!(session_id = %session.id, from = %from, to = %to, "Stage transition");
        self.persist(session)
    }

    fn escalate(
        &self,
        session: &mut PipelineSession,
        reason: EscalationReason,
        record: StageRecord,
    ) -> Result<(), FlowError> {
        let from = session.current;
        session.escalate(reason, record)?;
        if let Some(escalation) = &session.escalation {
            warn!(
                session_id = %session.id,
                from = %from,
                reason = escalation.reason.code(),
                detail = %escalation.describe(),
                "Session escalated"
            );
        }
        self.persist(session)
    }

    fn persist(&self, session: &PipelineSession) -> Result<(), FlowError> {
        if let Some(entry) = session.latest_entry() {
            self.store.save_stage_entry(&session.id, entry)?;
        }
        self.store.save_session(session)?;
        Ok(())
    }

    fn emit_patterns(&self, session_id: &str, gate_result: &crate::gates::GateResult) {
        for record in PatternRecord::from_gate_result(session_id, gate_result) {
            if let Err(e) = self.patterns.record(&record) {
                warn!(session_id, pattern_id = %record.pattern_id, error = %e, "Pattern sink write failed");
            }
        }
    }
}

fn topic_vars(topic: &Topic) -> Vec<(&'static str, &str)> {
    vec![
        ("title", topic.title.as_str()),
        ("category", topic.category.as_str()),
        ("notes", topic.notes.as_str()),
    ]
}

/// Graphics replies that mean "no chart".
fn is_not_applicable(text: &str) -> bool {
    let normalized = text
        .trim()
        .trim_matches(|c: char| c == '`' || c == '*' || c == '.' || c == '"')
        .to_ascii_uppercase()
        .replace([' ', '-'], "_");
    matches!(normalized.as_str(), "" | "NOT_APPLICABLE" | "N/A" | "NA" | "NONE")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::session::TerminalOutcome;
    use crate::governance::{AutoApprove, ChannelCheckpoint, GovernanceDecision};
    use crate::inference::MockInferenceClient;
    use crate::store::MemoryRecordStore;
    use crate::voting::Decision;

    const PASSING_REVIEW: &str = "\
structure: PASS
sourcing: PASS
voice: PASS
data-integrity: PASS
export-readiness: PASS";

    fn accepted(topic: &Topic) -> BoardDecision {
        BoardDecision {
            topic_id: topic.id.clone(),
            votes: vec![],
            composite_score: 7.0,
            decision: Decision::Accept,
            tie_break_reason: None,
            decided_at: Utc::now(),
        }
    }

    /// Route replies by which default template produced the prompt.
    fn scripted(review: &'static str, graphics: &'static str) -> MockInferenceClient {
        let mut client = MockInferenceClient::new();
        client.expect_invoke().returning(move |prompt, _| {
            let text = if prompt.starts_with("You are a newsroom researcher") {
                "Research: 3 sources."
            } else if prompt.starts_with("You are a staff writer") {
                "Draft body."
            } else if prompt.starts_with("You are the copy desk") {
                review
            } else if prompt.starts_with("You are the graphics desk") {
                graphics
            } else {
                "unexpected"
            };
            Ok(InferenceOutput::text(text).with_usage(10, 5))
        });
        client
    }

    fn orchestrator(
        client: MockInferenceClient,
        governance: Arc<dyn GovernanceCheckpoint>,
        store: Arc<MemoryRecordStore>,
    ) -> Orchestrator {
        Orchestrator::new(PipelineConfig::default(), Arc::new(client), governance, store).unwrap()
    }

    #[test]
    fn test_not_applicable_forms() {
        for text in ["", "NOT_APPLICABLE", " not applicable. ", "N/A", "`NONE`"] {
            assert!(is_not_applicable(text), "{text:?}");
        }
        assert!(!is_not_applicable("{\"type\": \"bar\"}"));
    }

    #[tokio::test]
    async fn test_happy_path_publishes() {
        let store = Arc::new(MemoryRecordStore::new());
        let orch = orchestrator(
            scripted(PASSING_REVIEW, "NOT_APPLICABLE"),
            Arc::new(AutoApprove),
            store.clone(),
        );
        let topic = Topic::new("t-1", "Library hours", "local");
        let session = orch.start_session(topic.clone(), &accepted(&topic)).unwrap();
        let session = orch.run(session, CancellationToken::new()).await.unwrap();

        assert_eq!(session.current, PipelineStage::Published);
        let stages: Vec<_> = session.log.iter().map(|e| e.stage).collect();
        assert_eq!(
            stages,
            vec![
                PipelineStage::DiscoverDone,
                PipelineStage::Research,
                PipelineStage::Draft,
                PipelineStage::Review,
                PipelineStage::Graphics,
                PipelineStage::Governance,
            ]
        );
        assert_eq!(session.log[4].outcome, StageOutcome::NotApplicable);
        assert_eq!(session.token_usage.total(), 4 * 15);
        assert_eq!(store.stage_entries(&session.id).len(), session.log.len());
        assert_eq!(store.load_session(&session.id).unwrap(), session);
    }

    #[tokio::test]
    async fn test_empty_research_escalates() {
        let mut client = MockInferenceClient::new();
        client
            .expect_invoke()
            .times(1)
            .returning(|_, _| Ok(InferenceOutput::text("   ")));
        let store = Arc::new(MemoryRecordStore::new());
        let orch = orchestrator(client, Arc::new(AutoApprove), store);
        let topic = Topic::new("t-1", "Library hours", "local");
        let session = orch.start_session(topic.clone(), &accepted(&topic)).unwrap();
        let session = orch.run(session, CancellationToken::new()).await.unwrap();

        let esc = session.escalation.unwrap();
        assert_eq!(esc.reason, EscalationReason::ResearchEmpty);
        assert_eq!(esc.last_completed_stage, Some(PipelineStage::DiscoverDone));
    }

    #[tokio::test]
    async fn test_governance_rejection_escalates() {
        let (checkpoint, handle) = ChannelCheckpoint::new();
        let store = Arc::new(MemoryRecordStore::new());
        let orch = Arc::new(orchestrator(
            scripted(PASSING_REVIEW, "{\"type\":\"line\"}"),
            Arc::new(checkpoint),
            store,
        ));
        let topic = Topic::new("t-1", "Library hours", "local");
        let session = orch.start_session(topic.clone(), &accepted(&topic)).unwrap();
        let id = session.id.clone();

        let runner = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.run(session, CancellationToken::new()).await })
        };
        while handle.pending().is_empty() {
            tokio::task::yield_now().await;
        }
        assert_eq!(handle.pending()[0].graphics.as_deref(), Some("{\"type\":\"line\"}"));
        handle.decide(&id, GovernanceDecision::reject("standards", "unverified quote"));

        let session = runner.await.unwrap().unwrap();
        assert_eq!(session.current, PipelineStage::Escalated);
        let esc = session.escalation.unwrap();
        assert_eq!(
            esc.reason,
            EscalationReason::GovernanceRejected {
                reviewer: "standards".into(),
                reason: "unverified quote".into(),
            }
        );
        assert_eq!(esc.last_completed_stage, Some(PipelineStage::Graphics));
        assert!(!session.governance.unwrap().approved);
    }

    #[tokio::test]
    async fn test_abandon_marks_stored_session() {
        let store = Arc::new(MemoryRecordStore::new());
        let orch = orchestrator(MockInferenceClient::new(), Arc::new(AutoApprove), store.clone());
        let topic = Topic::new("t-1", "Library hours", "local");
        let session = orch.start_session(topic.clone(), &accepted(&topic)).unwrap();

        let abandoned = orch.abandon(&session.id, "story killed").unwrap();
        assert_eq!(abandoned.outcome, Some(TerminalOutcome::Abandoned));
        assert!(matches!(
            orch.abandon(&session.id, "again"),
            Err(FlowError::Session(SessionError::Finished { .. }))
        ));
        // a finished session resumes as a no-op
        let resumed = orch.resume(&session.id, CancellationToken::new()).await.unwrap();
        assert_eq!(resumed.log.len(), 1);
    }
}

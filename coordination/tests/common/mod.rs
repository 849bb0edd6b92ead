//! Shared fakes for the pipeline integration suites.
//!
//! `ScriptedClient` routes each prompt to a per-stage reply queue by the
//! opening line of the default stage templates. The last reply in a queue is
//! sticky, so a single scripted review answers every review round.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use coordination::governance::{GovernanceCheckpoint, GovernanceError};
use coordination::inference::{InferenceClient, InferenceError, InferenceOutput, InferenceParams};
use coordination::{
    BoardDecision, Decision, GovernanceDecision, GovernancePayload, PipelineConfig, RetryPolicy,
    Topic,
};

pub const ALL_PASS: &str = "\
structure: PASS - clear lede and nut graf
sourcing: PASS - every figure attributed
voice: PASS
data-integrity: PASS
export-readiness: PASS";

/// 3/5: worth a rework.
pub const THREE_PASS: &str = "\
structure: PASS
sourcing: FAIL - council vote figure has no source
voice: PASS
data-integrity: FAIL - totals do not add up
export-readiness: PASS";

/// 1/5: not worth a rework.
pub const ONE_PASS: &str = "\
structure: FAIL - no lede
sourcing: FAIL - anonymous only
voice: FAIL
data-integrity: PASS
export-readiness: FAIL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Research,
    Draft,
    Revision,
    Review,
    Graphics,
    Other,
}

pub fn classify(prompt: &str) -> Stage {
    if prompt.starts_with("You are a newsroom researcher") {
        Stage::Research
    } else if prompt.starts_with("You are a staff writer revising") {
        Stage::Revision
    } else if prompt.starts_with("You are a staff writer") {
        Stage::Draft
    } else if prompt.starts_with("You are the copy desk") {
        Stage::Review
    } else if prompt.starts_with("You are the graphics desk") {
        Stage::Graphics
    } else {
        Stage::Other
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    /// Provider failure with an optional HTTP status.
    Fail(Option<u16>),
}

/// Deterministic inference double.
pub struct ScriptedClient {
    replies: Mutex<HashMap<Stage, VecDeque<Reply>>>,
    prompts: Mutex<Vec<(Stage, String)>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// The usual happy path: research, draft, revision, a passing review and no chart.
    pub fn newsroom() -> Self {
        Self::new()
            .reply(Stage::Research, "Research: rates rise 4% (city budget office).")
            .reply(Stage::Draft, "Water rates will rise 4% next year, the budget office said.")
            .reply(Stage::Revision, "Revised: water rates rise 4%, per the budget office.")
            .reply(Stage::Review, ALL_PASS)
            .reply(Stage::Graphics, "NOT_APPLICABLE")
    }

    pub fn reply(self, stage: Stage, text: &str) -> Self {
        self.push(stage, Reply::Text(text.to_string()))
    }

    /// Replace the queue for a stage with `replies`.
    pub fn replies(self, stage: Stage, replies: Vec<Reply>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(stage, replies.into_iter().collect());
        self
    }

    pub fn fail(self, stage: Stage, status: Option<u16>) -> Self {
        self.push(stage, Reply::Fail(status))
    }

    fn push(self, stage: Stage, reply: Reply) -> Self {
        let mut replies = self.replies.lock().unwrap();
        let queue = replies.entry(stage).or_default();
        queue.clear();
        queue.push_back(reply);
        drop(replies);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<(Stage, String)> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn prompts_for(&self, stage: Stage) -> Vec<String> {
        self.prompts()
            .into_iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, p)| p)
            .collect()
    }
}

#[async_trait]
impl InferenceClient for ScriptedClient {
    async fn invoke(
        &self,
        prompt: &str,
        _params: &InferenceParams,
    ) -> Result<InferenceOutput, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let stage = classify(prompt);
        self.prompts.lock().unwrap().push((stage, prompt.to_string()));

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(&stage) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        match reply {
            Some(Reply::Text(text)) => Ok(InferenceOutput::text(text).with_usage(100, 40)),
            Some(Reply::Fail(status)) => Err(InferenceError::provider(status, "scripted failure")),
            None => Err(InferenceError::provider(Some(400), format!("no script for {stage:?}"))),
        }
    }
}

/// Never answers.
pub struct SilentCheckpoint;

#[async_trait]
impl GovernanceCheckpoint for SilentCheckpoint {
    async fn await_decision(
        &self,
        _session_id: &str,
        _payload: &GovernancePayload,
    ) -> Result<GovernanceDecision, GovernanceError> {
        std::future::pending().await
    }
}

/// Fails immediately, as a broken approval channel would.
pub struct BrokenCheckpoint;

#[async_trait]
impl GovernanceCheckpoint for BrokenCheckpoint {
    async fn await_decision(
        &self,
        session_id: &str,
        _payload: &GovernancePayload,
    ) -> Result<GovernanceDecision, GovernanceError> {
        Err(GovernanceError::ChannelClosed(session_id.to_string()))
    }
}

/// Records every payload and answers with a fixed decision.
pub struct RecordingCheckpoint {
    pub decision: GovernanceDecision,
    pub seen: Arc<Mutex<Vec<GovernancePayload>>>,
}

impl RecordingCheckpoint {
    pub fn approving() -> Self {
        Self {
            decision: GovernanceDecision::approve("night-desk", "ship it"),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl GovernanceCheckpoint for RecordingCheckpoint {
    async fn await_decision(
        &self,
        _session_id: &str,
        payload: &GovernancePayload,
    ) -> Result<GovernanceDecision, GovernanceError> {
        self.seen.lock().unwrap().push(payload.clone());
        Ok(self.decision.clone())
    }
}

pub fn topic(id: &str) -> Topic {
    Topic::new(id, "Water rates rise next year", "local").with_notes("Lead with household impact")
}

pub fn accepted(topic: &Topic) -> BoardDecision {
    BoardDecision {
        topic_id: topic.id.clone(),
        votes: vec![],
        composite_score: 7.2,
        decision: Decision::Accept,
        tie_break_reason: None,
        decided_at: Utc::now(),
    }
}

/// Default config with short backoff so retry paths finish quickly.
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        retry: RetryPolicy {
            max_retries: 2,
            initial_backoff_ms: 10,
            backoff_multiplier: 2.0,
            max_backoff_ms: 50,
            call_timeout_secs: 5,
        },
        ..PipelineConfig::default()
    }
}

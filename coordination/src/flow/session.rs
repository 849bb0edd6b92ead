//! Pipeline session — the durable record of one topic's trip through the stages.
//!
//! Mutated only through [`PipelineSession::advance`], [`PipelineSession::escalate`]
//! and [`PipelineSession::abandon`], so the stage log stays append-only and the
//! rework budget cannot be exceeded.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::state::{check_transition, IllegalTransition, PipelineStage};
use crate::error::ValidationError;
use crate::escalation::{Escalation, EscalationReason};
use crate::gates::GateResult;
use crate::governance::GovernanceDecision;
use crate::inference::TokenUsage;
use crate::topic::Topic;
use crate::voting::BoardDecision;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    #[error("rework limit reached ({count}/{max})")]
    ReworkLimit { count: u32, max: u32 },

    #[error("session {id} already finished")]
    Finished { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalOutcome {
    Published,
    Escalated,
    /// Stopped by an operator.
    Abandoned,
}

impl std::fmt::Display for TerminalOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Published => write!(f, "published"),
            Self::Escalated => write!(f, "escalated"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// How a stage's work ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Completed,
    /// Review passed every gate.
    Passed,
    /// Graphics judged no chart applies.
    NotApplicable,
    ReworkRequested,
    Approved,
    Escalated,
    Abandoned,
}

impl StageOutcome {
    /// Whether the stage's own work finished successfully.
    pub fn is_success(self) -> bool {
        !matches!(self, Self::Escalated | Self::Abandoned)
    }
}

impl std::fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Passed => write!(f, "passed"),
            Self::NotApplicable => write!(f, "not_applicable"),
            Self::ReworkRequested => write!(f, "rework_requested"),
            Self::Approved => write!(f, "approved"),
            Self::Escalated => write!(f, "escalated"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// What a stage produced, before it is stamped into the log.
#[derive(Debug, Clone, PartialEq)]
pub struct StageRecord {
    pub outcome: StageOutcome,
    pub content: Option<String>,
    pub gate_result: Option<GateResult>,
    pub token_usage: TokenUsage,
    pub note: Option<String>,
}

impl StageRecord {
    pub fn new(outcome: StageOutcome) -> Self {
        Self {
            outcome,
            content: None,
            gate_result: None,
            token_usage: TokenUsage::default(),
            note: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_gate_result(mut self, gate_result: GateResult) -> Self {
        self.gate_result = Some(gate_result);
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.token_usage = usage;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// One append-only log entry: the work of `stage` and where the session went next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageLogEntry {
    /// 1-based position in the log.
    pub seq: u32,
    pub stage: PipelineStage,
    pub next: PipelineStage,
    /// 1-based attempt number for `stage` within this session.
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    pub outcome: StageOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_result: Option<GateResult>,
    #[serde(default)]
    pub token_usage: TokenUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

fn default_version() -> u32 {
    PipelineSession::CURRENT_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSession {
    /// Schema version for forward compatibility.
    #[serde(default = "default_version")]
    pub version: u32,
    pub id: String,
    pub topic: Topic,
    pub current: PipelineStage,
    /// Reworks taken, keyed by the stage that is re-entered.
    #[serde(default)]
    pub rework_counts: BTreeMap<PipelineStage, u32>,
    pub max_reworks: u32,
    #[serde(default)]
    pub log: Vec<StageLogEntry>,
    #[serde(default)]
    pub outcome: Option<TerminalOutcome>,
    #[serde(default)]
    pub escalation: Option<Escalation>,
    #[serde(default)]
    pub governance: Option<GovernanceDecision>,
    #[serde(default)]
    pub token_usage: TokenUsage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineSession {
    /// Current schema version.
    pub const CURRENT_VERSION: u32 = 1;

    /// Open a session for a topic the board accepted.
    pub fn new(
        topic: Topic,
        decision: &BoardDecision,
        max_reworks: u32,
    ) -> Result<Self, ValidationError> {
        if decision.topic_id != topic.id {
            return Err(ValidationError::TopicMismatch {
                topic_id: topic.id,
                decision_topic: decision.topic_id.clone(),
            });
        }
        if !decision.is_accepted() {
            return Err(ValidationError::TopicNotAccepted { topic_id: topic.id });
        }
        let now = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        Ok(Self {
            version: Self::CURRENT_VERSION,
            id: format!("{}-{}", now.format("%Y%m%dT%H%M%S"), &suffix[..8]),
            topic,
            current: PipelineStage::DiscoverDone,
            rework_counts: BTreeMap::new(),
            max_reworks,
            log: Vec::new(),
            outcome: None,
            escalation: None,
            governance: None,
            token_usage: TokenUsage::default(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// Reworks taken on DRAFT so far.
    pub fn rework_count(&self) -> u32 {
        self.rework_counts
            .get(&PipelineStage::Draft)
            .copied()
            .unwrap_or(0)
    }

    /// Number of log entries recorded for `stage`.
    pub fn attempts(&self, stage: PipelineStage) -> u32 {
        self.log.iter().filter(|e| e.stage == stage).count() as u32
    }

    /// Most recent content recorded by `stage`.
    pub fn latest_content(&self, stage: PipelineStage) -> Option<&str> {
        self.log
            .iter()
            .rev()
            .filter(|e| e.stage == stage)
            .find_map(|e| e.content.as_deref())
    }

    pub fn latest_gate_result(&self) -> Option<&GateResult> {
        self.log.iter().rev().find_map(|e| e.gate_result.as_ref())
    }

    pub fn latest_entry(&self) -> Option<&StageLogEntry> {
        self.log.last()
    }

    /// Last stage whose work finished successfully.
    pub fn last_completed_stage(&self) -> Option<PipelineStage> {
        self.log
            .iter()
            .rev()
            .find(|e| e.outcome.is_success())
            .map(|e| e.stage)
    }

    /// Move to `to`, recording the current stage's work.
    ///
    /// Entering REWORK consumes one unit of the DRAFT rework budget; asking
    /// for a rework with the budget spent fails with [`SessionError::ReworkLimit`].
    pub fn advance(
        &mut self,
        to: PipelineStage,
        record: StageRecord,
    ) -> Result<&StageLogEntry, SessionError> {
        if self.is_finished() {
            return Err(SessionError::Finished {
                id: self.id.clone(),
            });
        }
        check_transition(self.current, to)?;

        if to == PipelineStage::Rework {
            let count = self.rework_count();
            if count >= self.max_reworks {
                return Err(SessionError::ReworkLimit {
                    count,
                    max: self.max_reworks,
                });
            }
            self.rework_counts.insert(PipelineStage::Draft, count + 1);
        }

        match to {
            PipelineStage::Published => self.outcome = Some(TerminalOutcome::Published),
            PipelineStage::Escalated => self.outcome = Some(TerminalOutcome::Escalated),
            _ => {}
        }
        let from = self.current;
        self.current = to;
        Ok(self.append(from, to, record))
    }

    /// Escalate from the current stage, recording why.
    pub fn escalate(
        &mut self,
        reason: EscalationReason,
        record: StageRecord,
    ) -> Result<&StageLogEntry, SessionError> {
        let last_completed = self.last_completed_stage();
        let mut record = record;
        record.outcome = StageOutcome::Escalated;
        if record.note.is_none() {
            record.note = Some(reason.to_string());
        }
        self.advance(PipelineStage::Escalated, record)?;
        self.escalation = Some(Escalation::new(reason, last_completed));
        self.latest_entry().ok_or(SessionError::Finished {
            id: self.id.clone(),
        })
    }

    /// Operator stop. The stage is left where it was; only the outcome changes.
    pub fn abandon(&mut self, note: impl Into<String>) -> Result<&StageLogEntry, SessionError> {
        if self.is_finished() {
            return Err(SessionError::Finished {
                id: self.id.clone(),
            });
        }
        self.outcome = Some(TerminalOutcome::Abandoned);
        let stage = self.current;
        Ok(self.append(
            stage,
            stage,
            StageRecord::new(StageOutcome::Abandoned).with_note(note),
        ))
    }

    fn append(&mut self, stage: PipelineStage, next: PipelineStage, record: StageRecord) -> &StageLogEntry {
        let now = Utc::now();
        let attempt = self.attempts(stage) + 1;
        self.token_usage += record.token_usage;
        self.updated_at = now;
        self.log.push(StageLogEntry {
            seq: self.log.len() as u32 + 1,
            stage,
            next,
            attempt,
            timestamp: now,
            outcome: record.outcome,
            content: record.content,
            gate_result: record.gate_result,
            token_usage: record.token_usage,
            note: record.note,
        });
        &self.log[self.log.len() - 1]
    }
}

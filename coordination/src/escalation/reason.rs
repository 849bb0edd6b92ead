//! Escalation reasons — why a session stopped short of publication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flow::state::PipelineStage;

/// Terminal failure taxonomy. Every escalated session carries exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EscalationReason {
    /// Inference kept failing after retries.
    ProviderError { stage: PipelineStage, message: String },
    /// Research came back empty.
    ResearchEmpty,
    /// Too few gates passed for a rework to be worthwhile.
    GateEscalation { pass_count: usize, failing: Vec<String> },
    /// Rework was requested after the rework budget was spent.
    ReworkExhausted {
        stage: PipelineStage,
        reworks: u32,
        max: u32,
    },
    GovernanceRejected { reviewer: String, reason: String },
    /// Nobody answered the governance checkpoint in time.
    GovernanceTimeout { waited_secs: u64 },
    Cancelled,
}

impl EscalationReason {
    /// Stable machine-readable name.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ProviderError { .. } => "provider_error",
            Self::ResearchEmpty => "research_empty",
            Self::GateEscalation { .. } => "gate_escalation",
            Self::ReworkExhausted { .. } => "rework_exhausted",
            Self::GovernanceRejected { .. } => "governance_rejected",
            Self::GovernanceTimeout { .. } => "governance_timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProviderError { stage, message } => {
                write!(f, "provider error during {stage}: {message}")
            }
            Self::ResearchEmpty => write!(f, "research produced no output"),
            Self::GateEscalation {
                pass_count,
                failing,
            } => write!(
                f,
                "only {pass_count} quality gates passed (failing: {})",
                failing.join(", ")
            ),
            Self::ReworkExhausted {
                stage,
                reworks,
                max,
            } => write!(f, "rework limit reached for {stage} ({reworks}/{max})"),
            Self::GovernanceRejected { reviewer, reason } => {
                write!(f, "rejected at governance by {reviewer}: {reason}")
            }
            Self::GovernanceTimeout { waited_secs } => {
                write!(f, "no governance decision after {waited_secs}s")
            }
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Why and where a session escalated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub reason: EscalationReason,
    /// Last stage whose work completed successfully; `None` if nothing did.
    pub last_completed_stage: Option<PipelineStage>,
    pub at: DateTime<Utc>,
}

impl Escalation {
    pub fn new(reason: EscalationReason, last_completed_stage: Option<PipelineStage>) -> Self {
        Self {
            reason,
            last_completed_stage,
            at: Utc::now(),
        }
    }

    /// One-line operator summary.
    pub fn describe(&self) -> String {
        match self.last_completed_stage {
            Some(stage) => format!("{} (last completed stage: {stage})", self.reason),
            None => format!("{} (no stage completed)", self.reason),
        }
    }
}

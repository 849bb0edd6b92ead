//! Rework Controller — deterministic continue / rework / escalate routing.
//!
//! Consumes a [`GateResult`] and the current rework count; owns the rework
//! budget. No I/O and no LLM calls, so replaying a decision always gives the
//! same answer.

use serde::{Deserialize, Serialize};

use super::reason::EscalationReason;
use crate::flow::state::PipelineStage;
use crate::gates::{GateDecision, GateResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReworkPolicy {
    /// Returns to DRAFT allowed per session.
    pub max_reworks: u32,
}

impl Default for ReworkPolicy {
    fn default() -> Self {
        Self { max_reworks: 2 }
    }
}

/// What the orchestrator should do after a review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReworkDecision {
    /// All gates passed; move on to graphics.
    Continue,
    /// Send the draft back; `next_count` is the counter after this rework.
    Rework { next_count: u32 },
    Escalate { reason: EscalationReason },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReworkController {
    policy: ReworkPolicy,
}

impl ReworkController {
    pub fn new(policy: ReworkPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ReworkPolicy {
        self.policy
    }

    /// Route a review. `current_reworks` is how many times DRAFT has been
    /// re-entered so far.
    pub fn decide(&self, gate_result: &GateResult, current_reworks: u32) -> ReworkDecision {
        match gate_result.decision {
            GateDecision::PassThrough => ReworkDecision::Continue,
            GateDecision::Rework if current_reworks < self.policy.max_reworks => {
                ReworkDecision::Rework {
                    next_count: current_reworks + 1,
                }
            }
            GateDecision::Rework => ReworkDecision::Escalate {
                reason: EscalationReason::ReworkExhausted {
                    stage: PipelineStage::Draft,
                    reworks: current_reworks,
                    max: self.policy.max_reworks,
                },
            },
            GateDecision::Escalate => ReworkDecision::Escalate {
                reason: EscalationReason::GateEscalation {
                    pass_count: gate_result.pass_count,
                    failing: gate_result.failing_gates(),
                },
            },
        }
    }
}

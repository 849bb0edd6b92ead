//! Gate Evaluator — one review text in, exactly five gate outcomes out.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::parser::{GateMarkerParser, GateParsingAmbiguity, GateVerdict};
use crate::error::ValidationError;

/// Number of gates every review is scored against.
pub const GATE_COUNT: usize = 5;

/// Passes needed for a rework (rather than escalation) decision.
pub const REWORK_MIN_PASSES: usize = 3;

pub const DEFAULT_GATES: [&str; GATE_COUNT] = [
    "structure",
    "sourcing",
    "voice",
    "data-integrity",
    "export-readiness",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub gates: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            gates: DEFAULT_GATES.iter().map(|g| g.to_string()).collect(),
        }
    }
}

/// What the review as a whole means for the draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateDecision {
    PassThrough,
    Rework,
    Escalate,
}

impl std::fmt::Display for GateDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PassThrough => write!(f, "pass-through"),
            Self::Rework => write!(f, "rework"),
            Self::Escalate => write!(f, "escalate"),
        }
    }
}

/// Result of a single gate within a review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateOutcome {
    pub gate: String,
    pub verdict: GateVerdict,
    #[serde(default)]
    pub rationale: String,
    /// 1-based line of the marker that decided this gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambiguity: Option<GateParsingAmbiguity>,
}

impl GateOutcome {
    fn missing(gate: &str) -> Self {
        Self {
            gate: gate.to_string(),
            verdict: GateVerdict::Ambiguous,
            rationale: String::new(),
            line: None,
            ambiguity: Some(GateParsingAmbiguity::Missing),
        }
    }
}

/// A gate the reviewer marked more than once. Only the first marker counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateMarker {
    pub gate: String,
    pub occurrences: usize,
    pub ignored_lines: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    /// In configured gate order; always exactly [`GATE_COUNT`] entries.
    pub outcomes: Vec<GateOutcome>,
    pub pass_count: usize,
    pub decision: GateDecision,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub duplicates: Vec<DuplicateMarker>,
    pub evaluated_at: DateTime<Utc>,
}

impl GateResult {
    pub fn outcome(&self, gate: &str) -> Option<&GateOutcome> {
        self.outcomes.iter().find(|o| o.gate == gate)
    }

    /// Outcomes that count against the draft (Fail and Ambiguous).
    pub fn non_passing(&self) -> impl Iterator<Item = &GateOutcome> {
        self.outcomes.iter().filter(|o| !o.verdict.is_pass())
    }

    pub fn failing_gates(&self) -> Vec<String> {
        self.non_passing().map(|o| o.gate.clone()).collect()
    }

    /// `3/5 passed (rework): sourcing=FAIL, voice=AMBIGUOUS`
    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "{}/{} passed ({})",
            self.pass_count,
            self.outcomes.len(),
            self.decision
        );
        let failing: Vec<String> = self
            .non_passing()
            .map(|o| format!("{}={}", o.gate, o.verdict))
            .collect();
        if !failing.is_empty() {
            line.push_str(": ");
            line.push_str(&failing.join(", "));
        }
        line
    }
}

/// Map a pass count to the review decision.
pub fn decision_for(pass_count: usize) -> GateDecision {
    if pass_count >= GATE_COUNT {
        GateDecision::PassThrough
    } else if pass_count >= REWORK_MIN_PASSES {
        GateDecision::Rework
    } else {
        GateDecision::Escalate
    }
}

/// Scores review text against the configured gates.
#[derive(Debug, Clone)]
pub struct GateEvaluator {
    gates: Vec<String>,
    parser: GateMarkerParser,
}

impl GateEvaluator {
    pub fn new(config: &GateConfig) -> Result<Self, ValidationError> {
        if config.gates.len() != GATE_COUNT {
            return Err(ValidationError::GateCount {
                expected: GATE_COUNT,
                got: config.gates.len(),
            });
        }
        let mut seen = HashSet::new();
        for gate in &config.gates {
            let trimmed = gate.trim();
            if trimmed.is_empty() {
                return Err(ValidationError::EmptyGateName);
            }
            let key = trimmed.to_lowercase().replace(['_', ' '], "-");
            if !seen.insert(key) {
                return Err(ValidationError::DuplicateGate { name: gate.clone() });
            }
        }
        Ok(Self {
            parser: GateMarkerParser::new(&config.gates),
            gates: config.gates.clone(),
        })
    }

    pub fn gates(&self) -> &[String] {
        &self.gates
    }

    /// Evaluate a review.
    ///
    /// The first marker for a gate wins; later markers for the same gate are
    /// recorded as duplicates and never counted. Unmentioned gates are
    /// Ambiguous.
    pub fn evaluate(&self, review: &str) -> GateResult {
        let mut slots: Vec<Option<GateOutcome>> = vec![None; self.gates.len()];
        let mut duplicates: Vec<DuplicateMarker> = Vec::new();

        for (idx, line) in review.lines().enumerate() {
            let line_no = idx + 1;
            let Some(marker) = self.parser.parse_line(line) else {
                continue;
            };
            let gate = &self.gates[marker.gate_index];
            match &slots[marker.gate_index] {
                None => {
                    debug!(gate = %gate, verdict = %marker.verdict, line = line_no, "Gate marker");
                    slots[marker.gate_index] = Some(GateOutcome {
                        gate: gate.clone(),
                        verdict: marker.verdict,
                        rationale: marker.rationale,
                        line: Some(line_no),
                        ambiguity: marker.ambiguity,
                    });
                }
                Some(first) => {
                    warn!(
                        gate = %gate,
                        first_line = first.line.unwrap_or_default(),
                        ignored_line = line_no,
                        "Duplicate gate marker ignored"
                    );
                    match duplicates.iter_mut().find(|d| &d.gate == gate) {
                        Some(dup) => {
                            dup.occurrences += 1;
                            dup.ignored_lines.push(line_no);
                        }
                        None => duplicates.push(DuplicateMarker {
                            gate: gate.clone(),
                            occurrences: 2,
                            ignored_lines: vec![line_no],
                        }),
                    }
                }
            }
        }

        let outcomes: Vec<GateOutcome> = slots
            .into_iter()
            .zip(&self.gates)
            .map(|(slot, gate)| slot.unwrap_or_else(|| GateOutcome::missing(gate)))
            .collect();
        let pass_count = outcomes.iter().filter(|o| o.verdict.is_pass()).count();

        GateResult {
            outcomes,
            pass_count,
            decision: decision_for(pass_count),
            duplicates,
            evaluated_at: Utc::now(),
        }
    }
}

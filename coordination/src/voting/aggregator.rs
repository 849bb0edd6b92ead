//! Voting Aggregator — weighted board consensus with veto and floor tie-break.
//!
//! Deterministic: the same vote list always yields the same decision. No LLM
//! calls happen here; [`super::board`] collects the votes.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ValidationError;
use crate::topic::Topic;

/// Reason recorded when the floor rule overrides a near-threshold composite.
pub const FLOOR_VIOLATION_REASON: &str = "near-threshold floor violation";

/// One board member and its voting rights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaSpec {
    pub id: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub can_veto: bool,
    /// Short description of the persona's editorial lens, used in the vote prompt.
    #[serde(default)]
    pub brief: String,
}

fn default_weight() -> f64 {
    1.0
}

impl PersonaSpec {
    pub fn new(id: impl Into<String>, weight: f64) -> Self {
        Self {
            id: id.into(),
            weight,
            can_veto: false,
            brief: String::new(),
        }
    }

    pub fn with_veto(mut self) -> Self {
        self.can_veto = true;
        self
    }

    pub fn with_brief(mut self, brief: impl Into<String>) -> Self {
        self.brief = brief.into();
        self
    }
}

/// Board composition and decision thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VotingConfig {
    pub personas: Vec<PersonaSpec>,
    pub min_score: f64,
    pub max_score: f64,
    pub acceptance_threshold: f64,
    /// Half-width of the band around the threshold where the floor rule applies.
    pub near_threshold_epsilon: f64,
    pub floor: f64,
    /// Scores below `floor` tolerated inside the near-threshold band.
    pub max_floor_violations: usize,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            personas: vec![
                PersonaSpec::new("editor", 1.2)
                    .with_veto()
                    .with_brief("Managing editor: news value, fit with the publication, legal risk."),
                PersonaSpec::new("analyst", 1.0)
                    .with_brief("Data analyst: is there evidence and data to carry the story?"),
                PersonaSpec::new("reader", 0.8)
                    .with_brief("Reader advocate: will a general audience care and understand it?"),
            ],
            min_score: 0.0,
            max_score: 10.0,
            acceptance_threshold: 6.0,
            near_threshold_epsilon: 0.3,
            floor: 4.0,
            max_floor_violations: 1,
        }
    }
}

impl VotingConfig {
    pub fn with_personas(mut self, personas: Vec<PersonaSpec>) -> Self {
        self.personas = personas;
        self
    }

    pub fn persona(&self, id: &str) -> Option<&PersonaSpec> {
        self.personas.iter().find(|p| p.id == id)
    }

    /// Check the configuration is internally consistent.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.personas.is_empty() {
            return Err(ValidationError::NoPersonas);
        }
        let mut seen = HashSet::new();
        for persona in &self.personas {
            if !seen.insert(persona.id.as_str()) {
                return Err(ValidationError::DuplicatePersona {
                    persona: persona.id.clone(),
                });
            }
            if !persona.weight.is_finite() || persona.weight <= 0.0 {
                return Err(ValidationError::InvalidWeight {
                    persona: persona.id.clone(),
                    weight: persona.weight,
                });
            }
        }
        if !(self.min_score.is_finite() && self.max_score.is_finite())
            || self.min_score >= self.max_score
        {
            return Err(ValidationError::VotingConfig(format!(
                "score range [{}, {}] is empty",
                self.min_score, self.max_score
            )));
        }
        if !(self.min_score..=self.max_score).contains(&self.acceptance_threshold) {
            return Err(ValidationError::VotingConfig(format!(
                "acceptance threshold {} outside score range",
                self.acceptance_threshold
            )));
        }
        if !(self.min_score..=self.max_score).contains(&self.floor) {
            return Err(ValidationError::VotingConfig(format!(
                "floor {} outside score range",
                self.floor
            )));
        }
        if !self.near_threshold_epsilon.is_finite() || self.near_threshold_epsilon < 0.0 {
            return Err(ValidationError::VotingConfig(format!(
                "near-threshold epsilon {} must be non-negative",
                self.near_threshold_epsilon
            )));
        }
        Ok(())
    }
}

/// A single persona's scored opinion on a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub persona: String,
    pub score: f64,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub veto: bool,
    #[serde(default)]
    pub rationale: String,
}

impl Vote {
    pub fn new(persona: impl Into<String>, score: f64, weight: f64) -> Self {
        Self {
            persona: persona.into(),
            score,
            weight,
            veto: false,
            rationale: String::new(),
        }
    }

    pub fn with_veto(mut self) -> Self {
        self.veto = true;
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Reject,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accept => write!(f, "accept"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// The board's verdict on a topic. Never mutated; re-voting creates a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardDecision {
    pub topic_id: String,
    pub votes: Vec<Vote>,
    pub composite_score: f64,
    pub decision: Decision,
    #[serde(default)]
    pub tie_break_reason: Option<String>,
    pub decided_at: DateTime<Utc>,
}

impl BoardDecision {
    pub fn is_accepted(&self) -> bool {
        self.decision == Decision::Accept
    }
}

/// Combines one vote per configured persona into a [`BoardDecision`].
#[derive(Debug, Clone)]
pub struct VotingAggregator {
    config: VotingConfig,
}

impl VotingAggregator {
    pub fn new(config: VotingConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &VotingConfig {
        &self.config
    }

    /// Reject anything other than exactly one well-formed vote per persona.
    pub fn validate(&self, votes: &[Vote]) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for vote in votes {
            let persona = self.config.persona(&vote.persona).ok_or_else(|| {
                ValidationError::UnknownPersona {
                    persona: vote.persona.clone(),
                }
            })?;
            if !seen.insert(vote.persona.as_str()) {
                return Err(ValidationError::DuplicateVote {
                    persona: vote.persona.clone(),
                });
            }
            if !vote.score.is_finite()
                || vote.score < self.config.min_score
                || vote.score > self.config.max_score
            {
                return Err(ValidationError::ScoreOutOfBounds {
                    persona: vote.persona.clone(),
                    score: vote.score,
                    min: self.config.min_score,
                    max: self.config.max_score,
                });
            }
            if !vote.weight.is_finite() || vote.weight <= 0.0 {
                return Err(ValidationError::InvalidWeight {
                    persona: vote.persona.clone(),
                    weight: vote.weight,
                });
            }
            if vote.veto && !persona.can_veto {
                return Err(ValidationError::VetoNotPermitted {
                    persona: vote.persona.clone(),
                });
            }
        }
        if let Some(missing) = self
            .config
            .personas
            .iter()
            .find(|p| !seen.contains(p.id.as_str()))
        {
            return Err(ValidationError::MissingVote {
                persona: missing.id.clone(),
            });
        }
        Ok(())
    }

    /// Decide on a topic.
    ///
    /// 1. Any veto rejects with composite 0.
    /// 2. Composite is the weight-normalized mean of the scores.
    /// 3. Accept iff composite ≥ threshold.
    /// 4. Within `epsilon` of the threshold, more than `max_floor_violations`
    ///    scores below `floor` force a reject.
    pub fn aggregate(&self, topic: &Topic, votes: Vec<Vote>) -> Result<BoardDecision, ValidationError> {
        self.validate(&votes)?;

        if let Some(vetoer) = votes.iter().find(|v| v.veto) {
            let reason = format!("vetoed by {}", vetoer.persona);
            info!(topic_id = %topic.id, persona = %vetoer.persona, "Topic vetoed");
            return Ok(BoardDecision {
                topic_id: topic.id.clone(),
                votes,
                composite_score: 0.0,
                decision: Decision::Reject,
                tie_break_reason: Some(reason),
                decided_at: Utc::now(),
            });
        }

        let composite = composite_score(&votes);
        let cfg = &self.config;
        let mut decision = if composite >= cfg.acceptance_threshold {
            Decision::Accept
        } else {
            Decision::Reject
        };
        let mut tie_break_reason = None;

        let near_threshold = (composite - cfg.acceptance_threshold).abs() <= cfg.near_threshold_epsilon;
        if near_threshold {
            let below_floor = votes.iter().filter(|v| v.score < cfg.floor).count();
            debug!(composite, below_floor, "Near-threshold composite");
            if below_floor > cfg.max_floor_violations {
                decision = Decision::Reject;
                tie_break_reason = Some(FLOOR_VIOLATION_REASON.to_string());
            }
        }

        info!(
            topic_id = %topic.id,
            composite,
            decision = %decision,
            "Board decided"
        );

        Ok(BoardDecision {
            topic_id: topic.id.clone(),
            votes,
            composite_score: composite,
            decision,
            tie_break_reason,
            decided_at: Utc::now(),
        })
    }
}

/// Σ(score × weight) / Σ(weight). Callers guarantee a non-empty, validated set.
fn composite_score(votes: &[Vote]) -> f64 {
    let total_weight: f64 = votes.iter().map(|v| v.weight).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    votes.iter().map(|v| v.score * v.weight).sum::<f64>() / total_weight
}

//! Pipeline stages and legal transitions.
//!
//! Every session starts at `DISCOVER_DONE` and terminates at either
//! `PUBLISHED` or `ESCALATED`. The only back-edge is REVIEW → REWORK → DRAFT.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    /// Board accepted the topic; nothing generated yet.
    DiscoverDone,
    Research,
    Draft,
    /// Reviewer scores the draft against the quality gates.
    Review,
    /// Draft sent back with gate feedback.
    Rework,
    Graphics,
    /// Waiting on human approval before publication.
    Governance,
    /// Terminal success.
    Published,
    /// Terminal failure.
    Escalated,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 9] = [
        Self::DiscoverDone,
        Self::Research,
        Self::Draft,
        Self::Review,
        Self::Rework,
        Self::Graphics,
        Self::Governance,
        Self::Published,
        Self::Escalated,
    ];

    /// Whether this is a terminal state (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Published | Self::Escalated)
    }

    /// Lowercase name used in stage record file names.
    pub fn slug(self) -> &'static str {
        match self {
            Self::DiscoverDone => "discover_done",
            Self::Research => "research",
            Self::Draft => "draft",
            Self::Review => "review",
            Self::Rework => "rework",
            Self::Graphics => "graphics",
            Self::Governance => "governance",
            Self::Published => "published",
            Self::Escalated => "escalated",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DiscoverDone => write!(f, "DISCOVER_DONE"),
            Self::Research => write!(f, "RESEARCH"),
            Self::Draft => write!(f, "DRAFT"),
            Self::Review => write!(f, "REVIEW"),
            Self::Rework => write!(f, "REWORK"),
            Self::Graphics => write!(f, "GRAPHICS"),
            Self::Governance => write!(f, "GOVERNANCE"),
            Self::Published => write!(f, "PUBLISHED"),
            Self::Escalated => write!(f, "ESCALATED"),
        }
    }
}

/// Legal transitions between pipeline stages.
///
/// ```text
/// DISCOVER_DONE → RESEARCH
/// RESEARCH      → DRAFT
/// DRAFT         → REVIEW
/// REVIEW        → GRAPHICS | REWORK
/// REWORK        → DRAFT
/// GRAPHICS      → GOVERNANCE
/// GOVERNANCE    → PUBLISHED
/// (any non-terminal) → ESCALATED
/// ```
pub fn is_legal_transition(from: PipelineStage, to: PipelineStage) -> bool {
    use PipelineStage::*;

    // Any non-terminal state can escalate.
    if to == Escalated && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (DiscoverDone, Research)
            | (Research, Draft)
            | (Draft, Review)
            | (Review, Graphics)
            | (Review, Rework)
            | (Rework, Draft)
            | (Graphics, Governance)
            | (Governance, Published)
    )
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: PipelineStage,
    pub to: PipelineStage,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal stage transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Check a transition, returning a typed error when it is not in the table.
pub fn check_transition(from: PipelineStage, to: PipelineStage) -> Result<(), IllegalTransition> {
    if is_legal_transition(from, to) {
        Ok(())
    } else {
        Err(IllegalTransition { from, to })
    }
}

//! Pre-flight validation errors.
//!
//! These are the only errors that cross the orchestrator boundary as `Err`:
//! they mean the integration handed the core a malformed vote set or
//! configuration, which is a caller bug rather than a runtime condition.

use thiserror::Error;

/// Contract violation detected before any stage runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("no personas configured for the board")]
    NoPersonas,

    #[error("persona {persona} is configured more than once")]
    DuplicatePersona { persona: String },

    #[error("missing vote for persona {persona}")]
    MissingVote { persona: String },

    #[error("persona {persona} voted more than once")]
    DuplicateVote { persona: String },

    #[error("vote from unknown persona {persona}")]
    UnknownPersona { persona: String },

    #[error("score {score} from {persona} outside [{min}, {max}]")]
    ScoreOutOfBounds {
        persona: String,
        score: f64,
        min: f64,
        max: f64,
    },

    #[error("weight {weight} for {persona} must be positive and finite")]
    InvalidWeight { persona: String, weight: f64 },

    #[error("persona {persona} has no veto capability")]
    VetoNotPermitted { persona: String },

    #[error("invalid voting config: {0}")]
    VotingConfig(String),

    #[error("expected exactly {expected} gate names, got {got}")]
    GateCount { expected: usize, got: usize },

    #[error("gate name {name:?} is configured more than once")]
    DuplicateGate { name: String },

    #[error("gate names must not be empty")]
    EmptyGateName,

    #[error("topic {topic_id} was not accepted by the board")]
    TopicNotAccepted { topic_id: String },

    #[error("board decision is for topic {decision_topic}, not {topic_id}")]
    TopicMismatch {
        topic_id: String,
        decision_topic: String,
    },
}

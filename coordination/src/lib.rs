//! Newsroom Coordination Library
//!
//! The orchestration core of the newsroom content pipeline:
//! - Weighted editorial board voting with veto and near-threshold floor rules
//! - Deterministic quality gates parsed from free-form reviewer output
//! - A bounded rework loop that escalates instead of looping forever
//! - A stage state machine from accepted topic to publication
//! - A fail-closed human governance checkpoint before anything is published
//!
//! Inference, governance, record storage and the pattern sink are traits, so
//! the core runs the same against real providers or in-process test doubles.
//!
//! # Usage
//!
//! ```ignore
//! let orchestrator = Orchestrator::new(config, client, governance, store)?;
//! let session = orchestrator.start_session(topic, &board_decision)?;
//! let session = orchestrator.run(session, CancellationToken::new()).await?;
//! ```

pub mod config;
pub mod error;
pub mod escalation;
pub mod flow;
pub mod gates;
pub mod governance;
pub mod inference;
pub mod store;
pub mod topic;
pub mod voting;

pub use config::{ConfigError, GovernanceConfig, PipelineConfig};
pub use error::ValidationError;
pub use topic::Topic;

// Re-export voting types
pub use voting::{
    Board, BoardDecision, BoardError, BoardOutcome, Decision, PersonaSpec, Vote,
    VotingAggregator, VotingConfig,
};

// Re-export gate types
pub use gates::{GateConfig, GateDecision, GateEvaluator, GateResult, GateVerdict};

// Re-export escalation types
pub use escalation::{Escalation, EscalationReason, ReworkController, ReworkDecision, ReworkPolicy};

// Re-export flow types
pub use flow::{
    FlowError, Orchestrator, PipelineSession, PipelineStage, StageOutcome, TerminalOutcome,
};

// Re-export collaborator seams
pub use governance::{
    AutoApprove, ChannelCheckpoint, FilePollingCheckpoint, GovernanceCheckpoint,
    GovernanceDecision, GovernanceError, GovernanceHandle, GovernancePayload,
};
pub use inference::{
    InferenceClient, InferenceError, InferenceOutput, InferenceParams, RetryPolicy, TokenUsage,
};
pub use store::{
    FsRecordStore, JsonlPatternSink, MemoryRecordStore, NullPatternSink, PatternRecord,
    PatternSink, RecordStore, StoreError,
};

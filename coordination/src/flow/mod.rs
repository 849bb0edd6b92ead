//! Article pipeline — stage machine, session log, prompts and the orchestrator.
//!
//! ```text
//! DISCOVER_DONE → RESEARCH → DRAFT → REVIEW ─┬→ GRAPHICS → GOVERNANCE → PUBLISHED
//!                              ↑             │
//!                              └── REWORK ←──┘
//!            (any non-terminal stage) → ESCALATED
//! ```

pub mod orchestrator;
pub mod prompts;
pub mod session;
pub mod state;

pub use orchestrator::{FlowError, Orchestrator, CHECKPOINT_FAILURE_REVIEWER, NOT_APPLICABLE};
pub use prompts::{format_revision_feedback, render, StagePrompts};
pub use session::{
    PipelineSession, SessionError, StageLogEntry, StageOutcome, StageRecord, TerminalOutcome,
};
pub use state::{check_transition, is_legal_transition, IllegalTransition, PipelineStage};

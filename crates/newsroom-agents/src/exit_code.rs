//! Process exit codes. Scripts branch on these, so the numbers are stable.

use coordination::{
    BoardError, ConfigError, EscalationReason, FlowError, PipelineSession, TerminalOutcome,
    ValidationError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// A command other than a pipeline run finished normally.
    Success,
    Published,
    Failure,
    Validation,
    Provider,
    GovernanceRejected,
    GovernanceTimeout,
    ReworkExhausted,
    /// Too few gates passed, or research came back empty.
    ContentEscalation,
    Cancelled,
    Abandoned,
    BoardRejected,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Success | Self::Published => 0,
            Self::Failure => 1,
            Self::Validation => 2,
            Self::Provider => 3,
            Self::GovernanceRejected => 4,
            Self::GovernanceTimeout => 5,
            Self::ReworkExhausted => 6,
            Self::ContentEscalation => 7,
            Self::Cancelled => 8,
            Self::Abandoned => 9,
            Self::BoardRejected => 10,
        }
    }

    pub fn for_reason(reason: &EscalationReason) -> Self {
        match reason {
            EscalationReason::ProviderError { .. } => Self::Provider,
            EscalationReason::ResearchEmpty | EscalationReason::GateEscalation { .. } => {
                Self::ContentEscalation
            }
            EscalationReason::ReworkExhausted { .. } => Self::ReworkExhausted,
            EscalationReason::GovernanceRejected { .. } => Self::GovernanceRejected,
            EscalationReason::GovernanceTimeout { .. } => Self::GovernanceTimeout,
            EscalationReason::Cancelled => Self::Cancelled,
        }
    }

    /// Status for a session. Unfinished sessions (e.g. `show` mid-run) are 0.
    pub fn for_session(session: &PipelineSession) -> Self {
        match session.outcome {
            None => Self::Success,
            Some(TerminalOutcome::Published) => Self::Published,
            Some(TerminalOutcome::Abandoned) => Self::Abandoned,
            Some(TerminalOutcome::Escalated) => session
                .escalation
                .as_ref()
                .map(|e| Self::for_reason(&e.reason))
                .unwrap_or(Self::Failure),
        }
    }

    /// Status for an error that stopped the command.
    pub fn for_error(err: &anyhow::Error) -> Self {
        let is_validation = err.chain().any(|cause| {
            cause.downcast_ref::<ValidationError>().is_some()
                || matches!(
                    cause.downcast_ref::<FlowError>(),
                    Some(FlowError::Validation(_))
                )
                || matches!(
                    cause.downcast_ref::<BoardError>(),
                    Some(BoardError::Validation(_))
                )
                || matches!(
                    cause.downcast_ref::<ConfigError>(),
                    Some(ConfigError::Validation(_))
                )
        });
        if is_validation {
            return Self::Validation;
        }
        let is_provider = err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<BoardError>(),
                Some(BoardError::Provider { .. } | BoardError::UnparseableVote { .. })
            )
        });
        if is_provider {
            Self::Provider
        } else {
            Self::Failure
        }
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        std::process::ExitCode::from(status.code())
    }
}

//! Governance Checkpoint — human approval before publication.
//!
//! The orchestrator hands a [`GovernancePayload`] to a [`GovernanceCheckpoint`]
//! and waits, under its own timeout, for a [`GovernanceDecision`]. Anything
//! other than an explicit approval ends the session; checkpoint failures are
//! treated as rejections.

pub mod file;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

pub use file::FilePollingCheckpoint;

/// What the approver gets to see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernancePayload {
    pub session_id: String,
    pub topic_id: String,
    pub title: String,
    pub draft: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphics: Option<String>,
    /// One-line gate summary from the last review.
    #[serde(default)]
    pub gate_summary: String,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceDecision {
    pub approved: bool,
    pub reviewer: String,
    #[serde(default)]
    pub reason: String,
    /// Hand-written decision files may leave this out.
    #[serde(default = "Utc::now")]
    pub decided_at: DateTime<Utc>,
}

impl GovernanceDecision {
    pub fn approve(reviewer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            approved: true,
            reviewer: reviewer.into(),
            reason: reason.into(),
            decided_at: Utc::now(),
        }
    }

    pub fn reject(reviewer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reviewer: reviewer.into(),
            reason: reason.into(),
            decided_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("governance channel closed before a decision for session {0}")]
    ChannelClosed(String),

    #[error("governance I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed governance decision: {0}")]
    Malformed(String),
}

/// External approval gate. Implementations may wait indefinitely; the
/// orchestrator bounds the wait.
#[async_trait]
pub trait GovernanceCheckpoint: Send + Sync {
    async fn await_decision(
        &self,
        session_id: &str,
        payload: &GovernancePayload,
    ) -> Result<GovernanceDecision, GovernanceError>;
}

/// Approves everything. For dry runs and tests only.
#[derive(Debug, Clone, Default)]
pub struct AutoApprove;

#[async_trait]
impl GovernanceCheckpoint for AutoApprove {
    async fn await_decision(
        &self,
        session_id: &str,
        _payload: &GovernancePayload,
    ) -> Result<GovernanceDecision, GovernanceError> {
        debug!(session_id, "Auto-approving governance checkpoint");
        Ok(GovernanceDecision::approve("auto", "auto-approve enabled"))
    }
}

/// Upper bound on decisions held for sessions nobody is waiting on.
const MAX_HELD_DECISIONS: usize = 64;

#[derive(Default)]
struct ChannelState {
    waiting: HashMap<String, oneshot::Sender<GovernanceDecision>>,
    /// Decisions that arrived before anyone was waiting, in arrival order.
    early: HashMap<String, GovernanceDecision>,
    held_order: VecDeque<String>,
    pending: HashMap<String, GovernancePayload>,
}

/// In-process checkpoint: decisions arrive through a [`GovernanceHandle`].
#[derive(Clone, Default)]
pub struct ChannelCheckpoint {
    state: Arc<Mutex<ChannelState>>,
}

/// Decision side of a [`ChannelCheckpoint`].
#[derive(Clone)]
pub struct GovernanceHandle {
    state: Arc<Mutex<ChannelState>>,
}

impl ChannelState {
    /// Hold a decision until someone waits, evicting the oldest held one
    /// once the bound is reached.
    fn hold(&mut self, session_id: &str, decision: GovernanceDecision) {
        if self.early.insert(session_id.to_string(), decision).is_some() {
            self.held_order.retain(|id| id != session_id);
        }
        self.held_order.push_back(session_id.to_string());
        while self.early.len() > MAX_HELD_DECISIONS {
            let Some(oldest) = self.held_order.pop_front() else {
                break;
            };
            warn!(session_id = %oldest, "Evicting unclaimed governance decision");
            self.early.remove(&oldest);
        }
    }

    fn take_held(&mut self, session_id: &str) -> Option<GovernanceDecision> {
        let decision = self.early.remove(session_id)?;
        self.held_order.retain(|id| id != session_id);
        Some(decision)
    }
}

impl ChannelCheckpoint {
    pub fn new() -> (Self, GovernanceHandle) {
        let checkpoint = Self::default();
        let handle = GovernanceHandle {
            state: Arc::clone(&checkpoint.state),
        };
        (checkpoint, handle)
    }
}

/// Removes the waiter when the wait is dropped (timeout or cancellation).
struct WaitGuard {
    state: Arc<Mutex<ChannelState>>,
    session_id: String,
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.waiting.remove(&self.session_id);
        state.pending.remove(&self.session_id);
    }
}

#[async_trait]
impl GovernanceCheckpoint for ChannelCheckpoint {
    async fn await_decision(
        &self,
        session_id: &str,
        payload: &GovernancePayload,
    ) -> Result<GovernanceDecision, GovernanceError> {
        let rx = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(decision) = state.take_held(session_id) {
                return Ok(decision);
            }
            let (tx, rx) = oneshot::channel();
            state.waiting.insert(session_id.to_string(), tx);
            state.pending.insert(session_id.to_string(), payload.clone());
            rx
        };
        info!(session_id, "Awaiting governance decision");

        let _guard = WaitGuard {
            state: Arc::clone(&self.state),
            session_id: session_id.to_string(),
        };
        rx.await
            .map_err(|_| GovernanceError::ChannelClosed(session_id.to_string()))
    }
}

impl GovernanceHandle {
    /// Deliver a decision. If nobody is waiting yet it is held (bounded)
    /// for the next wait on that session; a waiter that already gave up
    /// gets nothing.
    pub fn decide(&self, session_id: &str, decision: GovernanceDecision) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.pending.remove(session_id);
        match state.waiting.remove(session_id) {
            Some(tx) => {
                if tx.send(decision).is_err() {
                    warn!(session_id, "Governance waiter went away; dropping decision");
                }
            }
            None => state.hold(session_id, decision),
        }
    }

    /// Payloads currently awaiting a decision.
    pub fn pending(&self) -> Vec<GovernancePayload> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut pending: Vec<_> = state.pending.values().cloned().collect();
        pending.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        pending
    }
}

#[cfg(test)]
pub(crate) fn sample_payload(session_id: &str) -> GovernancePayload {
    GovernancePayload {
        session_id: session_id.to_string(),
        topic_id: "t-1".into(),
        title: "Water rates".into(),
        draft: "Rates rise 4%.".into(),
        graphics: None,
        gate_summary: "5/5 passed (pass-through)".into(),
        requested_at: Utc::now(),
    }
}

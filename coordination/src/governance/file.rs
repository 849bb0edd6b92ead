//! File-polling checkpoint — approval by dropping a JSON file next to the session.
//!
//! ```text
//! <root>/<session_id>/governance_request.json    written by the pipeline
//! <root>/<session_id>/governance_decision.json   written by the approver
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{GovernanceCheckpoint, GovernanceDecision, GovernanceError, GovernancePayload};
use crate::store::write_json_atomic;

pub const REQUEST_FILE: &str = "governance_request.json";
pub const DECISION_FILE: &str = "governance_decision.json";

#[derive(Debug, Clone)]
pub struct FilePollingCheckpoint {
    root: PathBuf,
    poll_interval: Duration,
}

impl FilePollingCheckpoint {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            poll_interval: Duration::from_secs(2),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn request_path(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id).join(REQUEST_FILE)
    }

    pub fn decision_path(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id).join(DECISION_FILE)
    }

    /// Record an approver's decision for a session (used by the CLI).
    pub fn write_decision(
        &self,
        session_id: &str,
        decision: &GovernanceDecision,
    ) -> Result<(), GovernanceError> {
        write_json_atomic(&self.decision_path(session_id), decision)?;
        Ok(())
    }

    /// Pending request for a session, if one is waiting.
    pub fn read_request(&self, session_id: &str) -> Result<Option<GovernancePayload>, GovernanceError> {
        read_optional_json(&self.request_path(session_id))
    }
}

fn read_optional_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, GovernanceError> {
    match std::fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| GovernanceError::Malformed(format!("{}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl GovernanceCheckpoint for FilePollingCheckpoint {
    async fn await_decision(
        &self,
        session_id: &str,
        payload: &GovernancePayload,
    ) -> Result<GovernanceDecision, GovernanceError> {
        let request = self.request_path(session_id);
        let decision_path = self.decision_path(session_id);
        write_json_atomic(&request, payload)?;
        info!(
            session_id,
            decision_file = %decision_path.display(),
            "Governance request written; waiting for decision file"
        );

        loop {
            if let Some(decision) = read_optional_json::<GovernanceDecision>(&decision_path)? {
                if let Err(e) = std::fs::remove_file(&request) {
                    debug!(session_id, error = %e, "Could not remove governance request");
                }
                return Ok(decision);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

//! Pattern sink: recurring review failures, written for offline learning.
//!
//! Write-only from the pipeline's point of view. A failed write is logged by
//! the caller and never affects a session.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gates::{GateResult, GateVerdict};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// A gate explicitly failed.
    High,
    /// A gate was ambiguous or missing.
    Medium,
}

/// One observed failure pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    /// Gate the pattern belongs to.
    pub category: String,
    /// Stable fingerprint of category + normalized example.
    pub pattern_id: String,
    pub example: String,
    pub severity: Severity,
    pub session_id: String,
    pub recorded_at: DateTime<Utc>,
}

/// Lowercase, single-spaced text so trivially different wordings share an id.
fn normalize_example(example: &str) -> String {
    example
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// `pat-` + the first 16 hex chars of blake3(category, normalized example).
pub fn pattern_id(category: &str, example: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(category.as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize_example(example).as_bytes());
    let hex = hasher.finalize().to_hex();
    format!("pat-{}", &hex.as_str()[..16])
}

impl PatternRecord {
    /// One record per gate that did not pass.
    pub fn from_gate_result(session_id: &str, result: &GateResult) -> Vec<Self> {
        result
            .non_passing()
            .map(|outcome| {
                let example = if outcome.rationale.is_empty() {
                    outcome
                        .ambiguity
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| outcome.verdict.to_string())
                } else {
                    outcome.rationale.clone()
                };
                let severity = match outcome.verdict {
                    GateVerdict::Fail => Severity::High,
                    _ => Severity::Medium,
                };
                Self {
                    pattern_id: pattern_id(&outcome.gate, &example),
                    category: outcome.gate.clone(),
                    example,
                    severity,
                    session_id: session_id.to_string(),
                    recorded_at: result.evaluated_at,
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("pattern sink I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("pattern serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Append-only destination for pattern records.
pub trait PatternSink: Send + Sync {
    fn record(&self, record: &PatternRecord) -> Result<(), SinkError>;
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPatternSink;

impl PatternSink for NullPatternSink {
    fn record(&self, _record: &PatternRecord) -> Result<(), SinkError> {
        Ok(())
    }
}

/// One JSON object per line, appended to a single file.
#[derive(Debug)]
pub struct JsonlPatternSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlPatternSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PatternSink for JsonlPatternSink {
    fn record(&self, record: &PatternRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

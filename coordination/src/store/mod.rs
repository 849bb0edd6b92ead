//! Intermediate record store — human-readable JSON per session.
//!
//! ```text
//! <root>/<session_id>/topic.json
//! <root>/<session_id>/board_decision.json
//! <root>/<session_id>/session.json
//! <root>/<session_id>/stages/NN-<stage>-a<attempt>.json
//! <root>/board/<topic_id>-<timestamp>.json        (every board verdict)
//! <root>/topics/<topic_id>.json                   (discovery output, read-only)
//! ```
//!
//! Unknown fields are ignored on read so older binaries can open newer records.

pub mod patterns;

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::flow::session::{PipelineSession, StageLogEntry};
use crate::topic::Topic;
use crate::voting::BoardDecision;

pub use patterns::{
    pattern_id, JsonlPatternSink, NullPatternSink, PatternRecord, PatternSink, Severity, SinkError,
};

pub const SESSION_FILE: &str = "session.json";
pub const TOPIC_FILE: &str = "topic.json";
pub const BOARD_DECISION_FILE: &str = "board_decision.json";
pub const STAGES_DIR: &str = "stages";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed record {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("session schema version {found} is newer than supported {expected}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Board verdict as filed for later audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardRecord {
    pub topic: Topic,
    pub decision: BoardDecision,
}

/// Durable storage for topics, verdicts, sessions and stage outputs.
///
/// Writes are synchronous and small; failures propagate to the caller.
pub trait RecordStore: Send + Sync {
    /// File every board verdict, accepted or not.
    fn save_board_decision(&self, topic: &Topic, decision: &BoardDecision) -> Result<(), StoreError>;

    /// First write for a new session: topic, verdict and initial session state.
    fn create_session(&self, session: &PipelineSession, decision: &BoardDecision) -> Result<(), StoreError>;

    fn save_session(&self, session: &PipelineSession) -> Result<(), StoreError>;

    fn save_stage_entry(&self, session_id: &str, entry: &StageLogEntry) -> Result<(), StoreError>;

    fn load_session(&self, session_id: &str) -> Result<PipelineSession, StoreError>;

    /// Known session ids, sorted.
    fn list_sessions(&self) -> Result<Vec<String>, StoreError>;
}

/// Write JSON via a temp file and rename, so readers never see a partial record.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let text = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|e| StoreError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn stage_file_name(entry: &StageLogEntry) -> String {
    format!("{:02}-{}-a{}.json", entry.seq, entry.stage.slug(), entry.attempt)
}

fn check_version(session: &PipelineSession) -> Result<(), StoreError> {
    if session.version > PipelineSession::CURRENT_VERSION {
        return Err(StoreError::VersionMismatch {
            expected: PipelineSession::CURRENT_VERSION,
            found: session.version,
        });
    }
    Ok(())
}

/// Filesystem store rooted at the output directory.
#[derive(Debug, Clone)]
pub struct FsRecordStore {
    root: PathBuf,
}

impl FsRecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id)
    }

    /// Topic handed over by discovery, from `<root>/topics/<id>.json`.
    pub fn load_topic(&self, topic_id: &str) -> Result<Topic, StoreError> {
        read_json(&self.root.join("topics").join(format!("{topic_id}.json")))
    }

    pub fn load_board_decision(&self, session_id: &str) -> Result<BoardDecision, StoreError> {
        read_json(&self.session_dir(session_id).join(BOARD_DECISION_FILE))
    }

    /// Stage entries as written, in log order.
    pub fn load_stage_entries(&self, session_id: &str) -> Result<Vec<StageLogEntry>, StoreError> {
        let dir = self.session_dir(session_id).join(STAGES_DIR);
        let read_dir = match std::fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { path: dir, source }),
        };
        let mut entries = Vec::new();
        for item in read_dir {
            let item = item.map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = item.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                entries.push(read_json::<StageLogEntry>(&path)?);
            }
        }
        entries.sort_by_key(|e| e.seq);
        Ok(entries)
    }

    fn write(&self, path: &Path, value: &impl Serialize) -> Result<(), StoreError> {
        debug!(path = %path.display(), "Writing record");
        write_json_atomic(path, value).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl RecordStore for FsRecordStore {
    fn save_board_decision(&self, topic: &Topic, decision: &BoardDecision) -> Result<(), StoreError> {
        let name = format!(
            "{}-{}.json",
            topic.id,
            decision.decided_at.format("%Y%m%dT%H%M%S%3f")
        );
        self.write(
            &self.root.join("board").join(name),
            &BoardRecord {
                topic: topic.clone(),
                decision: decision.clone(),
            },
        )
    }

    fn create_session(&self, session: &PipelineSession, decision: &BoardDecision) -> Result<(), StoreError> {
        let dir = self.session_dir(&session.id);
        self.write(&dir.join(TOPIC_FILE), &session.topic)?;
        self.write(&dir.join(BOARD_DECISION_FILE), decision)?;
        self.save_session(session)
    }

    fn save_session(&self, session: &PipelineSession) -> Result<(), StoreError> {
        self.write(&self.session_dir(&session.id).join(SESSION_FILE), session)
    }

    fn save_stage_entry(&self, session_id: &str, entry: &StageLogEntry) -> Result<(), StoreError> {
        let path = self
            .session_dir(session_id)
            .join(STAGES_DIR)
            .join(stage_file_name(entry));
        self.write(&path, entry)
    }

    fn load_session(&self, session_id: &str) -> Result<PipelineSession, StoreError> {
        let path = self.session_dir(session_id).join(SESSION_FILE);
        if !path.exists() {
            return Err(StoreError::SessionNotFound(session_id.to_string()));
        }
        let session: PipelineSession = read_json(&path)?;
        check_version(&session)?;
        Ok(session)
    }

    fn list_sessions(&self) -> Result<Vec<String>, StoreError> {
        let read_dir = match std::fs::read_dir(&self.root) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.root.clone(),
                    source,
                })
            }
        };
        let mut ids: Vec<String> = read_dir
            .filter_map(Result::ok)
            .filter(|item| item.path().join(SESSION_FILE).is_file())
            .filter_map(|item| item.file_name().to_str().map(str::to_string))
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[derive(Default)]
struct MemoryState {
    sessions: HashMap<String, PipelineSession>,
    stages: HashMap<String, Vec<StageLogEntry>>,
    board: Vec<BoardRecord>,
}

/// In-memory store for tests and dry runs.
#[derive(Default)]
pub struct MemoryRecordStore {
    state: Mutex<MemoryState>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage_entries(&self, session_id: &str) -> Vec<StageLogEntry> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.stages.get(session_id).cloned().unwrap_or_default()
    }

    pub fn board_records(&self) -> Vec<BoardRecord> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.board.clone()
    }
}

impl RecordStore for MemoryRecordStore {
    fn save_board_decision(&self, topic: &Topic, decision: &BoardDecision) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.board.push(BoardRecord {
            topic: topic.clone(),
            decision: decision.clone(),
        });
        Ok(())
    }

    fn create_session(&self, session: &PipelineSession, _decision: &BoardDecision) -> Result<(), StoreError> {
        self.save_session(session)
    }

    fn save_session(&self, session: &PipelineSession) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    fn save_stage_entry(&self, session_id: &str, entry: &StageLogEntry) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .stages
            .entry(session_id.to_string())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    fn load_session(&self, session_id: &str) -> Result<PipelineSession, StoreError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))
    }

    fn list_sessions(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = state.sessions.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::session::{StageOutcome, StageRecord};
    use crate::flow::state::PipelineStage;
    use crate::voting::Decision;
    use chrono::Utc;

    fn fixture() -> (PipelineSession, BoardDecision) {
        let topic = Topic::new("t-1", "Bridge repairs", "local");
        let decision = BoardDecision {
            topic_id: topic.id.clone(),
            votes: vec![],
            composite_score: 7.2,
            decision: Decision::Accept,
            tie_break_reason: None,
            decided_at: Utc::now(),
        };
        let session = PipelineSession::new(topic, &decision, 2).unwrap();
        (session, decision)
    }

    #[test]
    fn test_fs_store_layout_and_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRecordStore::new(dir.path());
        let (mut session, decision) = fixture();
        store.create_session(&session, &decision).unwrap();

        session
            .advance(PipelineStage::Research, StageRecord::new(StageOutcome::Completed))
            .unwrap();
        let entry = session
            .advance(
                PipelineStage::Draft,
                StageRecord::new(StageOutcome::Completed).with_content("research notes"),
            )
            .unwrap()
            .clone();
        store.save_stage_entry(&session.id, &entry).unwrap();
        store.save_session(&session).unwrap();

        let sdir = store.session_dir(&session.id);
        assert!(sdir.join(TOPIC_FILE).is_file());
        assert!(sdir.join(BOARD_DECISION_FILE).is_file());
        assert!(sdir.join(STAGES_DIR).join("02-research-a1.json").is_file());

        let loaded = store.load_session(&session.id).unwrap();
        assert_eq!(loaded, session);
        assert_eq!(store.load_board_decision(&session.id).unwrap(), decision);
        assert_eq!(store.load_stage_entries(&session.id).unwrap(), vec![entry]);
        assert_eq!(store.list_sessions().unwrap(), vec![session.id.clone()]);
    }

    #[test]
    fn test_missing_session_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRecordStore::new(dir.path());
        assert!(matches!(
            store.load_session("nope"),
            Err(StoreError::SessionNotFound(_))
        ));
        assert!(store.list_sessions().unwrap().is_empty());
    }

    #[test]
    fn test_newer_schema_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRecordStore::new(dir.path());
        let (mut session, decision) = fixture();
        session.version = PipelineSession::CURRENT_VERSION + 1;
        store.create_session(&session, &decision).unwrap();
        assert!(matches!(
            store.load_session(&session.id),
            Err(StoreError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_load_topic_ignores_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("topics")).unwrap();
        std::fs::write(
            dir.path().join("topics").join("t-9.json"),
            r#"{"id":"t-9","title":"Ferry schedule","category":"transport","rank":3}"#,
        )
        .unwrap();
        let topic = FsRecordStore::new(dir.path()).load_topic("t-9").unwrap();
        assert_eq!(topic.title, "Ferry schedule");
    }

    #[test]
    fn test_board_decisions_are_filed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRecordStore::new(dir.path());
        let (session, decision) = fixture();
        store.save_board_decision(&session.topic, &decision).unwrap();
        let files: Vec<_> = std::fs::read_dir(dir.path().join("board")).unwrap().collect();
        assert_eq!(files.len(), 1);
        // board/ holds no session.json, so it is not listed as a session
        assert!(store.list_sessions().unwrap().is_empty());
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("x.json");
        write_json_atomic(&path, &serde_json::json!({"a": 1})).unwrap();
        assert!(path.is_file());
        assert!(!path.with_extension("json.tmp").exists());
    }
}

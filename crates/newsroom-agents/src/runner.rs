//! Wires the coordination core to a filesystem output directory.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use coordination::governance::GovernanceCheckpoint;
use coordination::inference::InferenceClient;
use coordination::store::PatternSink;
use coordination::{
    AutoApprove, Board, BoardDecision, FilePollingCheckpoint, FsRecordStore, GovernanceDecision,
    JsonlPatternSink, Orchestrator, PipelineConfig, PipelineSession, RecordStore, Topic,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Result of `run`: either the board turned the topic down, or a session ran.
#[derive(Debug)]
pub enum RunReport {
    BoardRejected(BoardDecision),
    Finished(PipelineSession),
}

pub struct Newsroom {
    config: PipelineConfig,
    client: Arc<dyn InferenceClient>,
    store: Arc<FsRecordStore>,
    checkpoint: FilePollingCheckpoint,
    governance: Arc<dyn GovernanceCheckpoint>,
    patterns: Arc<dyn PatternSink>,
}

impl Newsroom {
    /// Everything lives under `output_dir`: session records, governance
    /// request/decision files and the pattern log.
    pub fn new(
        config: PipelineConfig,
        client: Arc<dyn InferenceClient>,
        output_dir: &Path,
        patterns_path: &Path,
    ) -> Self {
        let checkpoint = FilePollingCheckpoint::new(output_dir);
        let governance: Arc<dyn GovernanceCheckpoint> = if config.governance.auto_approve {
            Arc::new(AutoApprove)
        } else {
            Arc::new(checkpoint.clone())
        };
        Self {
            config,
            client,
            store: Arc::new(FsRecordStore::new(output_dir)),
            checkpoint,
            governance,
            patterns: Arc::new(JsonlPatternSink::new(patterns_path)),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.checkpoint = self.checkpoint.with_poll_interval(interval);
        if !self.config.governance.auto_approve {
            self.governance = Arc::new(self.checkpoint.clone());
        }
        self
    }

    pub fn store(&self) -> &FsRecordStore {
        &self.store
    }

    fn orchestrator(&self) -> Result<Orchestrator> {
        let orchestrator = Orchestrator::new(
            self.config.clone(),
            Arc::clone(&self.client),
            Arc::clone(&self.governance),
            self.store.clone(),
        )
        .context("invalid pipeline configuration")?;
        Ok(orchestrator.with_pattern_sink(Arc::clone(&self.patterns)))
    }

    /// A discovery topic id from `<output>/topics/`, or free text.
    pub fn resolve_topic(&self, input: &str, category: Option<&str>) -> Result<Topic> {
        let path = self
            .store
            .root()
            .join("topics")
            .join(format!("{input}.json"));
        let topic = if path.is_file() {
            self.store
                .load_topic(input)
                .with_context(|| format!("failed to load topic {input}"))?
        } else {
            Topic::from_text(input, category)
        };
        Ok(match category {
            Some(category) => topic.with_category(category),
            None => topic,
        })
    }

    /// Convene the editorial board and file its verdict.
    pub async fn vote(&self, topic: &Topic, cancel: &CancellationToken) -> Result<BoardDecision> {
        let board = Board::new(
            self.config.voting.clone(),
            Arc::clone(&self.client),
            self.config.prompts.board_vote.clone(),
        )
        .context("invalid voting configuration")?
        .with_params(self.config.inference.clone())
        .with_retry(self.config.retry.clone());

        let outcome = board
            .convene(topic, cancel)
            .await
            .with_context(|| format!("board vote failed for topic {}", topic.id))?;
        self.store
            .save_board_decision(topic, &outcome.decision)
            .context("failed to file board decision")?;
        info!(
            topic_id = %topic.id,
            decision = %outcome.decision.decision,
            composite = outcome.decision.composite_score,
            tokens = outcome.token_usage.total(),
            "Board verdict filed"
        );
        Ok(outcome.decision)
    }

    /// Vote, then run the pipeline if the board accepted.
    pub async fn run(&self, topic: Topic, cancel: CancellationToken) -> Result<RunReport> {
        let decision = self.vote(&topic, &cancel).await?;
        if !decision.is_accepted() {
            return Ok(RunReport::BoardRejected(decision));
        }
        let orchestrator = self.orchestrator()?;
        let session = orchestrator.start_session(topic, &decision)?;
        let session = orchestrator.run(session, cancel).await?;
        Ok(RunReport::Finished(session))
    }

    pub async fn resume(&self, session_id: &str, cancel: CancellationToken) -> Result<PipelineSession> {
        let session = self
            .orchestrator()?
            .resume(session_id, cancel)
            .await
            .with_context(|| format!("failed to resume session {session_id}"))?;
        Ok(session)
    }

    pub fn abandon(&self, session_id: &str, note: &str) -> Result<PipelineSession> {
        let session = self
            .orchestrator()?
            .abandon(session_id, note)
            .with_context(|| format!("failed to abandon session {session_id}"))?;
        Ok(session)
    }

    pub fn show(&self, session_id: &str) -> Result<PipelineSession> {
        self.store
            .load_session(session_id)
            .with_context(|| format!("failed to load session {session_id}"))
    }

    /// Answer a pending governance request for a session.
    pub fn decide(&self, session_id: &str, decision: &GovernanceDecision) -> Result<()> {
        // refuse decisions for sessions that do not exist
        self.show(session_id)?;
        self.checkpoint
            .write_decision(session_id, decision)
            .with_context(|| format!("failed to write decision for {session_id}"))?;
        info!(
            session_id,
            approved = decision.approved,
            reviewer = %decision.reviewer,
            "Governance decision written"
        );
        Ok(())
    }
}

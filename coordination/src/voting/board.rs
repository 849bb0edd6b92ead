//! Editorial board — asks each persona for a scored verdict, then aggregates.

use std::sync::Arc;

use futures::future::join_all;
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::aggregator::{BoardDecision, PersonaSpec, Vote, VotingAggregator, VotingConfig};
use crate::error::ValidationError;
use crate::flow::prompts::render;
use crate::inference::{
    invoke_with_retry, InferenceClient, InferenceError, InferenceParams, RetryPolicy, TokenUsage,
};
use crate::topic::Topic;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("persona {persona} could not be reached: {source}")]
    Provider {
        persona: String,
        #[source]
        source: InferenceError,
    },

    #[error("persona {persona} returned an unusable vote: {reason}")]
    UnparseableVote { persona: String, reason: String },
}

/// What a persona is asked to return.
#[derive(Debug, Deserialize)]
struct RawVote {
    score: f64,
    #[serde(default)]
    veto: bool,
    #[serde(default)]
    rationale: String,
}

/// Board verdict plus what it cost.
#[derive(Debug, Clone)]
pub struct BoardOutcome {
    pub decision: BoardDecision,
    pub token_usage: TokenUsage,
}

/// Convenes the configured personas concurrently and feeds their votes to
/// the [`VotingAggregator`].
pub struct Board {
    aggregator: VotingAggregator,
    client: Arc<dyn InferenceClient>,
    template: String,
    params: InferenceParams,
    retry: RetryPolicy,
}

impl Board {
    pub fn new(
        config: VotingConfig,
        client: Arc<dyn InferenceClient>,
        template: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            aggregator: VotingAggregator::new(config)?,
            client,
            template: template.into(),
            params: InferenceParams::default(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_params(mut self, params: InferenceParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Ask every persona and decide. Votes keep configuration order.
    pub async fn convene(
        &self,
        topic: &Topic,
        cancel: &CancellationToken,
    ) -> Result<BoardOutcome, BoardError> {
        let config = self.aggregator.config();
        info!(topic_id = %topic.id, personas = config.personas.len(), "Convening board");

        let ballots = config
            .personas
            .iter()
            .map(|persona| self.ask(persona, topic, cancel));
        let mut votes = Vec::with_capacity(config.personas.len());
        let mut token_usage = TokenUsage::default();
        for result in join_all(ballots).await {
            let (vote, usage) = result?;
            token_usage += usage;
            votes.push(vote);
        }

        let decision = self.aggregator.aggregate(topic, votes)?;
        Ok(BoardOutcome {
            decision,
            token_usage,
        })
    }

    async fn ask(
        &self,
        persona: &PersonaSpec,
        topic: &Topic,
        cancel: &CancellationToken,
    ) -> Result<(Vote, TokenUsage), BoardError> {
        let cfg = self.aggregator.config();
        let min = cfg.min_score.to_string();
        let max = cfg.max_score.to_string();
        let prompt = render(
            &self.template,
            &[
                ("persona", persona.id.as_str()),
                ("brief", persona.brief.as_str()),
                ("title", topic.title.as_str()),
                ("category", topic.category.as_str()),
                ("notes", topic.notes.as_str()),
                ("min_score", min.as_str()),
                ("max_score", max.as_str()),
            ],
        );

        let output = invoke_with_retry(self.client.as_ref(), &prompt, &self.params, &self.retry, cancel)
            .await
            .map_err(|source| BoardError::Provider {
                persona: persona.id.clone(),
                source,
            })?;

        let raw = match output.structured {
            Some(value) => serde_json::from_value::<RawVote>(value).map_err(|e| e.to_string()),
            None => parse_vote_reply(&output.text),
        }
        .map_err(|reason| BoardError::UnparseableVote {
            persona: persona.id.clone(),
            reason,
        })?;

        let mut vote = Vote::new(&persona.id, raw.score, persona.weight).with_rationale(raw.rationale);
        if raw.veto {
            if persona.can_veto {
                vote = vote.with_veto();
            } else {
                warn!(persona = %persona.id, "Dropping veto from persona without veto capability");
            }
        }
        debug!(persona = %persona.id, score = vote.score, veto = vote.veto, "Vote received");
        Ok((vote, output.token_usage))
    }
}

/// Extract the first JSON object in a free-form reply.
fn parse_vote_reply(text: &str) -> Result<RawVote, String> {
    for (idx, _) in text.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&text[idx..]).into_iter::<RawVote>();
        if let Some(Ok(vote)) = stream.next() {
            return Ok(vote);
        }
    }
    Err(format!(
        "no JSON object with a numeric score in reply ({} chars)",
        text.len()
    ))
}

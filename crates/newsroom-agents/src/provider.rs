//! OpenAI-compatible `/chat/completions` client.

use std::time::Duration;

use async_trait::async_trait;
use coordination::inference::{InferenceClient, InferenceError, InferenceOutput, InferenceParams};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Endpoint;

#[derive(Debug, Serialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    reasoning_content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Build the request body for a prompt.
pub fn build_request(endpoint: &Endpoint, prompt: &str, params: &InferenceParams) -> ChatRequest {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &params.system {
        messages.push(ChatMessage {
            role: "system".into(),
            content: system.clone(),
        });
    }
    messages.push(ChatMessage {
        role: "user".into(),
        content: prompt.to_string(),
    });
    ChatRequest {
        model: params
            .model
            .clone()
            .unwrap_or_else(|| endpoint.model.clone()),
        messages,
        max_tokens: params.max_tokens,
        temperature: params.temperature,
    }
}

/// Extract the answer and token usage from a response body.
///
/// Reasoning models put their chain of thought in `reasoning_content`; only
/// the answer is returned, unless the answer is missing entirely.
pub fn parse_chat_completion(body: &str) -> Result<InferenceOutput, InferenceError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| InferenceError::provider(None, format!("Failed to parse response: {e}")))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| InferenceError::provider(None, "No response from LLM"))?;

    let text = match (choice.message.content, choice.message.reasoning_content) {
        (Some(answer), _) if !answer.trim().is_empty() => answer,
        (_, Some(reasoning)) => reasoning,
        (answer, None) => answer.unwrap_or_default(),
    };
    let usage = response.usage.unwrap_or(Usage {
        prompt_tokens: 0,
        completion_tokens: 0,
    });
    Ok(InferenceOutput::text(text).with_usage(usage.prompt_tokens, usage.completion_tokens))
}

pub struct OpenAiCompatClient {
    endpoint: Endpoint,
    http: reqwest::Client,
    timeout: Duration,
}

impl OpenAiCompatClient {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            endpoint,
            http: reqwest::Client::builder().timeout(timeout).build()?,
            timeout,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.url.trim_end_matches('/'))
    }
}

#[async_trait]
impl InferenceClient for OpenAiCompatClient {
    async fn invoke(
        &self,
        prompt: &str,
        params: &InferenceParams,
    ) -> Result<InferenceOutput, InferenceError> {
        let request = build_request(&self.endpoint, prompt, params);
        debug!(model = %request.model, prompt_chars = prompt.len(), "Chat completion request");

        let mut builder = self.http.post(self.completions_url()).json(&request);
        if let Some(key) = &self.endpoint.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout(self.timeout)
            } else {
                InferenceError::provider(None, format!("HTTP request failed: {e}"))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| InferenceError::provider(Some(status.as_u16()), e.to_string()))?;
        if !status.is_success() {
            return Err(InferenceError::provider(
                Some(status.as_u16()),
                format!("LLM API error ({status}): {body}"),
            ));
        }
        parse_chat_completion(&body)
    }
}

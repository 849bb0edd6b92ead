//! Inference Client Adapter — the narrow seam to LLM providers.
//!
//! The core never talks HTTP itself. Every stage goes through
//! [`InferenceClient::invoke`], wrapped by [`retry::invoke_with_retry`] for the
//! per-call deadline and exponential backoff.

pub mod retry;

use std::ops::{Add, AddAssign};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use retry::{invoke_with_retry, RetryPolicy};

/// Generation parameters passed alongside each prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceParams {
    /// Model override; `None` lets the adapter use its configured default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Optional system preamble.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.4,
            max_tokens: 2048,
            system: None,
        }
    }
}

/// Tokens consumed by one or more calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self { input, output }
    }

    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

impl Add for TokenUsage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            input: self.input + rhs.input,
            output: self.output + rhs.output,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Raw provider output: text, plus the parsed JSON when the reply was structured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceOutput {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,
    #[serde(default)]
    pub token_usage: TokenUsage,
}

impl InferenceOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            structured: None,
            token_usage: TokenUsage::default(),
        }
    }

    pub fn with_structured(mut self, value: serde_json::Value) -> Self {
        self.structured = Some(value);
        self
    }

    pub fn with_usage(mut self, input: u64, output: u64) -> Self {
        self.token_usage = TokenUsage::new(input, output);
        self
    }
}

/// Failure of a single inference call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    /// Non-2xx response, or the request never reached the provider (`status: None`).
    #[error("provider error (status {status:?}): {message}")]
    Provider {
        status: Option<u16>,
        message: String,
    },

    #[error("inference call timed out after {0:?}")]
    Timeout(Duration),
}

impl InferenceError {
    pub fn provider(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Provider {
            status,
            message: message.into(),
        }
    }

    /// Whether another attempt may succeed.
    ///
    /// Timeouts, connection failures, rate limits and 5xx are transient;
    /// other 4xx responses (auth, schema) fail immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Provider { status: None, .. } => true,
            Self::Provider {
                status: Some(code), ..
            } => *code == 408 || *code == 429 || *code >= 500,
        }
    }
}

/// A provider that turns a prompt into text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn invoke(
        &self,
        prompt: &str,
        params: &InferenceParams,
    ) -> Result<InferenceOutput, InferenceError>;
}

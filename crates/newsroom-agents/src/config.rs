use std::path::PathBuf;
use std::time::Duration;

/// OpenAI-compatible inference endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    /// Base URL up to and including `/v1`.
    pub url: String,
    pub model: String,
    /// Bearer token; local servers usually need none.
    pub api_key: Option<String>,
}

/// Process-level configuration: where to talk to and where to write.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub endpoint: Endpoint,
    /// Root of the record store, governance files and pattern log.
    pub output_dir: PathBuf,
    /// Optional pipeline TOML (personas, gates, budgets, prompts).
    pub pipeline_config: Option<PathBuf>,
    /// HTTP client timeout; the per-call retry deadline sits inside it.
    pub request_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl AgentConfig {
    /// Build from a variable lookup (the environment, or a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            endpoint: Endpoint {
                url: lookup("NEWSROOM_LLM_URL")
                    .unwrap_or_else(|| "http://localhost:8000/v1".into()),
                model: lookup("NEWSROOM_LLM_MODEL").unwrap_or_else(|| "newsroom-writer".into()),
                api_key: lookup("NEWSROOM_LLM_API_KEY").filter(|k| !k.is_empty()),
            },
            output_dir: lookup("NEWSROOM_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("newsroom-output")),
            pipeline_config: lookup("NEWSROOM_CONFIG").map(PathBuf::from),
            request_timeout: lookup("NEWSROOM_HTTP_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(300)),
        }
    }

    /// Append-only log of recurring gate failures.
    pub fn patterns_path(&self) -> PathBuf {
        self.output_dir.join("patterns").join("gate_failures.jsonl")
    }
}

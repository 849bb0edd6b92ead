//! Pipeline configuration — personas, gates, budgets and prompts as data.
//!
//! Every section is optional in TOML; missing keys take their defaults.
//!
//! ```toml
//! [voting]
//! acceptance_threshold = 6.5
//!
//! [[voting.personas]]
//! id = "editor"
//! weight = 1.2
//! can_veto = true
//!
//! [rework]
//! max_reworks = 1
//!
//! [governance]
//! timeout_secs = 900
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ValidationError;
use crate::escalation::ReworkPolicy;
use crate::flow::prompts::StagePrompts;
use crate::gates::{GateConfig, GateEvaluator};
use crate::inference::{InferenceParams, RetryPolicy};
use crate::voting::VotingConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// How long to wait for a human decision before failing closed.
    pub timeout_secs: u64,
    /// Approve without asking. Dry runs only.
    pub auto_approve: bool,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 3600,
            auto_approve: false,
        }
    }
}

impl GovernanceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub voting: VotingConfig,
    pub gates: GateConfig,
    pub rework: ReworkPolicy,
    pub retry: RetryPolicy,
    pub inference: InferenceParams,
    pub governance: GovernanceConfig,
    pub prompts: StagePrompts,
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_toml_str(&text)
            }
            None => Ok(Self::default()),
        }
    }

    /// Validate the sections that have cross-field rules.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.voting.validate()?;
        GateEvaluator::new(&self.gates)?;
        Ok(())
    }

    pub fn with_max_reworks(mut self, max_reworks: u32) -> Self {
        self.rework.max_reworks = max_reworks;
        self
    }

    pub fn with_governance_timeout(mut self, timeout: Duration) -> Self {
        self.governance.timeout_secs = timeout.as_secs();
        self
    }
}

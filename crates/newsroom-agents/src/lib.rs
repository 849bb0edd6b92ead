//! Newsroom agents: the command-line driver around the coordination core.
//!
//! - `config`: endpoint and output settings from the environment
//! - `provider`: OpenAI-compatible HTTP inference client
//! - `runner`: board vote → pipeline run against a filesystem output directory
//! - `exit_code`: terminal outcome → process exit status

pub mod cli;
pub mod config;
pub mod exit_code;
pub mod provider;
pub mod runner;

pub use config::{AgentConfig, Endpoint};
pub use exit_code::ExitStatus;
pub use provider::OpenAiCompatClient;
pub use runner::{Newsroom, RunReport};

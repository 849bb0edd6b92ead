use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Newsroom content pipeline", long_about = None)]
pub struct Cli {
    /// Output directory for session records (overrides NEWSROOM_OUTPUT_DIR)
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Pipeline configuration TOML (overrides NEWSROOM_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Inference endpoint base URL (overrides NEWSROOM_LLM_URL)
    #[arg(long, global = true)]
    pub llm_url: Option<String>,

    /// Model name (overrides NEWSROOM_LLM_MODEL)
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Vote on a topic and, if accepted, run it to publication or escalation
    Run {
        /// Discovery topic id, or free text
        topic: String,
        /// Override the topic category
        #[arg(long)]
        category: Option<String>,
        /// Maximum reworks before escalating
        #[arg(long)]
        max_reworks: Option<u32>,
        /// Seconds to wait for a governance decision
        #[arg(long)]
        governance_timeout_secs: Option<u64>,
        /// Approve at the governance checkpoint without asking (dry runs)
        #[arg(long, default_value_t = false)]
        auto_approve: bool,
    },
    /// Ask the editorial board about a topic without running the pipeline
    Vote {
        topic: String,
        #[arg(long)]
        category: Option<String>,
    },
    /// Score a review text file against the quality gates
    Gates {
        file: PathBuf,
    },
    /// Continue a stored session from its current stage
    Resume {
        session_id: String,
    },
    /// Approve a session waiting at the governance checkpoint
    Approve {
        session_id: String,
        #[arg(long, default_value = "editor")]
        reviewer: String,
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Reject a session waiting at the governance checkpoint
    Reject {
        session_id: String,
        #[arg(long, default_value = "editor")]
        reviewer: String,
        #[arg(long)]
        reason: String,
    },
    /// Stop a session for good
    Abandon {
        session_id: String,
        #[arg(long, default_value = "abandoned by operator")]
        note: String,
    },
    /// Print a session as JSON, or list sessions when no id is given
    Show {
        session_id: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_with_free_text_and_overrides() {
        let cli = Cli::try_parse_from([
            "newsroom",
            "run",
            "Ferry fares rise in spring",
            "--category",
            "transport",
            "--max-reworks",
            "1",
            "--output-dir",
            "/tmp/news",
        ])
        .unwrap();
        assert_eq!(cli.output_dir, Some(PathBuf::from("/tmp/news")));
        assert_eq!(
            cli.command,
            Command::Run {
                topic: "Ferry fares rise in spring".into(),
                category: Some("transport".into()),
                max_reworks: Some(1),
                governance_timeout_secs: None,
                auto_approve: false,
            }
        );
    }

    #[test]
    fn reject_requires_reason() {
        assert!(Cli::try_parse_from(["newsroom", "reject", "s-1"]).is_err());
        let cli =
            Cli::try_parse_from(["newsroom", "reject", "s-1", "--reason", "unsourced"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Reject { ref reviewer, ref reason, .. } if reviewer == "editor" && reason == "unsourced"
        ));
    }

    #[test]
    fn show_without_id_lists() {
        let cli = Cli::try_parse_from(["newsroom", "--json-logs", "show"]).unwrap();
        assert!(cli.json_logs);
        assert_eq!(cli.command, Command::Show { session_id: None });
    }
}

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use coordination::{
    GateEvaluator, GovernanceDecision, PipelineConfig, PipelineSession, RecordStore,
};
use newsroom_agents::cli::{Cli, Command};
use newsroom_agents::{AgentConfig, ExitStatus, Newsroom, OpenAiCompatClient, RunReport};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match execute(cli).await {
        Ok(status) => status.into(),
        Err(e) => {
            error!("{e:#}");
            ExitStatus::for_error(&e).into()
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn execute(cli: Cli) -> Result<ExitStatus> {
    let mut agent = AgentConfig::default();
    if let Some(dir) = cli.output_dir {
        agent.output_dir = dir;
    }
    if let Some(path) = cli.config {
        agent.pipeline_config = Some(path);
    }
    if let Some(url) = cli.llm_url {
        agent.endpoint.url = url;
    }
    if let Some(model) = cli.model {
        agent.endpoint.model = model;
    }
    let mut pipeline = PipelineConfig::load(agent.pipeline_config.as_deref())
        .context("failed to load pipeline configuration")?;

    if let Command::Gates { file } = &cli.command {
        let review = std::fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        let result = GateEvaluator::new(&pipeline.gates)?.evaluate(&review);
        for outcome in &result.outcomes {
            println!(
                "{:<20} {:<10} {}",
                outcome.gate,
                outcome.verdict.to_string(),
                outcome.rationale
            );
        }
        println!("{}", result.summary_line());
        return Ok(ExitStatus::Success);
    }

    if let Command::Run {
        max_reworks,
        governance_timeout_secs,
        auto_approve,
        ..
    } = &cli.command
    {
        if let Some(max) = max_reworks {
            pipeline = pipeline.with_max_reworks(*max);
        }
        if let Some(secs) = governance_timeout_secs {
            pipeline = pipeline.with_governance_timeout(Duration::from_secs(*secs));
        }
        pipeline.governance.auto_approve |= *auto_approve;
    }

    info!(
        url = %agent.endpoint.url,
        model = %agent.endpoint.model,
        output = %agent.output_dir.display(),
        "Newsroom starting"
    );
    let client = OpenAiCompatClient::new(agent.endpoint.clone(), agent.request_timeout)
        .context("failed to build HTTP client")?;
    let newsroom = Newsroom::new(
        pipeline,
        Arc::new(client),
        &agent.output_dir,
        &agent.patterns_path(),
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; finishing the in-flight call, then stopping");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Command::Run {
            topic, category, ..
        } => {
            let topic = newsroom.resolve_topic(&topic, category.as_deref())?;
            match newsroom.run(topic, cancel).await? {
                RunReport::BoardRejected(decision) => {
                    println!(
                        "board rejected {} (composite {:.2}{})",
                        decision.topic_id,
                        decision.composite_score,
                        decision
                            .tie_break_reason
                            .map(|r| format!(", {r}"))
                            .unwrap_or_default()
                    );
                    Ok(ExitStatus::BoardRejected)
                }
                RunReport::Finished(session) => Ok(report(&session)),
            }
        }
        Command::Vote { topic, category } => {
            let topic = newsroom.resolve_topic(&topic, category.as_deref())?;
            let decision = newsroom.vote(&topic, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&decision)?);
            Ok(if decision.is_accepted() {
                ExitStatus::Success
            } else {
                ExitStatus::BoardRejected
            })
        }
        Command::Resume { session_id } => {
            let session = newsroom.resume(&session_id, cancel).await?;
            Ok(report(&session))
        }
        Command::Approve {
            session_id,
            reviewer,
            reason,
        } => {
            newsroom.decide(&session_id, &GovernanceDecision::approve(reviewer, reason))?;
            Ok(ExitStatus::Success)
        }
        Command::Reject {
            session_id,
            reviewer,
            reason,
        } => {
            newsroom.decide(&session_id, &GovernanceDecision::reject(reviewer, reason))?;
            Ok(ExitStatus::Success)
        }
        Command::Abandon { session_id, note } => {
            let session = newsroom.abandon(&session_id, &note)?;
            Ok(report(&session))
        }
        Command::Show {
            session_id: Some(session_id),
        } => {
            let session = newsroom.show(&session_id)?;
            println!("{}", serde_json::to_string_pretty(&session)?);
            Ok(ExitStatus::for_session(&session))
        }
        Command::Show { session_id: None } => {
            for id in newsroom.store().list_sessions()? {
                match newsroom.show(&id) {
                    Ok(session) => println!("{}", summary(&session)),
                    Err(e) => println!("{id}  unreadable: {e:#}"),
                }
            }
            Ok(ExitStatus::Success)
        }
        Command::Gates { .. } => Ok(ExitStatus::Success),
    }
}

fn summary(session: &PipelineSession) -> String {
    let outcome = session
        .outcome
        .map(|o| format!("{o:?}").to_lowercase())
        .unwrap_or_else(|| "running".into());
    let mut line = format!(
        "{}  {}  {}  {}  tokens={}",
        session.id,
        session.topic.title,
        session.current,
        outcome,
        session.token_usage.total()
    );
    if let Some(escalation) = &session.escalation {
        line.push_str(&format!("  ({})", escalation.describe()));
    }
    line
}

fn report(session: &PipelineSession) -> ExitStatus {
    println!("{}", summary(session));
    ExitStatus::for_session(session)
}

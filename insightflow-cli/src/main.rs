//! Insightflow CLI: runs one research workflow against HTTP services and
//! prints or saves the resulting report.

mod cli;

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use cli::Cli;
use insightflow::cancellation::CancellationToken;
use insightflow::config::EngineConfig;
use insightflow::core::WorkflowStatus;
use insightflow::events::LoggingEventSink;
use insightflow::observability::init_tracing;
use insightflow::pipeline::{Orchestrator, WorkflowRequest, WorkflowResult};
use insightflow::services::http::{HttpRetrievalService, OpenAiGenerationService};
use insightflow::stages::StagePorts;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format(), cli.log_filter());

    match run(cli).await {
        Ok(WorkflowStatus::Aborted) => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(url) = &cli.retrieval_url {
        config.endpoints.retrieval_url = Some(url.clone());
    }
    if let Some(url) = &cli.generation_url {
        config.endpoints.generation_url = Some(url.clone());
    }
    Ok(config)
}

fn build_ports(config: &EngineConfig) -> Result<StagePorts> {
    let Some(retrieval_url) = config.endpoints.retrieval_url.as_deref() else {
        bail!("no retrieval endpoint configured; pass --retrieval-url or set endpoints.retrieval_url");
    };
    let Some(generation_url) = config.endpoints.generation_url.as_deref() else {
        bail!("no generation endpoint configured; pass --generation-url or set endpoints.generation_url");
    };

    let key_env = config
        .endpoints
        .api_key_env
        .as_deref()
        .unwrap_or(DEFAULT_API_KEY_ENV);
    let api_key = std::env::var(key_env).ok();
    if api_key.is_none() {
        warn!(env = key_env, "No API key found; calling the generation endpoint without one");
    }

    let timeout = Duration::from_millis(config.per_call_timeout_ms);
    let retrieval = HttpRetrievalService::new(retrieval_url, timeout)?;
    let generation = OpenAiGenerationService::new(generation_url, api_key, timeout)?;
    Ok(StagePorts::new(Arc::new(retrieval), Arc::new(generation)))
}

async fn run(cli: Cli) -> Result<WorkflowStatus> {
    let config = load_config(&cli)?;
    let ports = build_ports(&config)?;
    let orchestrator =
        Orchestrator::new(config, ports)?.with_event_sink(Arc::new(LoggingEventSink::default()));

    let token = Arc::new(CancellationToken::new());
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling workflow");
            interrupt.cancel("interrupted by user");
        }
    });

    let request = WorkflowRequest::new(cli.query.clone()).with_options(cli.options());
    let result = orchestrator.run_with_cancellation(request, &token).await?;
    report(&cli, &result)?;
    Ok(result.status)
}

fn report(cli: &Cli, result: &WorkflowResult) -> Result<()> {
    if cli.json {
        println!("{}", result.to_json()?);
    } else {
        println!("{}\n", result.summary());
        if result.has_report() {
            println!("{}", result.report);
        }
    }

    if result.status == WorkflowStatus::Aborted {
        let message = result
            .error
            .as_ref()
            .map_or_else(|| "unknown error".to_string(), |e| e.message.clone());
        eprintln!("Workflow aborted: {message}");
        return Ok(());
    }

    if !cli.no_save {
        result
            .save_report(&cli.output)
            .with_context(|| format!("failed to save report to {}", cli.output.display()))?;
        eprintln!("Report saved to {}", cli.output.display());
    }
    Ok(())
}

//! Command-line arguments.

use clap::Parser;
use insightflow::observability::LogFormat;
use insightflow::pipeline::WorkflowOptions;
use std::path::PathBuf;

/// Run a multi-stage, citation-grounded research workflow
#[derive(Parser, Debug)]
#[command(name = "insightflow", version, about, long_about = None)]
pub struct Cli {
    /// Research query or topic to analyze
    #[arg(short, long)]
    pub query: String,

    /// Engine configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Model used by every stage
    #[arg(short, long)]
    pub model: Option<String>,

    /// Temperature applied to every stage
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Retries per stage after the first attempt
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Budget for one stage attempt, in milliseconds
    #[arg(long)]
    pub stage_timeout_ms: Option<u64>,

    /// Base URL of the retrieval service (overrides the config file)
    #[arg(long)]
    pub retrieval_url: Option<String>,

    /// Base URL of an OpenAI-compatible API (overrides the config file)
    #[arg(long)]
    pub generation_url: Option<String>,

    /// Where to write the report
    #[arg(short, long, default_value = "research_report.md")]
    pub output: PathBuf,

    /// Don't save the report to a file
    #[arg(long)]
    pub no_save: bool,

    /// Print the full result as JSON instead of the report
    #[arg(long)]
    pub json: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Per-run overrides taken from the flags.
    pub fn options(&self) -> WorkflowOptions {
        let mut options = WorkflowOptions::new();
        if let Some(model) = &self.model {
            options = options.with_model(model.clone());
        }
        if let Some(temperature) = self.temperature {
            options = options.with_temperature_all(temperature);
        }
        if let Some(retries) = self.max_retries {
            options = options.with_max_retries(retries);
        }
        if let Some(timeout_ms) = self.stage_timeout_ms {
            options = options.with_per_stage_timeout_ms(timeout_ms);
        }
        options
    }

    pub fn log_format(&self) -> LogFormat {
        if self.log_json {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }

    /// Default tracing filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn,insightflow=info",
            1 => "info,insightflow=debug",
            _ => "debug,insightflow=trace",
        }
    }
}

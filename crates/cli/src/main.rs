//! Octopilot CLI entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: clap arguments and environment credentials
//!    become a validated [`pipeline::RunConfig`].
//! 2. **Wire observability**: `tracing-subscriber` with an `EnvFilter`, a text
//!    or JSON formatting layer, and an optional OpenTelemetry OTLP exporter.
//!    Every span and event emitted by the workspace flows through here.
//! 3. **Construct infrastructure**: a [`github::GithubClient`] and an
//!    [`llm::AnthropicRuntime`], injected into [`nodes::PipelineExecutor`].
//! 4. **Run and report**: print the final report and map the outcome to the
//!    process exit code.
//!
//! ## Exit codes
//!
//! | Code | Meaning |
//! |---|---|
//! | 0 | Run completed and the report was posted |
//! | 1 | Fatal error (configuration, default branch, triage, agent failure) |
//! | 2 | Run completed partially, or the report could not be posted |

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use github::GithubClient;
use llm::AnthropicRuntime;
use nodes::{resolve_repository, PipelineExecutor, RunOutcome};
use pipeline::{IssueNumber, ModelId, RunConfig, RunStage, DEFAULT_MAX_REVIEW_CYCLES, DEFAULT_MODEL};

const SERVICE_NAME: &str = "octopilot";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Resolve a GitHub issue with a pipeline of LLM role agents.
#[derive(Debug, Parser)]
#[command(name = "octopilot", version, about)]
struct Cli {
    /// Repository name, or `owner/name`.
    repo: String,

    /// Number of the issue to resolve.
    issue_number: u64,

    /// Repository owner or organisation; overrides an owner embedded in `repo`.
    #[arg(long, env = "GITHUB_OWNER")]
    owner: Option<String>,

    /// Comma-separated file paths to change; skips file identification.
    #[arg(short = 'f', long = "target-files", value_name = "PATHS")]
    target_files: Option<String>,

    /// Maximum number of proposal attempts (the first proposal counts).
    #[arg(long, default_value_t = DEFAULT_MAX_REVIEW_CYCLES)]
    max_review_cycles: u32,

    /// Model used by every role agent.
    #[arg(long, env = "OCTOPILOT_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Default log filter; `RUST_LOG` takes precedence when set.
    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Append token usage totals to the posted report.
    #[arg(long)]
    token_summary: bool,

    #[arg(long, env = "GITHUB_API_URL", default_value = github::DEFAULT_API_URL)]
    github_api_url: String,

    #[arg(long, env = "ANTHROPIC_BASE_URL", default_value = llm::DEFAULT_BASE_URL)]
    anthropic_base_url: String,

    /// OTLP gRPC endpoint for span export.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Observability
// ---------------------------------------------------------------------------

fn otel_provider(endpoint: &str) -> Result<opentelemetry_sdk::trace::TracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .context("failed to build the OTLP span exporter")?;
    Ok(opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_resource(opentelemetry_sdk::Resource::new(vec![opentelemetry::KeyValue::new(
            "service.name",
            SERVICE_NAME,
        )]))
        .build())
}

/// Installs the global subscriber. Returns `true` when OTLP export is active.
fn init_tracing(cli: &Cli) -> Result<bool> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .with_context(|| format!("invalid log level '{}'", cli.log_level))?;

    let otel_layer = match cli.otlp_endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
        Some(endpoint) => {
            let provider = otel_provider(endpoint)?;
            let tracer = provider.tracer(SERVICE_NAME);
            opentelemetry::global::set_tracer_provider(provider);
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };
    let exporting = otel_layer.is_some();

    let registry = tracing_subscriber::registry().with(otel_layer).with(filter);
    match cli.log_format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    }
    .context("failed to install the tracing subscriber")?;
    Ok(exporting)
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

fn run_config(cli: &Cli) -> Result<RunConfig> {
    let model = ModelId::new(cli.model.as_str()).context("--model must not be empty")?;
    let config = RunConfig {
        max_review_cycles: cli.max_review_cycles,
        model,
        target_files: cli
            .target_files
            .as_deref()
            .map(RunConfig::parse_target_files)
            .unwrap_or_default(),
        show_token_summary: cli.token_summary,
    };
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<RunOutcome> {
    let config = run_config(&cli)?;
    let repository = resolve_repository(&cli.repo, cli.owner.as_deref())?;
    let issue = IssueNumber::new(cli.issue_number);

    let Some(api_key) = cli.anthropic_api_key.filter(|k| !k.trim().is_empty()) else {
        bail!("ANTHROPIC_API_KEY is not set");
    };
    if cli.github_token.as_deref().map_or(true, |t| t.trim().is_empty()) {
        warn!("GITHUB_TOKEN is not set; branch creation, commits and the report comment will fail");
    }

    let host = GithubClient::new(cli.github_api_url, cli.github_token)
        .context("failed to build the GitHub client")?;
    let runtime = AnthropicRuntime::new(api_key, cli.anthropic_base_url)
        .context("failed to build the Anthropic runtime")?;

    info!(
        repository = %repository,
        issue = %issue,
        model = %config.model,
        max_review_cycles = config.max_review_cycles,
        "Resolving issue"
    );
    let executor = PipelineExecutor::new(Arc::new(host), Arc::new(runtime), config);
    Ok(executor.run(repository, issue).await?)
}

fn exit_code(outcome: &RunOutcome) -> ExitCode {
    if outcome.final_stage == RunStage::Done && outcome.comment_posted {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let exporting = match init_tracing(&cli) {
        Ok(exporting) => exporting,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let code = match run(cli).await {
        Ok(outcome) => {
            println!("{}", outcome.report.render());
            info!(
                run_id = %outcome.run_id,
                stage = %outcome.final_stage,
                comment_posted = outcome.comment_posted,
                total_tokens = %outcome.usage.total(),
                "Run finished"
            );
            exit_code(&outcome)
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "Run failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    };

    if exporting {
        opentelemetry::global::shutdown_tracer_provider();
    }
    code
}

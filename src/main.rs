use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use fabric_reconciler::client::{resolve_endpoints, RestClient};
use fabric_reconciler::config::{ReconcileState, RunConfig};
use fabric_reconciler::controller::{ReconcileRequest, ReconciliationController};
use fabric_reconciler::kinds::kind_by_name;
use fabric_reconciler::Error;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile the fabric against a run file
    Run(RunArgs),
    /// Show controller objects matching the run file entries
    Query(QueryArgs),
    /// Show version and build information
    Version,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Run file (YAML)
    #[arg(long, short, env = "FABRIC_RECONCILER_CONFIG")]
    config: PathBuf,

    /// Override the fabric named in the run file
    #[arg(long, env = "FABRIC_NAME")]
    fabric: Option<String>,

    /// Override the state named in the run file
    #[arg(long)]
    state: Option<ReconcileState>,

    /// Compute changes without applying them
    #[arg(long, env = "CHECK_MODE")]
    check: bool,
}

#[derive(Parser, Debug)]
struct QueryArgs {
    /// Run file (YAML)
    #[arg(long, short, env = "FABRIC_RECONCILER_CONFIG")]
    config: PathBuf,

    /// Override the fabric named in the run file
    #[arg(long, env = "FABRIC_NAME")]
    fabric: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("fabric-reconciler v{}", env!("CARGO_PKG_VERSION"));
            println!("Build Date: {}", env!("BUILD_DATE"));
            println!("Git SHA: {}", env!("GIT_SHA"));
            Ok(())
        }
        Commands::Run(run_args) => {
            init_tracing(args.log_format);
            reconcile(
                run_args.config,
                run_args.fabric,
                run_args.state,
                run_args.check,
            )
            .await
        }
        Commands::Query(query_args) => {
            init_tracing(args.log_format);
            reconcile(
                query_args.config,
                query_args.fabric,
                Some(ReconcileState::Query),
                false,
            )
            .await
        }
    }
}

/// Logs go to stderr; stdout carries only the JSON outcome
fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init(),
    }
}

async fn reconcile(
    path: PathBuf,
    fabric: Option<String>,
    state: Option<ReconcileState>,
    check: bool,
) -> anyhow::Result<()> {
    let mut config = RunConfig::load(&path)
        .with_context(|| format!("failed to load run file {}", path.display()))?;
    if let Some(fabric) = fabric {
        config.fabric = fabric;
    }
    if let Some(state) = state {
        config.state = state;
    }
    config.validate()?;

    info!(
        "Starting fabric-reconciler v{} for {} in fabric {}",
        env!("CARGO_PKG_VERSION"),
        config.kind,
        config.fabric
    );

    let kind = kind_by_name(&config.kind)?;
    let client = RestClient::connect(&config.controller).await?;
    let endpoints = resolve_endpoints(&client, config.controller.version).await?;

    let request = ReconcileRequest::from_config(&config, check);
    let result = ReconciliationController::new(&client, endpoints.as_ref(), kind.as_ref())
        .run(request)
        .await;

    match result {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Err(e) => {
            report_failure(&e);
            Err(e.into())
        }
    }
}

fn report_failure(e: &Error) {
    error!(
        category = e.kind_label(),
        retriable = e.is_retriable(),
        "Reconciliation failed: {}",
        e
    );
}

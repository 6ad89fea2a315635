use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use migrator::migration::{wait_for_finish, JobStatus, LoggingEventHandler};
use migrator::services::client::{CredentialDescriptor, HttpClientFactory};
use migrator::services::config::MigrationConfig;
use migrator::services::store::MemoryStore;
use migrator::MigrationService;

#[derive(Parser, Debug)]
#[command(name = "migrate-worker")]
#[command(version, about = "Migrate one identity's data between identity servers", long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a single migration job and print its report as JSON
    Run {
        /// Credential descriptor JSON for the source identity
        #[arg(long)]
        export: PathBuf,

        /// Credential descriptor JSON for the destination identity
        #[arg(long)]
        import: PathBuf,
    },
}

fn read_descriptor(path: &Path) -> Result<CredentialDescriptor> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading descriptor {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing descriptor {}", path.display()))
}

async fn run_job(export: &Path, import: &Path) -> Result<ExitCode> {
    let config = MigrationConfig::from_env().context("loading configuration")?;
    let export = read_descriptor(export)?;
    let import = read_descriptor(import)?;

    let factory = Arc::new(HttpClientFactory::new(config.http.clone()));
    let service = MigrationService::new(Arc::new(MemoryStore::new()), factory, config);
    let logger = service.events().attach(LoggingEventHandler);
    let mut events = service.subscribe();

    let job_key = service.start_job(export, import).await?;
    info!("Started job {}", job_key);

    let status = match wait_for_finish(&mut events, &job_key).await {
        Some(status) => status,
        None => bail!("event stream closed before job {} finished", job_key),
    };

    let report = service
        .job_report(&job_key)
        .await?
        .with_context(|| format!("no report for job {}", job_key))?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    service.shutdown().await;
    logger.abort();

    Ok(match status {
        JobStatus::Finished => ExitCode::SUCCESS,
        _ => ExitCode::from(2),
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Run { export, import } => run_job(&export, &import).await,
    }
}

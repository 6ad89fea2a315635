//! Migration orchestrator - runs the stages of one job in order

use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, instrument};

use crate::migration::context::JobContext;
use crate::migration::progress::{EventBus, MigrationEvent};
use crate::migration::rewriter::EntityRewriter;
use crate::migration::steps::run_stage;
use crate::migration::types::{ExceptionRecord, JobStatus, Side, Stage};
use crate::services::client::{ClientFactory, CredentialDescriptor};
use crate::services::config::MigrationConfig;
use crate::services::errors::{ErrorSeverity, MigrationError, MigrationResult};
use crate::services::store::JobStateStore;

/// Executes migration jobs by key against the shared state store
pub struct MigrationJob {
    state: JobStateStore,
    factory: Arc<dyn ClientFactory>,
    config: MigrationConfig,
    events: EventBus,
}

impl MigrationJob {
    pub fn new(
        state: JobStateStore,
        factory: Arc<dyn ClientFactory>,
        config: MigrationConfig,
        events: EventBus,
    ) -> Self {
        Self {
            state,
            factory,
            config,
            events,
        }
    }

    /// Run a job to a terminal status, even when its state cannot be written
    pub async fn execute(&self, job_key: &str) -> JobStatus {
        match self.run(job_key).await {
            Ok(status) => status,
            Err(e) => {
                error!("[Migration] Job {} could not be finalized: {}", job_key, e);
                JobStatus::FinishedWithErrors
            }
        }
    }

    /// Run every stage, then finalize; errors only when the store is unusable
    ///
    /// A re-run under the same key starts from empty counters, id sets and
    /// exception log.
    #[instrument(skip(self), err)]
    pub async fn run(&self, job_key: &str) -> MigrationResult<JobStatus> {
        info!("[Migration] Starting job {}", job_key);
        self.state.reset_run(job_key).await?;
        self.state.set_status(job_key, JobStatus::Running).await?;
        self.state
            .set_stat(job_key, "started_at", chrono::Utc::now().timestamp())
            .await?;
        self.events.emit(MigrationEvent::JobStarted {
            job_key: job_key.to_string(),
        });

        let outcome = match self.build_context(job_key).await {
            Ok(ctx) => self.run_stages(&ctx).await,
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            error!("[Migration] Job {} aborted: {}", job_key, e);
            let record = ExceptionRecord::new(None, None, &e);
            if let Err(log_error) = self.state.log_exception(job_key, &record).await {
                error!(
                    "[Migration] Failed to record terminal exception for {}: {}",
                    job_key, log_error
                );
            }
        }

        self.finalize(job_key).await
    }

    async fn build_context(&self, job_key: &str) -> MigrationResult<JobContext> {
        let export = self.load_descriptor(job_key, Side::Export).await?;
        let import = self.load_descriptor(job_key, Side::Import).await?;

        info!(
            "[Migration] Job {}: {} -> {}",
            job_key, export.entity, import.entity
        );

        Ok(JobContext {
            job_key: job_key.to_string(),
            export: self.factory.connect(&export)?,
            import: self.factory.connect(&import)?,
            rewriter: EntityRewriter::new(export.entity, import.entity),
            pagination: self.config.pagination.clone(),
            state: self.state.clone(),
            events: self.events.clone(),
        })
    }

    async fn load_descriptor(
        &self,
        job_key: &str,
        side: Side,
    ) -> MigrationResult<CredentialDescriptor> {
        self.state
            .get_job_descriptor(job_key, side)
            .await?
            .ok_or_else(|| MigrationError::MissingCredentials {
                job_key: job_key.to_string(),
                side: side.to_string(),
            })
    }

    /// A failed stage is recorded and the next stage still runs
    async fn run_stages(&self, ctx: &JobContext) -> MigrationResult<()> {
        for stage in Stage::ORDER {
            info!("[Migration] Stage: {}", stage);
            self.events.emit(MigrationEvent::StageBegun {
                job_key: ctx.job_key.clone(),
                stage,
            });
            let started = Instant::now();

            match run_stage(ctx, stage).await {
                Ok(summary) => {
                    self.events.emit(MigrationEvent::StageCompleted {
                        job_key: ctx.job_key.clone(),
                        stage,
                        duration_ms: started.elapsed().as_millis() as u64,
                        imported: summary.imported,
                        failed: summary.failed,
                    });
                }
                // critical errors (store failures) end the job
                Err(e) if e.severity() == ErrorSeverity::Critical => return Err(e),
                Err(e) => {
                    error!("[Migration] Stage {} failed: {}", stage, e);
                    ctx.record_exception(Some(stage), None, &e).await?;
                    self.events.emit(MigrationEvent::StageFailed {
                        job_key: ctx.job_key.clone(),
                        stage,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    async fn finalize(&self, job_key: &str) -> MigrationResult<JobStatus> {
        self.state
            .set_stat(job_key, "finished_at", chrono::Utc::now().timestamp())
            .await?;

        let exceptions = self.state.get_exceptions(job_key).await?;
        let status = if exceptions.is_empty() {
            JobStatus::Finished
        } else {
            JobStatus::FinishedWithErrors
        };
        self.state.set_status(job_key, status).await?;
        self.state
            .expire_job(job_key, self.config.retention.job_data_ttl)
            .await?;

        info!(
            "[Migration] Job {} {} ({} exceptions)",
            job_key,
            status.as_str(),
            exceptions.len()
        );
        Ok(status)
    }
}

//! Job control surface: register credentials, start, inspect and delete jobs

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::migration::orchestrator::MigrationJob;
use crate::migration::progress::{EventBus, MigrationEvent};
use crate::migration::queue::JobQueue;
use crate::migration::types::{JobReport, JobStatus, ResourceKind, Side};
use crate::services::client::{AuthorizationResult, ClientFactory, CredentialDescriptor};
use crate::services::config::MigrationConfig;
use crate::services::errors::{MigrationError, MigrationResult};
use crate::services::store::{spawn_purger, JobStateStore, KeyValueStore};

/// New opaque job key: 32 random bytes, hex encoded
pub fn generate_job_key() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

pub struct MigrationService {
    state: JobStateStore,
    queue: JobQueue,
    events: EventBus,
    purger: JoinHandle<()>,
}

impl MigrationService {
    /// Build the service, start its job queue and the expired-key purge
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        factory: Arc<dyn ClientFactory>,
        config: MigrationConfig,
    ) -> Self {
        let purger = spawn_purger(store.clone(), config.retention.purge_interval);
        let state = JobStateStore::new(store);
        let events = EventBus::default();
        let queue_config = config.queue.clone();
        let job = Arc::new(MigrationJob::new(
            state.clone(),
            factory,
            config,
            events.clone(),
        ));
        let queue = JobQueue::start(job, &queue_config, events.clone());

        Self {
            state,
            queue,
            events,
            purger,
        }
    }

    /// Store the export-side credentials and open a new job for them
    #[instrument(skip(self, authorization), fields(entity = %authorization.entity), err)]
    pub async fn register_export_authorization(
        &self,
        authorization: AuthorizationResult,
    ) -> MigrationResult<String> {
        let job_key = generate_job_key();
        self.attach(&job_key, Side::Export, &authorization.into_descriptor())
            .await?;
        self.state.set_status(&job_key, JobStatus::NotStarted).await?;
        info!("[MigrationService] Opened job {}", job_key);
        Ok(job_key)
    }

    /// Store the import-side credentials and queue the job
    ///
    /// Returns `false` when the job is already queued or running.
    #[instrument(skip(self, authorization), fields(entity = %authorization.entity), err)]
    pub async fn register_import_authorization(
        &self,
        job_key: &str,
        authorization: AuthorizationResult,
    ) -> MigrationResult<bool> {
        if self
            .state
            .get_job_descriptor(job_key, Side::Export)
            .await?
            .is_none()
        {
            return Err(MigrationError::MissingCredentials {
                job_key: job_key.to_string(),
                side: Side::Export.to_string(),
            });
        }
        self.attach(job_key, Side::Import, &authorization.into_descriptor())
            .await?;
        self.queue.enqueue(job_key).await
    }

    /// Open and queue a job for a descriptor pair in one call
    #[instrument(skip_all, fields(export = %export.entity, import = %import.entity), err)]
    pub async fn start_job(
        &self,
        export: CredentialDescriptor,
        import: CredentialDescriptor,
    ) -> MigrationResult<String> {
        let job_key = generate_job_key();
        self.attach(&job_key, Side::Export, &export).await?;
        self.attach(&job_key, Side::Import, &import).await?;
        self.state.set_status(&job_key, JobStatus::NotStarted).await?;
        self.queue.enqueue(&job_key).await?;
        Ok(job_key)
    }

    async fn attach(
        &self,
        job_key: &str,
        side: Side,
        descriptor: &CredentialDescriptor,
    ) -> MigrationResult<()> {
        let descriptor_key = self.state.set_descriptor(side, descriptor).await?;
        self.state
            .link_descriptor(job_key, side, &descriptor_key)
            .await?;
        Ok(())
    }

    /// Counters, exception log and id-set sizes; `None` for unknown or expired jobs
    pub async fn job_report(&self, job_key: &str) -> MigrationResult<Option<JobReport>> {
        let status = match self.state.get_status(job_key).await? {
            Some(status) => status,
            None => return Ok(None),
        };

        let mut report = JobReport {
            job_key: job_key.to_string(),
            status,
            stats: self.state.get_stats(job_key).await?,
            exceptions: self.state.get_exceptions(job_key).await?,
            exported_ids: Default::default(),
            imported_ids: Default::default(),
        };
        for kind in ResourceKind::ALL {
            let exported = self.state.set_size(job_key, &kind.exported_set()).await?;
            let imported = self.state.set_size(job_key, &kind.imported_set()).await?;
            report.exported_ids.insert(kind.name().to_string(), exported);
            report.imported_ids.insert(kind.name().to_string(), imported);
        }
        Ok(Some(report))
    }

    /// Drop all state of a job now; an in-flight run is not interrupted
    pub async fn delete_job(&self, job_key: &str) -> MigrationResult<usize> {
        Ok(self.state.delete_job(job_key).await?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MigrationEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Drain the queue and stop the purge task
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
        self.purger.abort();
    }
}

impl Drop for MigrationService {
    fn drop(&mut self) {
        self.purger.abort();
    }
}

//! Job-scoped persisted state: credential descriptors, counters, id sets,
//! exception log and status, with bulk expiry per job key.
//!
//! Key layout for job key `J` and identity `E`:
//!
//! | key                      | kind   | contents                          |
//! |--------------------------|--------|-----------------------------------|
//! | `E-export_app`           | string | export-side descriptor JSON       |
//! | `E-import_app`           | string | import-side descriptor JSON       |
//! | `J-export`, `J-import`   | string | descriptor key for that side      |
//! | `J`                      | string | job status                        |
//! | `J-stats`                | hash   | counters and timestamps           |
//! | `J-exported_<kind>_ids`  | set    | exported item identifiers         |
//! | `J-imported_<kind>_ids`  | set    | imported item identifiers         |
//! | `J-exceptions`           | list   | `ExceptionRecord` JSON            |

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::traits::{KeyValueStore, StoreResult};
use crate::migration::types::{ExceptionRecord, JobStatus, ResourceKind, Side};
use crate::services::client::CredentialDescriptor;
use crate::services::errors::StoreError;

#[derive(Clone)]
pub struct JobStateStore {
    store: Arc<dyn KeyValueStore>,
}

impl JobStateStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn descriptor_key(side: Side, entity: &str) -> String {
        format!("{}-{}_app", entity, side.as_str())
    }

    fn job_side_key(job_key: &str, side: Side) -> String {
        format!("{}-{}", job_key, side.as_str())
    }

    fn stats_key(job_key: &str) -> String {
        format!("{}-stats", job_key)
    }

    fn set_key(job_key: &str, set_name: &str) -> String {
        format!("{}-{}", job_key, set_name)
    }

    fn exceptions_key(job_key: &str) -> String {
        format!("{}-exceptions", job_key)
    }

    /// Store a descriptor under its identity, overwriting any earlier one
    pub async fn set_descriptor(
        &self,
        side: Side,
        descriptor: &CredentialDescriptor,
    ) -> StoreResult<String> {
        let key = Self::descriptor_key(side, &descriptor.entity);
        let json = serde_json::to_string(descriptor)?;
        self.store.set(&key, &json).await?;
        debug!("[JobStateStore] Stored {} descriptor at {}", side, key);
        Ok(key)
    }

    pub async fn get_descriptor(
        &self,
        side: Side,
        entity: &str,
    ) -> StoreResult<Option<CredentialDescriptor>> {
        self.read_descriptor(&Self::descriptor_key(side, entity))
            .await
    }

    async fn read_descriptor(&self, key: &str) -> StoreResult<Option<CredentialDescriptor>> {
        match self.store.get(key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Point a job at a stored descriptor for one side
    pub async fn link_descriptor(
        &self,
        job_key: &str,
        side: Side,
        descriptor_key: &str,
    ) -> StoreResult<()> {
        self.store
            .set(&Self::job_side_key(job_key, side), descriptor_key)
            .await
    }

    pub async fn get_job_descriptor(
        &self,
        job_key: &str,
        side: Side,
    ) -> StoreResult<Option<CredentialDescriptor>> {
        match self.store.get(&Self::job_side_key(job_key, side)).await? {
            Some(descriptor_key) => self.read_descriptor(&descriptor_key).await,
            None => Ok(None),
        }
    }

    pub async fn set_status(&self, job_key: &str, status: JobStatus) -> StoreResult<()> {
        self.store.set(job_key, status.as_str()).await
    }

    /// `None` when the job is unknown or its data has expired
    pub async fn get_status(&self, job_key: &str) -> StoreResult<Option<JobStatus>> {
        match self.store.get(job_key).await? {
            Some(value) => Ok(Some(value.parse()?)),
            None => Ok(None),
        }
    }

    pub async fn set_stat(&self, job_key: &str, name: &str, value: i64) -> StoreResult<()> {
        self.store.hset(&Self::stats_key(job_key), name, value).await
    }

    pub async fn increment_stat(&self, job_key: &str, name: &str, by: i64) -> StoreResult<i64> {
        self.store
            .hincr_by(&Self::stats_key(job_key), name, by)
            .await
    }

    pub async fn get_stats(&self, job_key: &str) -> StoreResult<BTreeMap<String, i64>> {
        Ok(self
            .store
            .hget_all(&Self::stats_key(job_key))
            .await?
            .into_iter()
            .collect())
    }

    pub async fn add_to_set(&self, job_key: &str, set_name: &str, id: &str) -> StoreResult<bool> {
        self.store.sadd(&Self::set_key(job_key, set_name), id).await
    }

    pub async fn set_members(&self, job_key: &str, set_name: &str) -> StoreResult<Vec<String>> {
        self.store.smembers(&Self::set_key(job_key, set_name)).await
    }

    pub async fn set_size(&self, job_key: &str, set_name: &str) -> StoreResult<usize> {
        self.store.scard(&Self::set_key(job_key, set_name)).await
    }

    pub async fn log_exception(&self, job_key: &str, record: &ExceptionRecord) -> StoreResult<()> {
        let json = serde_json::to_string(record)?;
        self.store
            .rpush(&Self::exceptions_key(job_key), &json)
            .await?;
        Ok(())
    }

    pub async fn get_exceptions(&self, job_key: &str) -> StoreResult<Vec<ExceptionRecord>> {
        self.store
            .lrange(&Self::exceptions_key(job_key))
            .await?
            .iter()
            .map(|json| serde_json::from_str(json).map_err(StoreError::from))
            .collect()
    }

    /// Every key associated with a job, including the descriptors it links to
    /// Keys written by a single run: counters, id sets and the exception log
    fn run_keys(job_key: &str) -> Vec<String> {
        let mut keys = vec![Self::stats_key(job_key), Self::exceptions_key(job_key)];
        for kind in ResourceKind::ALL {
            keys.push(Self::set_key(job_key, &kind.exported_set()));
            keys.push(Self::set_key(job_key, &kind.imported_set()));
        }
        keys
    }

    async fn job_keys(&self, job_key: &str) -> StoreResult<Vec<String>> {
        let mut keys = vec![job_key.to_string()];

        for side in [Side::Export, Side::Import] {
            let side_key = Self::job_side_key(job_key, side);
            if let Some(descriptor_key) = self.store.get(&side_key).await? {
                keys.push(descriptor_key);
            }
            keys.push(side_key);
        }

        keys.extend(Self::run_keys(job_key));
        Ok(keys)
    }

    /// Forget the counters, id sets and exceptions of a previous run
    ///
    /// Status and credentials are kept so the job can run again under its key.
    pub async fn reset_run(&self, job_key: &str) -> StoreResult<usize> {
        let mut removed = 0;
        for key in Self::run_keys(job_key) {
            if self.store.del(&key).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("[JobStateStore] Cleared {} keys of the previous run of {}", removed, job_key);
        }
        Ok(removed)
    }

    /// Schedule every key of a job for expiry after `ttl`
    pub async fn expire_job(&self, job_key: &str, ttl: Duration) -> StoreResult<()> {
        let keys = self.job_keys(job_key).await?;
        for key in &keys {
            self.store.expire(key, ttl).await?;
        }
        info!(
            "[JobStateStore] Job {} data expires in {}s",
            job_key,
            ttl.as_secs()
        );
        Ok(())
    }

    /// Remove every key of a job immediately; returns how many existed
    pub async fn delete_job(&self, job_key: &str) -> StoreResult<usize> {
        let keys = self.job_keys(job_key).await?;
        let mut removed = 0;
        for key in &keys {
            if self.store.del(key).await? {
                removed += 1;
            }
        }
        info!("[JobStateStore] Deleted job {} ({} keys)", job_key, removed);
        Ok(removed)
    }
}

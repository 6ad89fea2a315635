//! Per-job execution context and the single boundary where item outcomes are
//! written to the job state store.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::migration::progress::{EventBus, MigrationEvent};
use crate::migration::rewriter::EntityRewriter;
use crate::migration::types::{ExceptionRecord, ItemOutcome, ResourceKind, SkipReason, Stage};
use crate::services::client::{ApiResponse, Collection, IdentityServerApi, ListParams, ResponseClass};
use crate::services::config::{CursorField, PaginationConfig};
use crate::services::errors::{MigrationError, MigrationResult};
use crate::services::store::JobStateStore;

/// Tally of what a stage did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageSummary {
    pub pages: usize,
    pub exported: usize,
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Everything one job execution needs, built once and passed to every stage
pub struct JobContext {
    pub job_key: String,
    pub export: Arc<dyn IdentityServerApi>,
    pub import: Arc<dyn IdentityServerApi>,
    pub rewriter: EntityRewriter,
    pub pagination: PaginationConfig,
    pub state: JobStateStore,
    pub events: EventBus,
}

impl JobContext {
    /// List parameters for the first page of a collection walk
    pub fn first_page_params(&self) -> ListParams {
        ListParams {
            limit: Some(self.pagination.page_size),
            secrets: Some(self.pagination.include_secrets),
            reverse: Some(self.pagination.cursor_field == CursorField::SinceId),
            ..Default::default()
        }
    }

    pub fn version_params(&self) -> ListParams {
        ListParams {
            limit: Some(self.pagination.version_page_size),
            secrets: Some(self.pagination.include_secrets),
            ..Default::default()
        }
    }

    /// Move the cursor past `last_id`
    pub fn advance(&self, params: &mut ListParams, last_id: String) {
        match self.pagination.cursor_field {
            CursorField::BeforeId => params.before_id = Some(last_id),
            CursorField::SinceId => params.since_id = Some(last_id),
        }
    }

    /// Count exported items and remember their identifiers
    pub async fn record_exported(&self, kind: ResourceKind, ids: &[String]) -> MigrationResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.state
            .increment_stat(&self.job_key, &kind.exported_counter(), ids.len() as i64)
            .await?;
        let set = kind.exported_set();
        for id in ids {
            self.state.add_to_set(&self.job_key, &set, id).await?;
        }
        Ok(())
    }

    /// Persist the outcome of one item import
    ///
    /// Only store failures propagate; a failed item is logged and recorded.
    pub async fn record_outcome(
        &self,
        stage: Stage,
        kind: ResourceKind,
        item_id: &str,
        outcome: ItemOutcome,
        summary: &mut StageSummary,
    ) -> MigrationResult<()> {
        match outcome {
            ItemOutcome::Imported => {
                self.state
                    .increment_stat(&self.job_key, &kind.imported_counter(), 1)
                    .await?;
                self.state
                    .add_to_set(&self.job_key, &kind.imported_set(), item_id)
                    .await?;
                summary.imported += 1;
            }
            ItemOutcome::Skipped(reason) => {
                debug!("[{}] Skipped {} {}: {:?}", stage, kind, item_id, reason);
                summary.skipped += 1;
            }
            ItemOutcome::Failed(error) => {
                warn!("[{}] Failed to import {} {}: {}", stage, kind, item_id, error);
                self.record_exception(Some(stage), Some(item_id), &error)
                    .await?;
                self.events.emit(MigrationEvent::ItemFailed {
                    job_key: self.job_key.clone(),
                    stage,
                    item_id: item_id.to_string(),
                    error: error.to_string(),
                });
                summary.failed += 1;
            }
        }
        Ok(())
    }

    /// Record an item that could not be identified at all
    pub async fn record_unidentified(
        &self,
        stage: Stage,
        kind: ResourceKind,
        summary: &mut StageSummary,
    ) -> MigrationResult<()> {
        let error = MigrationError::malformed(kind.name(), "item has no id");
        warn!("[{}] {}", stage, error);
        self.record_exception(Some(stage), None, &error).await?;
        summary.failed += 1;
        Ok(())
    }

    pub async fn record_exception(
        &self,
        stage: Option<Stage>,
        item_id: Option<&str>,
        error: &MigrationError,
    ) -> MigrationResult<()> {
        let record = ExceptionRecord::new(stage, item_id, error);
        self.state.log_exception(&self.job_key, &record).await?;
        Ok(())
    }

    /// Store the remote total for a collection; informational only
    pub async fn record_total(&self, kind: ResourceKind, collection: Collection) -> MigrationResult<()> {
        let response = match self.export.count(collection).await {
            Ok(response) => response,
            Err(e) => {
                warn!("[{}] Count request failed: {}", kind, e);
                return Ok(());
            }
        };
        if !response.is_success() {
            debug!("[{}] Count returned {}", kind, response.status);
            return Ok(());
        }
        let total = match &response.body {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        if let Some(total) = total {
            self.state
                .set_stat(&self.job_key, &kind.total_counter(), total)
                .await?;
        }
        Ok(())
    }
}

/// Identifier of a remote item; numeric ids are rendered as strings
pub fn item_id(item: &Value) -> Option<String> {
    match item.get("id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Map a create/update response to an item outcome
pub fn create_outcome(operation: &str, response: &ApiResponse) -> ItemOutcome {
    match response.class() {
        ResponseClass::Success => ItemOutcome::Imported,
        ResponseClass::Conflict => ItemOutcome::Skipped(SkipReason::AlreadyPresent),
        ResponseClass::NotFound => ItemOutcome::Skipped(SkipReason::NotFound),
        ResponseClass::HardError => ItemOutcome::Failed(MigrationError::hard_remote(
            operation,
            response.status,
            &response.body,
        )),
        ResponseClass::Other => ItemOutcome::Skipped(SkipReason::NotAccepted {
            status: response.status,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_id_accepts_strings_and_numbers() {
        assert_eq!(item_id(&json!({"id": "abc"})), Some("abc".to_string()));
        assert_eq!(item_id(&json!({"id": 42})), Some("42".to_string()));
        assert_eq!(item_id(&json!({"id": ""})), None);
        assert_eq!(item_id(&json!({"name": "x"})), None);
    }

    #[test]
    fn test_create_outcome_classification() {
        let ok = create_outcome("create", &ApiResponse::new(200, json!({})));
        assert!(ok.is_imported());

        let conflict = create_outcome("create", &ApiResponse::new(409, json!({})));
        assert!(matches!(
            conflict,
            ItemOutcome::Skipped(SkipReason::AlreadyPresent)
        ));

        let hard = create_outcome("create", &ApiResponse::new(400, json!({"error": "bad"})));
        assert!(matches!(hard, ItemOutcome::Failed(e) if e.is_hard_remote()));

        let server = create_outcome("create", &ApiResponse::new(503, Value::Null));
        assert!(matches!(
            server,
            ItemOutcome::Skipped(SkipReason::NotAccepted { status: 503 })
        ));
    }
}

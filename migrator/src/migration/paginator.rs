//! Cursor-based draining of a remote collection
//!
//! A [`PageSource`] knows how to fetch one page and import one item of a
//! resource type. [`paginate`] walks the collection with a fixed page size,
//! advancing the cursor to the id of the last item of each page, and stops on
//! the first empty page or when the source reports a benign end. Per-item
//! failures are recorded and skipped; a hard error while fetching a page ends
//! the walk with that error.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::migration::context::{item_id, JobContext, StageSummary};
use crate::migration::types::{ItemOutcome, ResourceKind, Stage};
use crate::services::client::{ApiResponse, ListParams, ResponseClass};
use crate::services::errors::{MigrationError, MigrationResult};

#[async_trait]
pub trait PageSource: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Fetch one page; `Ok(None)` means there is nothing (more) to fetch
    async fn fetch_page(&self, params: &ListParams) -> MigrationResult<Option<Vec<Value>>>;

    /// Items this resource type does not migrate are dropped before counting
    fn is_exportable(&self, _item: &Value) -> bool {
        true
    }

    async fn import_item(&self, item_id: &str, item: Value) -> ItemOutcome;
}

/// Interpret a list response as a page of items
pub fn page_from_response(
    operation: &str,
    response: ApiResponse,
) -> MigrationResult<Option<Vec<Value>>> {
    match response.class() {
        ResponseClass::Success => match response.body {
            Value::Array(items) => Ok(Some(items)),
            Value::Null => Ok(None),
            other => Err(MigrationError::malformed(
                operation,
                format!("expected a list, got {}", other),
            )),
        },
        ResponseClass::HardError => Err(MigrationError::hard_remote(
            operation,
            response.status,
            &response.body,
        )),
        _ => {
            debug!(
                "[Paginator] {} returned {}, treating as end",
                operation, response.status
            );
            Ok(None)
        }
    }
}

/// Import a batch of already-fetched items through the recording boundary
pub async fn import_items<S>(
    ctx: &JobContext,
    stage: Stage,
    source: &S,
    items: Vec<Value>,
    summary: &mut StageSummary,
) -> MigrationResult<()>
where
    S: PageSource + ?Sized,
{
    let kind = source.kind();
    let items: Vec<Value> = items
        .into_iter()
        .filter(|item| source.is_exportable(item))
        .collect();

    let mut identified = Vec::with_capacity(items.len());
    for item in items {
        match item_id(&item) {
            Some(id) => identified.push((id, item)),
            None => ctx.record_unidentified(stage, kind, summary).await?,
        }
    }

    let ids: Vec<String> = identified.iter().map(|(id, _)| id.clone()).collect();
    ctx.record_exported(kind, &ids).await?;
    summary.exported += ids.len();

    for (id, item) in identified {
        let outcome = source.import_item(&id, item).await;
        ctx.record_outcome(stage, kind, &id, outcome, summary)
            .await?;
    }
    Ok(())
}

/// Drain a paginated collection, importing every exportable item
pub async fn paginate<S>(ctx: &JobContext, stage: Stage, source: &S) -> MigrationResult<StageSummary>
where
    S: PageSource + ?Sized,
{
    let kind = source.kind();
    let mut params = ctx.first_page_params();
    let mut summary = StageSummary::default();
    let mut previous: Option<String> = None;

    loop {
        let page = match source.fetch_page(&params).await? {
            Some(page) if !page.is_empty() => page,
            _ => break,
        };
        summary.pages += 1;

        let cursor = page.last().and_then(item_id);
        debug!(
            "[Paginator] {} page {} with {} items",
            kind,
            summary.pages,
            page.len()
        );

        import_items(ctx, stage, source, page, &mut summary).await?;

        match cursor {
            Some(last_id) if previous.as_ref() == Some(&last_id) => {
                return Err(MigrationError::malformed(
                    kind.name(),
                    format!("page ended on {} again; cursor is not advancing", last_id),
                ))
            }
            Some(last_id) => {
                ctx.advance(&mut params, last_id.clone());
                previous = Some(last_id);
            }
            None => {
                return Err(MigrationError::malformed(
                    kind.name(),
                    "last item of page has no id; cannot advance cursor",
                ))
            }
        }
    }

    info!(
        "[Paginator] {} drained: {} pages, {} exported, {} imported, {} skipped, {} failed",
        kind, summary.pages, summary.exported, summary.imported, summary.skipped, summary.failed
    );
    Ok(summary)
}

//! Post migration with version history
//!
//! Each post's versions are fetched (one page only), ordered newest first,
//! rewritten to the destination identity and created in that order. A post
//! without a usable version list is created from its single body.

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Reverse;
use tracing::{debug, instrument};

use crate::migration::context::{create_outcome, JobContext, StageSummary};
use crate::migration::paginator::{page_from_response, paginate, PageSource};
use crate::migration::rewriter::PostItem;
use crate::migration::types::{ItemOutcome, ResourceKind, SkipReason, Stage};
use crate::services::client::{Collection, ListParams, ResponseClass};
use crate::services::errors::{MigrationError, MigrationResult};

/// Post types derived from other resources or marking deletions
pub const NON_MIGRATED_POST_PREFIXES: [&str; 5] = [
    "https://tent.io/types/post/group/",
    "https://tent.io/types/post/following/",
    "https://tent.io/types/post/follower/",
    "https://tent.io/types/post/profile/",
    "https://tent.io/types/post/delete/",
];

pub struct PostMigrator<'a> {
    ctx: &'a JobContext,
}

impl<'a> PostMigrator<'a> {
    pub fn new(ctx: &'a JobContext) -> Self {
        Self { ctx }
    }

    async fn fetch_versions(&self, post_id: &str) -> MigrationResult<Option<Vec<PostItem>>> {
        let response = self
            .ctx
            .export
            .list_post_versions(post_id, &self.ctx.version_params())
            .await?;

        match response.class() {
            ResponseClass::Success => match response.body {
                Value::Array(versions) if !versions.is_empty() => versions
                    .into_iter()
                    .map(PostItem::from_value)
                    .collect::<MigrationResult<Vec<_>>>()
                    .map(Some),
                _ => Ok(None),
            },
            ResponseClass::HardError => Err(MigrationError::hard_remote(
                "list post versions",
                response.status,
                &response.body,
            )),
            _ => Ok(None),
        }
    }

    async fn create_version(&self, mut post: PostItem) -> MigrationResult<ItemOutcome> {
        self.ctx.rewriter.rewrite(&mut post);
        let body = post.into_value()?;
        let response = self.ctx.import.create(Collection::Posts, &body).await?;
        Ok(create_outcome("create post", &response))
    }

    async fn import_post(&self, post_id: &str, item: Value) -> MigrationResult<ItemOutcome> {
        let post = PostItem::from_value(item)?;

        let mut versions = match self.fetch_versions(post_id).await? {
            Some(versions) => versions,
            None => {
                debug!("[PostMigrator] No versions for {}, importing single body", post_id);
                return self.create_version(post).await;
            }
        };
        versions.sort_by_key(|version| Reverse(version.version.flatten().unwrap_or(0)));

        let mut imported = false;
        let mut not_accepted = None;
        for version in versions {
            match self.create_version(version).await? {
                ItemOutcome::Imported => imported = true,
                ItemOutcome::Skipped(SkipReason::AlreadyPresent) => {}
                ItemOutcome::Skipped(reason) => {
                    not_accepted.get_or_insert(reason);
                }
                failed @ ItemOutcome::Failed(_) => return Ok(failed),
            }
        }

        Ok(if imported {
            ItemOutcome::Imported
        } else {
            ItemOutcome::Skipped(not_accepted.unwrap_or(SkipReason::AlreadyPresent))
        })
    }
}

#[async_trait]
impl<'a> PageSource for PostMigrator<'a> {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Posts
    }

    async fn fetch_page(&self, params: &ListParams) -> MigrationResult<Option<Vec<Value>>> {
        let response = self.ctx.export.list(Collection::Posts, params).await?;
        page_from_response("list posts", response)
    }

    fn is_exportable(&self, item: &Value) -> bool {
        match item.get("type").and_then(Value::as_str) {
            Some(post_type) => !NON_MIGRATED_POST_PREFIXES
                .iter()
                .any(|prefix| post_type.starts_with(prefix)),
            None => true,
        }
    }

    async fn import_item(&self, item_id: &str, item: Value) -> ItemOutcome {
        match self.import_post(item_id, item).await {
            Ok(outcome) => outcome,
            Err(e) => ItemOutcome::Failed(e),
        }
    }
}

#[instrument(skip(ctx), fields(job_key = %ctx.job_key), err)]
pub async fn migrate_posts(ctx: &JobContext) -> MigrationResult<StageSummary> {
    ctx.record_total(ResourceKind::Posts, Collection::Posts)
        .await?;
    paginate(ctx, Stage::Posts, &PostMigrator::new(ctx)).await
}

//! Groups, followers and followings: paginated and created as-is

use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;

use crate::migration::context::{create_outcome, JobContext, StageSummary};
use crate::migration::paginator::{page_from_response, paginate, PageSource};
use crate::migration::types::{ItemOutcome, ResourceKind, Stage};
use crate::services::client::{ApiResponse, Collection, ListParams};
use crate::services::errors::{MigrationError, MigrationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Groups,
    Followers,
    Followings,
}

impl RelationKind {
    pub fn collection(&self) -> Collection {
        match self {
            RelationKind::Groups => Collection::Groups,
            RelationKind::Followers => Collection::Followers,
            RelationKind::Followings => Collection::Followings,
        }
    }

    pub fn resource(&self) -> ResourceKind {
        match self {
            RelationKind::Groups => ResourceKind::Groups,
            RelationKind::Followers => ResourceKind::Followers,
            RelationKind::Followings => ResourceKind::Followings,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            RelationKind::Groups => Stage::Groups,
            RelationKind::Followers => Stage::Followers,
            RelationKind::Followings => Stage::Followings,
        }
    }
}

pub struct RelationMigrator<'a> {
    ctx: &'a JobContext,
    relation: RelationKind,
}

impl<'a> RelationMigrator<'a> {
    pub fn new(ctx: &'a JobContext, relation: RelationKind) -> Self {
        Self { ctx, relation }
    }

    async fn create(&self, item: &Value) -> MigrationResult<ApiResponse> {
        let import = &self.ctx.import;
        let response = match self.relation {
            RelationKind::Followings => {
                // Followings are routed by the followed entity
                let entity = item
                    .get("entity")
                    .and_then(Value::as_str)
                    .ok_or_else(|| MigrationError::malformed("following", "missing entity"))?;
                import.create_following(entity, item).await?
            }
            relation => import.create(relation.collection(), item).await?,
        };
        Ok(response)
    }
}

#[async_trait]
impl<'a> PageSource for RelationMigrator<'a> {
    fn kind(&self) -> ResourceKind {
        self.relation.resource()
    }

    async fn fetch_page(&self, params: &ListParams) -> MigrationResult<Option<Vec<Value>>> {
        let collection = self.relation.collection();
        let response = self.ctx.export.list(collection, params).await?;
        page_from_response(&format!("list {}", collection.path()), response)
    }

    async fn import_item(&self, _item_id: &str, item: Value) -> ItemOutcome {
        let operation = format!("create {}", self.relation.collection().path());
        match self.create(&item).await {
            Ok(response) => create_outcome(&operation, &response),
            Err(e) => ItemOutcome::Failed(e),
        }
    }
}

#[instrument(skip(ctx), fields(job_key = %ctx.job_key), err)]
pub async fn migrate_relation(
    ctx: &JobContext,
    relation: RelationKind,
) -> MigrationResult<StageSummary> {
    ctx.record_total(relation.resource(), relation.collection())
        .await?;
    let migrator = RelationMigrator::new(ctx, relation);
    paginate(ctx, relation.stage(), &migrator).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::testing::{context_with, FakeServer};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_followings_routed_by_entity() {
        let export = Arc::new(FakeServer::new("https://a.example"));
        let import = Arc::new(FakeServer::new("https://b.example"));
        export.seed(
            Collection::Followings,
            vec![
                json!({"id": "f1", "entity": "https://carol.example", "groups": []}),
                json!({"id": "f2"}),
            ],
        );
        let ctx = context_with(export, import.clone(), 10);

        let summary = migrate_relation(&ctx, RelationKind::Followings)
            .await
            .unwrap();

        assert_eq!(summary.imported, 1);
        assert_eq!(summary.failed, 1);
        let created = import.created("create:followings");
        assert_eq!(created.len(), 1);
        assert_eq!(created[0]["entity"], "https://carol.example");

        let stats = ctx.state.get_stats(&ctx.job_key).await.unwrap();
        assert_eq!(stats.get("total_followings_count"), Some(&2));
        assert_eq!(stats.get("exported_followings_count"), Some(&2));
    }

    #[tokio::test]
    async fn test_groups_created_as_is() {
        let export = Arc::new(FakeServer::new("https://a.example"));
        let import = Arc::new(FakeServer::new("https://b.example"));
        let group = json!({"id": "g1", "name": "Friends", "created_at": 1_350_000_000});
        export.seed(Collection::Groups, vec![group.clone()]);
        let ctx = context_with(export, import.clone(), 10);

        migrate_relation(&ctx, RelationKind::Groups).await.unwrap();

        assert_eq!(import.created("create:groups"), vec![group]);
    }

    #[tokio::test]
    async fn test_list_hard_error_fails_stage() {
        let export = Arc::new(FakeServer::new("https://a.example"));
        let import = Arc::new(FakeServer::new("https://b.example"));
        export.script("list:followers", &[403]);
        let ctx = context_with(export, import, 10);

        let result = migrate_relation(&ctx, RelationKind::Followers).await;
        assert!(matches!(result, Err(e) if e.is_hard_remote()));
    }
}

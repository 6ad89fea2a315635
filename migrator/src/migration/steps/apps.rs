//! Application migration with their authorization grants

use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::migration::context::{create_outcome, item_id, JobContext, StageSummary};
use crate::migration::paginator::page_from_response;
use crate::migration::types::{ItemOutcome, ResourceKind, SkipReason, Stage};
use crate::services::client::{Collection, ListParams};
use crate::services::errors::MigrationResult;

/// Status the reference server returns when the app already exists
const APP_EXISTS_STATUS: u16 = 422;

#[instrument(skip(ctx), fields(job_key = %ctx.job_key), err)]
pub async fn migrate_apps(ctx: &JobContext) -> MigrationResult<StageSummary> {
    let mut summary = StageSummary::default();

    let params = ListParams {
        secrets: Some(ctx.pagination.include_secrets),
        ..Default::default()
    };
    let response = ctx.export.list(Collection::Apps, &params).await?;
    let apps = match page_from_response("list apps", response)? {
        Some(apps) => apps,
        None => {
            info!("[AppMigrator] No apps to migrate");
            return Ok(summary);
        }
    };
    summary.pages = 1;

    let mut identified = Vec::with_capacity(apps.len());
    for app in apps {
        match item_id(&app) {
            Some(id) => identified.push((id, app)),
            None => {
                ctx.record_unidentified(Stage::Apps, ResourceKind::Apps, &mut summary)
                    .await?
            }
        }
    }

    let ids: Vec<String> = identified.iter().map(|(id, _)| id.clone()).collect();
    ctx.record_exported(ResourceKind::Apps, &ids).await?;
    summary.exported = ids.len();

    for (app_id, app) in identified {
        migrate_app(ctx, &app_id, app, &mut summary).await?;
    }

    info!(
        "[AppMigrator] {} of {} apps imported",
        summary.imported, summary.exported
    );
    Ok(summary)
}

async fn migrate_app(
    ctx: &JobContext,
    app_id: &str,
    mut app: Value,
    summary: &mut StageSummary,
) -> MigrationResult<()> {
    let authorizations = match app.as_object_mut().and_then(|a| a.remove("authorizations")) {
        Some(Value::Array(authorizations)) => authorizations,
        _ => Vec::new(),
    };

    let outcome = match ctx.import.create(Collection::Apps, &app).await {
        Ok(response) if response.status == APP_EXISTS_STATUS => {
            ItemOutcome::Skipped(SkipReason::AlreadyPresent)
        }
        Ok(response) => create_outcome("create app", &response),
        Err(e) => ItemOutcome::Failed(e.into()),
    };
    let created = outcome.is_imported();
    ctx.record_outcome(Stage::Apps, ResourceKind::Apps, app_id, outcome, summary)
        .await?;

    if !created {
        debug!(
            "[AppMigrator] App {} not created, skipping {} authorizations",
            app_id,
            authorizations.len()
        );
        return Ok(());
    }

    migrate_authorizations(ctx, app_id, authorizations).await
}

async fn migrate_authorizations(
    ctx: &JobContext,
    app_id: &str,
    authorizations: Vec<Value>,
) -> MigrationResult<()> {
    let kind = ResourceKind::AppAuthorizations;
    // Grants are tallied apart from the app stage summary
    let mut grants = StageSummary::default();

    let identified: Vec<(String, Value)> = authorizations
        .into_iter()
        .enumerate()
        .map(|(index, authorization)| {
            let id = item_id(&authorization).unwrap_or_else(|| format!("{}#{}", app_id, index));
            (id, authorization)
        })
        .collect();

    let ids: Vec<String> = identified.iter().map(|(id, _)| id.clone()).collect();
    ctx.record_exported(kind, &ids).await?;

    for (id, authorization) in identified {
        let outcome = match ctx
            .import
            .create_app_authorization(app_id, &authorization)
            .await
        {
            Ok(response) => create_outcome("create app authorization", &response),
            Err(e) => ItemOutcome::Failed(e.into()),
        };
        ctx.record_outcome(Stage::Apps, kind, &id, outcome, &mut grants)
            .await?;
    }

    debug!(
        "[AppMigrator] App {}: {} authorizations imported, {} failed",
        app_id, grants.imported, grants.failed
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::testing::{context_with, FakeServer};
    use serde_json::json;
    use std::sync::Arc;

    fn app(id: &str, authorizations: Value) -> Value {
        json!({
            "id": id,
            "name": format!("App {}", id),
            "mac_key_id": format!("{}-key", id),
            "authorizations": authorizations
        })
    }

    #[tokio::test]
    async fn test_app_created_then_authorizations() {
        let export = Arc::new(FakeServer::new("https://a.example"));
        let import = Arc::new(FakeServer::new("https://b.example"));
        export.seed(
            Collection::Apps,
            vec![app(
                "app1",
                json!([{"id": "auth1", "scopes": ["read_posts"]}, {"scopes": ["write_posts"]}]),
            )],
        );
        let ctx = context_with(export, import.clone(), 10);

        let summary = migrate_apps(&ctx).await.unwrap();
        assert_eq!(summary.imported, 1);

        let created = import.created("create:apps");
        assert_eq!(created.len(), 1);
        assert!(created[0].get("authorizations").is_none());

        let grants = import.created("create:apps/app1/authorizations");
        assert_eq!(grants.len(), 2);

        let members = ctx
            .state
            .set_members(&ctx.job_key, "imported_app_authorizations_ids")
            .await
            .unwrap();
        assert_eq!(members, vec!["app1#1", "auth1"]);
    }

    #[tokio::test]
    async fn test_existing_app_is_skipped_without_exception() {
        let export = Arc::new(FakeServer::new("https://a.example"));
        let import = Arc::new(FakeServer::new("https://b.example"));
        export.seed(
            Collection::Apps,
            vec![
                app("app1", json!([{"id": "auth1"}])),
                app("app2", json!([])),
            ],
        );
        import.script("create:apps", &[APP_EXISTS_STATUS]);
        let ctx = context_with(export, import.clone(), 10);

        let summary = migrate_apps(&ctx).await.unwrap();

        assert_eq!(summary.exported, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.imported, 1);
        assert!(import.created("create:apps/app1/authorizations").is_empty());
        assert!(ctx.state.get_exceptions(&ctx.job_key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_grant_does_not_undo_app() {
        let export = Arc::new(FakeServer::new("https://a.example"));
        let import = Arc::new(FakeServer::new("https://b.example"));
        export.seed(
            Collection::Apps,
            vec![app("app1", json!([{"id": "auth1"}, {"id": "auth2"}]))],
        );
        import.script("create:apps/app1/authorizations", &[400]);
        let ctx = context_with(export, import.clone(), 10);

        migrate_apps(&ctx).await.unwrap();

        let stats = ctx.state.get_stats(&ctx.job_key).await.unwrap();
        assert_eq!(stats.get("imported_apps_count"), Some(&1));
        assert_eq!(stats.get("exported_app_authorizations_count"), Some(&2));
        assert_eq!(stats.get("imported_app_authorizations_count"), Some(&1));

        let exceptions = ctx.state.get_exceptions(&ctx.job_key).await.unwrap();
        assert_eq!(exceptions.len(), 1);
        assert_eq!(exceptions[0].item_id.as_deref(), Some("auth1"));
    }
}

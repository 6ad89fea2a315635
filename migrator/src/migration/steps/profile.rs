//! Profile migration: every info type except core is pushed with an update

use serde_json::Value;
use tracing::{info, instrument};

use crate::migration::context::{create_outcome, JobContext, StageSummary};
use crate::migration::types::{ItemOutcome, ResourceKind, Stage};
use crate::services::client::ResponseClass;
use crate::services::errors::{MigrationError, MigrationResult};

/// The protocol's own core info type; owned by the server, never migrated
pub const CORE_INFO_PREFIX: &str = "https://tent.io/types/info/core/";

#[instrument(skip(ctx), fields(job_key = %ctx.job_key), err)]
pub async fn migrate_profile(ctx: &JobContext) -> MigrationResult<StageSummary> {
    let kind = ResourceKind::ProfileInfos;
    let mut summary = StageSummary::default();

    let response = ctx.export.get_profile().await?;
    match response.class() {
        ResponseClass::Success => {}
        ResponseClass::HardError => {
            return Err(MigrationError::hard_remote(
                "get profile",
                response.status,
                &response.body,
            ))
        }
        _ => {
            info!("[ProfileMigrator] No profile to migrate ({})", response.status);
            return Ok(summary);
        }
    }

    let infos = match response.body {
        Value::Object(infos) => infos,
        other => {
            return Err(MigrationError::malformed(
                "profile",
                format!("expected an object of info types, got {}", other),
            ))
        }
    };

    let infos: Vec<(String, Value)> = infos
        .into_iter()
        .filter(|(info_type, _)| !info_type.starts_with(CORE_INFO_PREFIX))
        .collect();
    summary.pages = 1;

    let ids: Vec<String> = infos.iter().map(|(info_type, _)| info_type.clone()).collect();
    ctx.record_exported(kind, &ids).await?;
    summary.exported = ids.len();

    for (info_type, data) in infos {
        let outcome = match ctx.import.update_profile(&info_type, &data).await {
            Ok(response) => create_outcome("update profile", &response),
            Err(e) => ItemOutcome::Failed(e.into()),
        };
        ctx.record_outcome(Stage::Profile, kind, &info_type, outcome, &mut summary)
            .await?;
    }

    info!(
        "[ProfileMigrator] {} of {} info types imported",
        summary.imported, summary.exported
    );
    Ok(summary)
}

pub mod apps;
pub mod posts;
pub mod profile;
pub mod relations;

use crate::migration::context::{JobContext, StageSummary};
use crate::migration::types::Stage;
use crate::services::errors::MigrationResult;

use relations::RelationKind;

/// Run one pipeline stage to completion
pub async fn run_stage(ctx: &JobContext, stage: Stage) -> MigrationResult<StageSummary> {
    match stage {
        Stage::Profile => profile::migrate_profile(ctx).await,
        Stage::Groups => relations::migrate_relation(ctx, RelationKind::Groups).await,
        Stage::Followers => relations::migrate_relation(ctx, RelationKind::Followers).await,
        Stage::Followings => relations::migrate_relation(ctx, RelationKind::Followings).await,
        Stage::Apps => apps::migrate_apps(ctx).await,
        Stage::Posts => posts::migrate_posts(ctx).await,
    }
}

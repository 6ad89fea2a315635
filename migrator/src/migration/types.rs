//! Core data types for the migration pipeline

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::services::errors::{ErrorSeverity, MigrationError, StoreError};

/// Resource types whose progress is tracked per job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    ProfileInfos,
    Groups,
    Followers,
    Followings,
    Apps,
    AppAuthorizations,
    Posts,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::ProfileInfos,
        ResourceKind::Groups,
        ResourceKind::Followers,
        ResourceKind::Followings,
        ResourceKind::Apps,
        ResourceKind::AppAuthorizations,
        ResourceKind::Posts,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::ProfileInfos => "profile_infos",
            ResourceKind::Groups => "groups",
            ResourceKind::Followers => "followers",
            ResourceKind::Followings => "followings",
            ResourceKind::Apps => "apps",
            ResourceKind::AppAuthorizations => "app_authorizations",
            ResourceKind::Posts => "posts",
        }
    }

    pub fn exported_counter(&self) -> String {
        format!("exported_{}_count", self.name())
    }

    pub fn imported_counter(&self) -> String {
        format!("imported_{}_count", self.name())
    }

    pub fn total_counter(&self) -> String {
        format!("total_{}_count", self.name())
    }

    pub fn exported_set(&self) -> String {
        format!("exported_{}_ids", self.name())
    }

    pub fn imported_set(&self) -> String {
        format!("imported_{}_ids", self.name())
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which end of the migration a credential belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Export,
    Import,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Export => "export",
            Side::Import => "import",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job lifecycle as persisted in the state store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    NotStarted,
    Running,
    Finished,
    FinishedWithErrors,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::NotStarted => "not_started",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::FinishedWithErrors => "finished_with_errors",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::FinishedWithErrors)
    }
}

impl FromStr for JobStatus {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "not_started" => Ok(JobStatus::NotStarted),
            "running" => Ok(JobStatus::Running),
            "finished" => Ok(JobStatus::Finished),
            "finished_with_errors" => Ok(JobStatus::FinishedWithErrors),
            other => Err(StoreError::Serialization {
                message: format!("unknown job status '{}'", other),
            }),
        }
    }
}

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Profile,
    Groups,
    Followers,
    Followings,
    Apps,
    Posts,
}

impl Stage {
    /// Profile first, posts last; posts may reference any earlier resource
    pub const ORDER: [Stage; 6] = [
        Stage::Profile,
        Stage::Groups,
        Stage::Followers,
        Stage::Followings,
        Stage::Apps,
        Stage::Posts,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Profile => "profile",
            Stage::Groups => "groups",
            Stage::Followers => "followers",
            Stage::Followings => "followings",
            Stage::Apps => "apps",
            Stage::Posts => "posts",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why an item was not imported without that being a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Destination answered conflict; the item is already there
    AlreadyPresent,
    NotFound,
    /// Any other non-success status the pipeline ignores
    NotAccepted { status: u16 },
}

/// Result of importing one item
#[derive(Debug)]
pub enum ItemOutcome {
    Imported,
    Skipped(SkipReason),
    Failed(MigrationError),
}

impl ItemOutcome {
    pub fn is_imported(&self) -> bool {
        matches!(self, ItemOutcome::Imported)
    }
}

/// One recorded failure in a job's exception log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExceptionRecord {
    /// Stage the failure happened in; `None` for job-level failures
    pub stage: Option<String>,
    pub item_id: Option<String>,
    pub kind: String,
    pub severity: ErrorSeverity,
    pub message: String,
    /// Unix seconds
    pub recorded_at: i64,
}

impl ExceptionRecord {
    pub fn new(stage: Option<Stage>, item_id: Option<&str>, error: &MigrationError) -> Self {
        Self {
            stage: stage.map(|s| s.name().to_string()),
            item_id: item_id.map(String::from),
            kind: error.kind().to_string(),
            severity: error.severity(),
            message: error.to_string(),
            recorded_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Snapshot of a job's persisted state
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobReport {
    pub job_key: String,
    pub status: JobStatus,
    pub stats: BTreeMap<String, i64>,
    pub exceptions: Vec<ExceptionRecord>,
    /// Size of each exported-identifier set, by resource kind
    pub exported_ids: BTreeMap<String, usize>,
    /// Size of each imported-identifier set, by resource kind
    pub imported_ids: BTreeMap<String, usize>,
}

impl JobReport {
    pub fn stat(&self, name: &str) -> i64 {
        self.stats.get(name).copied().unwrap_or(0)
    }

    pub fn imported(&self, kind: ResourceKind) -> i64 {
        self.stat(&kind.imported_counter())
    }

    pub fn exported(&self, kind: ResourceKind) -> i64 {
        self.stat(&kind.exported_counter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_names() {
        assert_eq!(
            ResourceKind::Followers.exported_counter(),
            "exported_followers_count"
        );
        assert_eq!(ResourceKind::Apps.imported_counter(), "imported_apps_count");
        assert_eq!(ResourceKind::Posts.imported_set(), "imported_posts_ids");
        assert_eq!(ResourceKind::Posts.total_counter(), "total_posts_count");
    }

    #[test]
    fn test_stage_order_puts_posts_last() {
        assert_eq!(Stage::ORDER.first(), Some(&Stage::Profile));
        assert_eq!(Stage::ORDER.last(), Some(&Stage::Posts));
    }

    #[test]
    fn test_job_status_parse() {
        for status in [
            JobStatus::NotStarted,
            JobStatus::Running,
            JobStatus::Finished,
            JobStatus::FinishedWithErrors,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("done".parse::<JobStatus>().is_err());
        assert!(JobStatus::FinishedWithErrors.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn test_exception_record_from_error() {
        let err = MigrationError::malformed("post", "missing id");
        let record = ExceptionRecord::new(Some(Stage::Posts), Some("p1"), &err);
        assert_eq!(record.stage.as_deref(), Some("posts"));
        assert_eq!(record.item_id.as_deref(), Some("p1"));
        assert_eq!(record.kind, "malformed_item");
        assert_eq!(record.severity, ErrorSeverity::Low);
        assert_eq!(record.message, "Malformed post: missing id");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["severity"], "low");
    }
}

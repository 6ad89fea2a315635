use std::str::FromStr;
use std::time::Duration;

use crate::services::errors::{MigrationError, MigrationResult};

#[derive(Debug, Clone, Default)]
pub struct MigrationConfig {
    pub pagination: PaginationConfig,
    pub queue: QueueConfig,
    pub retention: RetentionConfig,
    pub http: HttpConfig,
}

/// Which list parameter carries the cursor between pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorField {
    /// Walk newest to oldest with `before_id`
    #[default]
    BeforeId,
    /// Walk oldest to newest with `since_id` and `reverse`
    SinceId,
}

impl FromStr for CursorField {
    type Err = MigrationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "before_id" => Ok(CursorField::BeforeId),
            "since_id" => Ok(CursorField::SinceId),
            other => Err(MigrationError::Configuration {
                field: "cursor_field".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaginationConfig {
    pub page_size: u32,
    /// Versions fetched per post; longer histories are truncated
    pub version_page_size: u32,
    pub cursor_field: CursorField,
    pub include_secrets: bool,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub worker_count: usize,
    pub capacity: usize,
}

#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub job_data_ttl: Duration,
    /// How often expired keys are swept from the store
    pub purge_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: 200,
            version_page_size: 200,
            cursor_field: CursorField::BeforeId,
            include_secrets: true,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            worker_count: 3,
            capacity: 256,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            job_data_ttl: Duration::from_secs(86_400 * 2), // 2 days
            purge_interval: Duration::from_secs(600),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: "entity-migration-worker/0.1".to_string(),
        }
    }
}

impl MigrationConfig {
    /// Load configuration from process environment variables
    pub fn from_env() -> MigrationResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> MigrationResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("MIGRATE_PAGE_SIZE") {
            config.pagination.page_size = parse_positive("MIGRATE_PAGE_SIZE", &value)?;
        }
        if let Some(value) = lookup("MIGRATE_VERSION_PAGE_SIZE") {
            config.pagination.version_page_size =
                parse_positive("MIGRATE_VERSION_PAGE_SIZE", &value)?;
        }
        if let Some(value) = lookup("MIGRATE_CURSOR_FIELD") {
            config.pagination.cursor_field = value.parse()?;
        }
        if let Some(value) = lookup("MIGRATE_WORKERS") {
            config.queue.worker_count = parse_positive("MIGRATE_WORKERS", &value)?;
        }
        if let Some(value) = lookup("MIGRATE_QUEUE_CAPACITY") {
            config.queue.capacity = parse_positive("MIGRATE_QUEUE_CAPACITY", &value)?;
        }
        if let Some(value) = lookup("MIGRATE_JOB_TTL_SECS") {
            config.retention.job_data_ttl =
                Duration::from_secs(parse_positive("MIGRATE_JOB_TTL_SECS", &value)?);
        }
        if let Some(value) = lookup("MIGRATE_PURGE_INTERVAL_SECS") {
            config.retention.purge_interval =
                Duration::from_secs(parse_positive("MIGRATE_PURGE_INTERVAL_SECS", &value)?);
        }
        if let Some(value) = lookup("MIGRATE_HTTP_TIMEOUT_SECS") {
            config.http.timeout =
                Duration::from_secs(parse_positive("MIGRATE_HTTP_TIMEOUT_SECS", &value)?);
        }

        Ok(config)
    }
}

fn parse_positive<T>(field: &str, value: &str) -> MigrationResult<T>
where
    T: FromStr + PartialOrd + Default,
{
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed > T::default() => Ok(parsed),
        _ => Err(MigrationError::Configuration {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}

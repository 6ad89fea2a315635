use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::client::ClientError;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Remote error: {operation} returned {status} - {body}")]
    HardRemote {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] ClientError),

    #[error("Malformed {kind}: {reason}")]
    MalformedItem { kind: String, reason: String },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Missing {side} credentials for job {job_key}")]
    MissingCredentials { job_key: String, side: String },

    #[error("Configuration error: {field} = {value}")]
    Configuration { field: String, value: String },

    #[error("Job queue is shut down; cannot enqueue {job_key}")]
    QueueClosed { job_key: String },
}

/// Errors raised by a key-value store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Key {key} holds a {found} value, expected {expected}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Serialization failed: {message}")]
    Serialization { message: String },
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization {
            message: err.to_string(),
        }
    }
}

pub type MigrationResult<T> = Result<T, MigrationError>;

impl MigrationError {
    pub fn hard_remote(operation: &str, status: u16, body: &serde_json::Value) -> Self {
        MigrationError::HardRemote {
            operation: operation.to_string(),
            status,
            body: body.to_string(),
        }
    }

    pub fn malformed(kind: &str, reason: impl Into<String>) -> Self {
        MigrationError::MalformedItem {
            kind: kind.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_hard_remote(&self) -> bool {
        matches!(self, MigrationError::HardRemote { .. })
    }

    /// Short stable label used in exception records
    pub fn kind(&self) -> &'static str {
        match self {
            MigrationError::HardRemote { .. } => "hard_remote",
            MigrationError::Transport(_) => "transport",
            MigrationError::MalformedItem { .. } => "malformed_item",
            MigrationError::Store(_) => "store",
            MigrationError::MissingCredentials { .. } => "missing_credentials",
            MigrationError::Configuration { .. } => "configuration",
            MigrationError::QueueClosed { .. } => "queue_closed",
        }
    }

    /// Severity recorded with each exception
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            MigrationError::Store(_) => ErrorSeverity::Critical,
            MigrationError::MissingCredentials { .. } => ErrorSeverity::Critical,
            MigrationError::Configuration { .. } => ErrorSeverity::High,
            MigrationError::QueueClosed { .. } => ErrorSeverity::High,
            MigrationError::Transport(_) => ErrorSeverity::Medium,
            MigrationError::HardRemote { .. } => ErrorSeverity::Medium,
            MigrationError::MalformedItem { .. } => ErrorSeverity::Low,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

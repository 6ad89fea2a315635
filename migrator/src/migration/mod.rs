//! Identity data migration pipeline
//!
//! Moves one user's profile, social graph, applications and posts from a
//! source identity server to a destination identity server as a background
//! job identified by an opaque key.
//!
//! # Architecture
//!
//! - **Paginator**: drains a remote collection page by page with a cursor
//! - **Rewriter**: swaps the source identity for the destination identity in posts
//! - **Steps**: one migrator per resource type, run in a fixed order
//! - **Orchestrator**: runs the steps for one job and finalizes its state
//! - **Queue**: dispatches job keys to a bounded set of concurrent runs
//! - **Service**: the control surface used to register, start, inspect and delete jobs
//!
//! # Usage
//!
//! ```rust,ignore
//! let service = MigrationService::new(store, Arc::new(HttpClientFactory::default()), config);
//! let mut events = service.subscribe();
//! let job_key = service.start_job(export, import).await?;
//! wait_for_finish(&mut events, &job_key).await;
//! let report = service.job_report(&job_key).await?;
//! ```

pub mod context;
pub mod orchestrator;
pub mod paginator;
pub mod progress;
pub mod queue;
pub mod rewriter;
pub mod service;
pub mod steps;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use orchestrator::MigrationJob;
pub use progress::*;
pub use queue::JobQueue;
pub use service::MigrationService;
pub use types::*;

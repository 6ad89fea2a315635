//! This crate contains the migration pipeline that moves one user's dataset
//! between two identity servers.

pub mod migration;
pub use migration::{JobQueue, MigrationService};

pub mod services;

//! Infrastructure Services
//!
//! This module provides the infrastructure the migration pipeline is built on:
//!
//! - **client**: remote identity server API, response classification and the HTTP transport
//! - **store**: key-value store abstraction and the per-job state store
//! - **config**: configuration structs with defaults and environment loading
//! - **errors**: error taxonomy shared by the pipeline

pub mod client;
pub mod config;
pub mod errors;
pub mod store;

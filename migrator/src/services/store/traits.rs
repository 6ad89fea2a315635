//! Key-value store abstraction backing the job state store
//!
//! The operation set is the subset of a Redis-like store the pipeline needs:
//! plain strings, counter hashes, sets, append-only lists, expiry and delete.
//! Every operation is last-writer-wins on a single key.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::services::errors::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Set a string value; clears any pending expiry on the key
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Delete a key; returns whether it existed
    async fn del(&self, key: &str) -> StoreResult<bool>;

    /// Expire a key after `ttl`; returns whether the key existed
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    async fn hset(&self, key: &str, field: &str, value: i64) -> StoreResult<()>;

    /// Atomically add `amount` to a hash field, returning the new value
    async fn hincr_by(&self, key: &str, field: &str, amount: i64) -> StoreResult<i64>;

    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, i64>>;

    /// Add a set member; returns whether it was newly added
    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool>;

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn scard(&self, key: &str) -> StoreResult<usize>;

    /// Append to a list; returns the new length
    async fn rpush(&self, key: &str, value: &str) -> StoreResult<usize>;

    async fn lrange(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Drop keys whose expiry has passed; returns how many were removed
    ///
    /// Backends that evict on their own keep the default no-op.
    async fn purge_expired(&self) -> StoreResult<usize> {
        Ok(0)
    }
}

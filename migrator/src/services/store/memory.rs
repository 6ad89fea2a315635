//! In-process key-value backend with lazy expiry

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::traits::{KeyValueStore, StoreResult};
use crate::services::errors::StoreError;

#[derive(Debug, Clone)]
enum StoredValue {
    Str(String),
    Hash(HashMap<String, i64>),
    Set(BTreeSet<String>),
    List(Vec<String>),
}

impl StoredValue {
    fn type_name(&self) -> &'static str {
        match self {
            StoredValue::Str(_) => "string",
            StoredValue::Hash(_) => "hash",
            StoredValue::Set(_) => "set",
            StoredValue::List(_) => "list",
        }
    }
}

#[derive(Debug)]
struct Entry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: StoredValue) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn wrong_type(key: &str, expected: &'static str, found: &StoredValue) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        expected,
        found: found.type_name(),
    }
}

/// Key-value store held in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub async fn key_count(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries.values().filter(|entry| !entry.is_expired(now)).count()
    }

    fn evict_if_expired(entries: &mut HashMap<String, Entry>, key: &str, now: Instant) {
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
    }

    fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a Entry> {
        Self::evict_if_expired(entries, key, Instant::now());
        entries.get(key)
    }

    fn live_or_insert<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
        empty: StoredValue,
    ) -> &'a mut Entry {
        Self::evict_if_expired(entries, key, Instant::now());
        entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(empty))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        match Self::live(&mut entries, key) {
            None => Ok(None),
            Some(Entry {
                value: StoredValue::Str(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(entry) => Err(wrong_type(key, "string", &entry.value)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), Entry::new(StoredValue::Str(value.to_string())));
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        Ok(entries
            .remove(key)
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        Self::evict_if_expired(&mut entries, key, now);
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn hset(&self, key: &str, field: &str, value: i64) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        let entry = Self::live_or_insert(&mut entries, key, StoredValue::Hash(HashMap::new()));
        match &mut entry.value {
            StoredValue::Hash(hash) => {
                hash.insert(field.to_string(), value);
                Ok(())
            }
            other => Err(wrong_type(key, "hash", other)),
        }
    }

    async fn hincr_by(&self, key: &str, field: &str, amount: i64) -> StoreResult<i64> {
        let mut entries = self.entries.lock().await;
        let entry = Self::live_or_insert(&mut entries, key, StoredValue::Hash(HashMap::new()));
        match &mut entry.value {
            StoredValue::Hash(hash) => {
                let counter = hash.entry(field.to_string()).or_insert(0);
                *counter += amount;
                Ok(*counter)
            }
            other => Err(wrong_type(key, "hash", other)),
        }
    }

    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, i64>> {
        let mut entries = self.entries.lock().await;
        match Self::live(&mut entries, key) {
            None => Ok(HashMap::new()),
            Some(Entry {
                value: StoredValue::Hash(hash),
                ..
            }) => Ok(hash.clone()),
            Some(entry) => Err(wrong_type(key, "hash", &entry.value)),
        }
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut entries = self.entries.lock().await;
        let entry = Self::live_or_insert(&mut entries, key, StoredValue::Set(BTreeSet::new()));
        match &mut entry.value {
            StoredValue::Set(set) => Ok(set.insert(member.to_string())),
            other => Err(wrong_type(key, "set", other)),
        }
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut entries = self.entries.lock().await;
        match Self::live(&mut entries, key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: StoredValue::Set(set),
                ..
            }) => Ok(set.iter().cloned().collect()),
            Some(entry) => Err(wrong_type(key, "set", &entry.value)),
        }
    }

    async fn scard(&self, key: &str) -> StoreResult<usize> {
        let mut entries = self.entries.lock().await;
        match Self::live(&mut entries, key) {
            None => Ok(0),
            Some(Entry {
                value: StoredValue::Set(set),
                ..
            }) => Ok(set.len()),
            Some(entry) => Err(wrong_type(key, "set", &entry.value)),
        }
    }

    async fn rpush(&self, key: &str, value: &str) -> StoreResult<usize> {
        let mut entries = self.entries.lock().await;
        let entry = Self::live_or_insert(&mut entries, key, StoredValue::List(Vec::new()));
        match &mut entry.value {
            StoredValue::List(list) => {
                list.push(value.to_string());
                Ok(list.len())
            }
            other => Err(wrong_type(key, "list", other)),
        }
    }

    async fn lrange(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut entries = self.entries.lock().await;
        match Self::live(&mut entries, key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: StoredValue::List(list),
                ..
            }) => Ok(list.clone()),
            Some(entry) => Err(wrong_type(key, "list", &entry.value)),
        }
    }

    async fn purge_expired(&self) -> StoreResult<usize> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!("[MemoryStore] Purged {} expired keys", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_string_roundtrip_and_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);
        store.set("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some("1".to_string()));
        assert!(store.del("a").await.unwrap());
        assert!(!store.del("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_hincr_by_accumulates() {
        let store = MemoryStore::new();
        assert_eq!(store.hincr_by("stats", "exported", 2).await.unwrap(), 2);
        assert_eq!(store.hincr_by("stats", "exported", 1).await.unwrap(), 3);
        store.hset("stats", "started_at", 100).await.unwrap();

        let all = store.hget_all("stats").await.unwrap();
        assert_eq!(all.get("exported"), Some(&3));
        assert_eq!(all.get("started_at"), Some(&100));
    }

    #[tokio::test]
    async fn test_set_members_are_unique() {
        let store = MemoryStore::new();
        assert!(store.sadd("ids", "b").await.unwrap());
        assert!(store.sadd("ids", "a").await.unwrap());
        assert!(!store.sadd("ids", "a").await.unwrap());
        assert_eq!(store.scard("ids").await.unwrap(), 2);
        assert_eq!(store.smembers("ids").await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_list_preserves_order() {
        let store = MemoryStore::new();
        store.rpush("log", "first").await.unwrap();
        assert_eq!(store.rpush("log", "second").await.unwrap(), 2);
        assert_eq!(store.lrange("log").await.unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_wrong_type_access_fails() {
        let store = MemoryStore::new();
        store.set("plain", "x").await.unwrap();
        let result = store.hincr_by("plain", "f", 1).await;
        assert!(matches!(
            result,
            Err(StoreError::WrongType {
                expected: "hash",
                found: "string",
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_removes_keys_after_ttl() {
        let store = MemoryStore::new();
        store.set("job", "running").await.unwrap();
        store.hincr_by("job-stats", "n", 1).await.unwrap();

        assert!(store.expire("job", Duration::from_secs(60)).await.unwrap());
        assert!(store.expire("job-stats", Duration::from_secs(60)).await.unwrap());
        assert!(!store.expire("missing", Duration::from_secs(60)).await.unwrap());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(store.get("job").await.unwrap(), Some("running".to_string()));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("job").await.unwrap(), None);
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.key_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_clears_pending_expiry() {
        let store = MemoryStore::new();
        store.set("k", "v1").await.unwrap();
        store.expire("k", Duration::from_secs(1)).await.unwrap();
        store.set("k", "v2").await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.get("k").await.unwrap(), Some("v2".to_string()));
    }
}

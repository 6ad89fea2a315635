//! Periodic removal of expired job state

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::traits::KeyValueStore;

/// Purge expired keys every `interval` until the returned task is aborted
///
/// Finished jobs are expired and then never read again; a lazily-expiring
/// backend keeps their keys until a purge.
pub fn spawn_purger(store: Arc<dyn KeyValueStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!("[Purger] Removed {} expired keys", removed),
                Err(e) => warn!("[Purger] Purge failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MemoryStore;

    #[tokio::test(start_paused = true)]
    async fn test_expired_keys_are_purged_without_being_read() {
        let store = Arc::new(MemoryStore::new());
        store.set("done-job", "finished").await.unwrap();
        store.set("live-job", "running").await.unwrap();
        store.expire("done-job", Duration::from_secs(5)).await.unwrap();

        let purger = spawn_purger(store.clone(), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(11)).await;
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        // already swept by the background task
        assert_eq!(store.purge_expired().await.unwrap(), 0);
        assert_eq!(store.get("live-job").await.unwrap(), Some("running".to_string()));
        purger.abort();
    }
}

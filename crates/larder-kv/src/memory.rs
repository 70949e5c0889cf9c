//! In-process key/value store

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::backend::KvStore;
use crate::error::KvError;

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// TTL map guarded by a mutex. Expired entries are invisible to readers and
/// removed lazily or by [`spawn_purge_task`].
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including ones that expired but were not
    /// purged yet
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn incr_expire(&self, key: &str, ttl: Duration) -> Result<i64, KvError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let current = match entries.get(key) {
            Some(entry) if entry.is_live(now) => entry
                .value
                .parse::<i64>()
                .map_err(|_| KvError::InvalidValue(key.to_string()))?,
            _ => 0,
        };

        let next = current + 1;
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(next)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, KvError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let removed = keys
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter(|entry| entry.is_live(now))
            .count();
        Ok(removed as u64)
    }
}

/// Spawn a background task that periodically purges expired entries
pub fn spawn_purge_task(store: Arc<MemoryStore>, interval: Duration) -> tokio::task::JoinHandle<()> {
    info!(
        "Starting background cache purge task (interval: {} seconds)",
        interval.as_secs()
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        // Skip the first tick (which fires immediately)
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                debug!(purged, "Purged expired cache entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryStore::new();
        assert_eq!(store.get("missing").await.unwrap(), None);

        store
            .set_ex("user:1", "{\"id\":1}", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            store.get("user:1").await.unwrap().as_deref(),
            Some("{\"id\":1}")
        );
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let store = MemoryStore::new();
        store
            .set_ex("token:x", "7", Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.get("token:x").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_incr_expire_counts_within_window() {
        let store = MemoryStore::new();
        let ttl = Duration::from_millis(50);

        assert_eq!(store.incr_expire("rate_limit:ip:1", ttl).await.unwrap(), 1);
        assert_eq!(store.incr_expire("rate_limit:ip:1", ttl).await.unwrap(), 2);
        assert_eq!(store.incr_expire("rate_limit:ip:2", ttl).await.unwrap(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.incr_expire("rate_limit:ip:1", ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_incr_on_non_numeric_value() {
        let store = MemoryStore::new();
        store.set_ex("k", "abc", Duration::from_secs(5)).await.unwrap();
        let err = store.incr_expire("k", Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, KvError::InvalidValue(_)));
    }

    #[tokio::test]
    async fn test_delete_counts_live_keys() {
        let store = MemoryStore::new();
        store.set_ex("a", "1", Duration::from_secs(5)).await.unwrap();
        store.set_ex("b", "2", Duration::from_secs(5)).await.unwrap();

        let removed = store
            .delete(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.delete(&["a".to_string()]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        store.set_ex("short", "1", Duration::from_millis(10)).await.unwrap();
        store.set_ex("long", "2", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.len(), 2);
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_with_timeout() {
        use crate::backend::with_timeout;

        let result: Result<(), KvError> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(KvError::Timeout)));
    }
}

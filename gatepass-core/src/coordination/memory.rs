use super::{BucketState, KeyValueStore, StoreError, TokenBucket};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

enum Value {
    Lock(String),
    Record(HashMap<String, Vec<u8>>),
    Bucket(TokenBucket),
}

struct Entry {
    value: Value,
    expires_at: Instant,
}

/// In-process coordination store.
///
/// Only coordinates requests served by this process. Expired entries are
/// invisible to reads immediately and physically removed by the sweeper.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Periodically drop expired entries until `shutdown_rx` flips to `true`.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        every: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Memory store sweeper received shutdown signal");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let removed = store.sweep().await;
                        if removed > 0 {
                            debug!(removed, "Swept expired coordination entries");
                        }
                    }
                }
            }
        })
    }

    async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }
}

fn live<'a>(entries: &'a HashMap<String, Entry>, key: &str, now: Instant) -> Option<&'a Value> {
    entries
        .get(key)
        .filter(|entry| entry.expires_at > now)
        .map(|entry| &entry.value)
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn try_lock(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if live(&entries, key, now).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Lock(owner.to_string()),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn unlock(&self, key: &str, owner: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let held = matches!(live(&entries, key, now), Some(Value::Lock(holder)) if holder == owner);
        if held {
            entries.remove(key);
        }
        Ok(held)
    }

    async fn read_record(&self, key: &str) -> Result<Option<HashMap<String, Vec<u8>>>, StoreError> {
        let entries = self.entries.lock().await;
        match live(&entries, key, Instant::now()) {
            None => Ok(None),
            Some(Value::Record(fields)) => Ok(Some(fields.clone())),
            Some(_) => Err(StoreError::Malformed {
                key: key.to_string(),
                reason: "not a record".to_string(),
            }),
        }
    }

    async fn write_record(
        &self,
        key: &str,
        fields: Vec<(String, Vec<u8>)>,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Record(fields.into_iter().collect()),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn take_token(
        &self,
        key: &str,
        rate_per_sec: f64,
        burst: u32,
        now_ms: i64,
        idle_ttl: Duration,
    ) -> Result<BucketState, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let mut bucket = match live(&entries, key, now) {
            None => TokenBucket::full(burst, now_ms),
            Some(Value::Bucket(bucket)) => *bucket,
            Some(_) => {
                return Err(StoreError::Malformed {
                    key: key.to_string(),
                    reason: "not a token bucket".to_string(),
                });
            }
        };
        let state = bucket.take(rate_per_sec, burst, now_ms);
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Bucket(bucket),
                expires_at: now + idle_ttl,
            },
        );
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_lock_is_exclusive_until_released_or_expired() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(30);
        assert!(store.try_lock("k:lock", "a", ttl).await.unwrap());
        assert!(!store.try_lock("k:lock", "b", ttl).await.unwrap());
        assert!(!store.unlock("k:lock", "b").await.unwrap());
        assert!(store.unlock("k:lock", "a").await.unwrap());
        assert!(store.try_lock("k:lock", "b", ttl).await.unwrap());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(store.try_lock("k:lock", "c", ttl).await.unwrap());
        // The expired holder must not release the new owner's lock.
        assert!(!store.unlock("k:lock", "b").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_expire() {
        let store = MemoryStore::new();
        store
            .write_record(
                "rec",
                vec![("status".to_string(), b"200".to_vec())],
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        let fields = store.read_record("rec").await.unwrap().unwrap();
        assert_eq!(fields.get("status").map(Vec::as_slice), Some(&b"200"[..]));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(store.read_record("rec").await.unwrap().is_none());
        assert_eq!(store.sweep().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = store.spawn_sweeper(Duration::from_secs(1), shutdown_rx);
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}

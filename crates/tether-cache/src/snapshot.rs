use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tether_core::config::CacheConfig;
use tether_core::types::{SNAPSHOT_KEY, SNAPSHOT_TIMESTAMP_KEY};
use tether_core::JobPosting;
use tether_store::{DurableStore, Result, StorageError};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Anything that can live in a [`LocalCache`].
pub trait CacheItem: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn entity_id(&self) -> &str;
}

impl CacheItem for JobPosting {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

/// Untyped documents are keyed by their string `"id"` field.
impl CacheItem for serde_json::Value {
    fn entity_id(&self) -> &str {
        self.get("id").and_then(|v| v.as_str()).unwrap_or_default()
    }
}

/// One complete fetch result.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot<T> {
    pub items: Vec<T>,
    pub cached_at: DateTime<Utc>,
}

impl<T> CacheSnapshot<T> {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.cached_at
    }

    /// Strictly older than `ttl`; a snapshot exactly `ttl` old is still fresh.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) > ttl
    }
}

/// Bounded, timestamped snapshot of remote list entities.
///
/// The snapshot is kept in memory and mirrored to two durable keys (items
/// and timestamp) written in one atomic batch. Reads never touch storage.
pub struct LocalCache<T> {
    store: Arc<dyn DurableStore>,
    items_key: String,
    stamp_key: String,
    max_items: usize,
    ttl: Duration,
    current: RwLock<Option<Arc<CacheSnapshot<T>>>>,
    /// Serialises durable writes so memory and storage change in the same order.
    write_gate: Mutex<()>,
}

impl<T: CacheItem> LocalCache<T> {
    pub fn new(store: Arc<dyn DurableStore>, key_prefix: &str, cfg: &CacheConfig) -> Self {
        Self::with_limits(store, key_prefix, cfg.max_items, cfg.ttl())
    }

    pub fn with_limits(
        store: Arc<dyn DurableStore>,
        key_prefix: &str,
        max_items: usize,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            items_key: format!("{key_prefix}{SNAPSHOT_KEY}"),
            stamp_key: format!("{key_prefix}{SNAPSHOT_TIMESTAMP_KEY}"),
            max_items,
            ttl,
            current: RwLock::new(None),
            write_gate: Mutex::new(()),
        }
    }

    /// Restore the snapshot from durable storage.
    ///
    /// Unreadable or corrupt data leaves the cache empty; the failure is
    /// logged, not returned. Returns the number of items restored.
    pub async fn load(&self) -> usize {
        let restored = match self.read_durable().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!(key = %self.items_key, "no cached snapshot");
                return 0;
            }
            Err(e) => {
                warn!(key = %self.items_key, error = %e, "cached snapshot unreadable, starting empty");
                return 0;
            }
        };

        let count = restored.items.len();
        *self.current.write().unwrap() = Some(Arc::new(restored));
        info!(count, "offline snapshot restored");
        count
    }

    async fn read_durable(&self) -> Result<Option<CacheSnapshot<T>>> {
        let mut values = self
            .store
            .get_many(&[self.items_key.as_str(), self.stamp_key.as_str()])
            .await?;
        let (Some(raw_items), Some(raw_stamp)) = (
            values.remove(&self.items_key).flatten(),
            values.remove(&self.stamp_key).flatten(),
        ) else {
            return Ok(None);
        };

        let mut items: Vec<T> = serde_json::from_str(&raw_items)?;
        items.truncate(self.max_items);
        let cached_at = raw_stamp
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| StorageError::Backend(format!("bad snapshot timestamp {raw_stamp:?}")))?;

        Ok(Some(CacheSnapshot { items, cached_at }))
    }

    /// Replace the snapshot with the first `max_items` of `items`, stamped `at`.
    ///
    /// The in-memory snapshot only changes once the durable write succeeded;
    /// on error the previous snapshot is still served.
    #[instrument(skip(self, items), fields(offered = items.len()))]
    pub async fn replace(&self, mut items: Vec<T>, at: DateTime<Utc>) -> Result<usize> {
        items.truncate(self.max_items);
        let encoded = serde_json::to_string(&items)?;

        let _gate = self.write_gate.lock().await;
        self.store
            .set_many(&[
                (self.items_key.clone(), encoded),
                (self.stamp_key.clone(), at.timestamp_millis().to_string()),
            ])
            .await
            .inspect_err(|e| warn!(error = %e, "snapshot write failed, keeping previous"))?;

        let count = items.len();
        *self.current.write().unwrap() = Some(Arc::new(CacheSnapshot {
            items,
            cached_at: at,
        }));
        debug!(count, "snapshot replaced");
        Ok(count)
    }

    /// Drop the snapshot, in memory and on disk.
    pub async fn clear(&self) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        self.store
            .remove_many(&[self.items_key.as_str(), self.stamp_key.as_str()])
            .await?;
        *self.current.write().unwrap() = None;
        info!("offline snapshot cleared");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.snapshot()?
            .items
            .iter()
            .find(|item| item.entity_id() == id)
            .cloned()
    }

    pub fn items(&self) -> Vec<T> {
        self.snapshot()
            .map(|s| s.items.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.snapshot().map(|s| s.items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cached_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot().map(|s| s.cached_at)
    }

    /// Computed on every call. An empty cache is never stale.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.snapshot()
            .map(|s| s.is_stale(now, self.ttl))
            .unwrap_or(false)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn snapshot(&self) -> Option<Arc<CacheSnapshot<T>>> {
        self.current.read().unwrap().clone()
    }
}

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tether_store::{DurableStore, Result};
use tracing::{debug, warn};

pub const TTL_SHORT: Duration = Duration::from_secs(60);
pub const TTL_MEDIUM: Duration = Duration::from_secs(5 * 60);
pub const TTL_LONG: Duration = Duration::from_secs(15 * 60);
pub const TTL_VERY_LONG: Duration = Duration::from_secs(60 * 60);

/// Stored form of a single entry: `{ data, timestamp, ttl }`, both numbers
/// in milliseconds.
#[derive(Debug, Serialize, Deserialize)]
struct Entry<V> {
    data: V,
    timestamp: i64,
    ttl: i64,
}

impl<V> Entry<V> {
    fn is_expired(&self, now_ms: i64) -> bool {
        now_ms - self.timestamp > self.ttl
    }
}

/// Value returned by [`TtlCache::fetch_with_cache`].
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<V> {
    pub value: V,
    pub from_cache: bool,
}

/// Key-value cache where every entry carries its own lifetime.
///
/// Entries live in the durable store under `{prefix}ttl:{key}`. Expired or
/// unreadable entries are deleted when they are next looked at.
#[derive(Clone)]
pub struct TtlCache {
    store: Arc<dyn DurableStore>,
    prefix: String,
    default_ttl: Duration,
}

impl TtlCache {
    pub fn new(store: Arc<dyn DurableStore>, key_prefix: &str, default_ttl: Duration) -> Self {
        Self {
            store,
            prefix: format!("{key_prefix}ttl:"),
            default_ttl,
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Cached value for `key`, or `None` when absent, expired or unreadable.
    pub async fn get<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        let full = self.full_key(key);
        let raw = match tether_store::get_one(self.store.as_ref(), &full).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key = %full, error = %e, "ttl cache read failed");
                return None;
            }
        };

        let entry: Entry<V> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %full, error = %e, "dropping unreadable ttl cache entry");
                self.discard(&full).await;
                return None;
            }
        };

        if entry.is_expired(Utc::now().timestamp_millis()) {
            debug!(key = %full, "ttl cache entry expired");
            self.discard(&full).await;
            return None;
        }
        Some(entry.data)
    }

    /// Store `value` under `key`; `ttl` defaults to the cache-wide default.
    pub async fn put<V: Serialize>(&self, key: &str, value: &V, ttl: Option<Duration>) -> Result<()> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let entry = Entry {
            data: value,
            timestamp: Utc::now().timestamp_millis(),
            ttl: ttl.as_millis() as i64,
        };
        let encoded = serde_json::to_string(&entry)?;
        self.store
            .set_many(&[(self.full_key(key), encoded)])
            .await
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.store.remove_many(&[self.full_key(key).as_str()]).await
    }

    /// Remove every entry owned by this cache. Returns how many were removed.
    pub async fn clear(&self) -> Result<usize> {
        let keys = self.store.keys_with_prefix(&self.prefix).await?;
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        self.store.remove_many(&refs).await?;
        debug!(count = keys.len(), "ttl cache cleared");
        Ok(keys.len())
    }

    /// Remove expired and unreadable entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<usize> {
        let keys = self.store.keys_with_prefix(&self.prefix).await?;
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let values = self.store.get_many(&refs).await?;
        let now_ms = Utc::now().timestamp_millis();

        let doomed: Vec<&str> = values
            .iter()
            .filter(|(_, raw)| match raw {
                Some(raw) => serde_json::from_str::<Entry<serde_json::Value>>(raw)
                    .map(|entry| entry.is_expired(now_ms))
                    .unwrap_or(true),
                None => false,
            })
            .map(|(key, _)| key.as_str())
            .collect();

        if !doomed.is_empty() {
            self.store.remove_many(&doomed).await?;
            debug!(count = doomed.len(), "expired ttl cache entries purged");
        }
        Ok(doomed.len())
    }

    /// Serve `key` from the cache if fresh, otherwise call `fetcher` and
    /// cache its result.
    ///
    /// On a cache hit the fetcher still runs on a background task and
    /// refreshes the entry, so the next read sees newer data. Only the
    /// fetcher's own error is returned; cache write failures are logged.
    pub async fn fetch_with_cache<V, E, F, Fut>(
        &self,
        key: &str,
        fetcher: F,
        ttl: Option<Duration>,
    ) -> std::result::Result<Fetched<V>, E>
    where
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
        E: Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
    {
        if let Some(value) = self.get::<V>(key).await {
            let cache = self.clone();
            let key = key.to_string();
            tokio::spawn(async move {
                match fetcher().await {
                    Ok(fresh) => {
                        if let Err(e) = cache.put(&key, &fresh, ttl).await {
                            warn!(key = %key, error = %e, "background refresh not cached");
                        }
                    }
                    Err(e) => debug!(key = %key, error = %e, "background refresh failed"),
                }
            });
            return Ok(Fetched {
                value,
                from_cache: true,
            });
        }

        let value = fetcher().await?;
        if let Err(e) = self.put(key, &value, ttl).await {
            warn!(key = %key, error = %e, "fetched value not cached");
        }
        Ok(Fetched {
            value,
            from_cache: false,
        })
    }

    async fn discard(&self, full_key: &str) {
        if let Err(e) = self.store.remove_many(&[full_key]).await {
            warn!(key = %full_key, error = %e, "failed to drop ttl cache entry");
        }
    }
}

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

/// Common interface implemented by every durable storage backend.
///
/// Implementations must be `Send + Sync` so a single store can be shared
/// (behind an `Arc`) by the cache, the mutation queue and the CLI.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Read several keys at once. Every requested key is present in the
    /// returned map; absent keys map to `None`.
    async fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, Option<String>>>;

    /// Write several entries atomically.
    ///
    /// Either every entry is stored or none is: on error the previously
    /// stored values must be unchanged.
    async fn set_many(&self, entries: &[(String, String)]) -> Result<()>;

    /// Delete several keys atomically. Missing keys are ignored.
    async fn remove_many(&self, keys: &[&str]) -> Result<()>;

    /// List every stored key starting with `prefix`, sorted.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Convenience wrapper around [`DurableStore::get_many`] for a single key.
pub async fn get_one(store: &dyn DurableStore, key: &str) -> Result<Option<String>> {
    let mut values = store.get_many(&[key]).await?;
    Ok(values.remove(key).flatten())
}

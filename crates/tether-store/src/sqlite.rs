use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::db::init_db;
use crate::error::{Result, StorageError};
use crate::store::DurableStore;

/// SQLite-backed durable store.
///
/// Batched writes run inside a single transaction, so a failed
/// `set_many`/`remove_many` leaves every key at its previous value.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap an already-open connection, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        info!(path = %path.display(), "opening offline store");
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::new(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, Option<String>>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare_cached("SELECT value FROM kv_store WHERE key = ?1")?;
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            let value: Option<String> = stmt
                .query_row([key], |row| row.get(0))
                .optional()?;
            out.insert(key.to_string(), value);
        }
        Ok(out)
    }

    async fn set_many(&self, entries: &[(String, String)]) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                               updated_at = excluded.updated_at",
                rusqlite::params![key, value, now],
            )?;
        }
        tx.commit()?;
        debug!(count = entries.len(), "kv entries written");
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        for key in keys {
            tx.execute("DELETE FROM kv_store WHERE key = ?1", [key])?;
        }
        tx.commit()?;
        debug!(count = keys.len(), "kv entries removed");
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let db = self.db.lock().unwrap();
        // substr() instead of LIKE: prefixes such as "@iopps:" may contain
        // LIKE wildcards.
        let mut stmt = db.prepare_cached(
            "SELECT key FROM kv_store WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )?;
        let keys = stmt
            .query_map([prefix], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}

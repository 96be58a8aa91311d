use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hard cap on the number of list entities kept in a cache snapshot.
pub const MAX_ITEMS: usize = 50;
/// A snapshot older than this is stale (24 hours).
pub const CACHE_TTL_MS: i64 = 24 * 60 * 60 * 1000;

/// Prefix prepended to every durable key.
pub const DEFAULT_KEY_PREFIX: &str = "@iopps:";
/// Durable key holding the cached list (JSON array).
pub const SNAPSHOT_KEY: &str = "offline_jobs";
/// Durable key holding the snapshot timestamp (epoch millis as a decimal string).
pub const SNAPSHOT_TIMESTAMP_KEY: &str = "offline_jobs_timestamp";
/// Durable key holding the mutation queue (single JSON document).
pub const QUEUE_KEY: &str = "offline_saved_jobs";

/// Opaque identifier of a remote entity (a job posting id).
pub type EntityId = String;

/// [`CACHE_TTL_MS`] as a `chrono::Duration`.
pub fn cache_ttl() -> Duration {
    Duration::milliseconds(CACHE_TTL_MS)
}

/// What the user last asked for on an entity while offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Add,
    Remove,
}

impl Intent {
    pub fn from_wanted(want_saved: bool) -> Self {
        if want_saved {
            Intent::Add
        } else {
            Intent::Remove
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Add => write!(f, "add"),
            Intent::Remove => write!(f, "remove"),
        }
    }
}

/// A locally recorded, not-yet-acknowledged intent for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMutation {
    pub entity_id: EntityId,
    pub intent: Intent,
    pub queued_at: DateTime<Utc>,
}

impl PendingMutation {
    pub fn new(entity_id: impl Into<String>, intent: Intent, queued_at: DateTime<Utc>) -> Self {
        Self {
            entity_id: entity_id.into(),
            intent,
            queued_at,
        }
    }
}

/// Normalised network reachability as seen by the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityState {
    pub is_connected: bool,
    /// `None` means "unknown", which is not the same as unreachable.
    pub is_reachable: Option<bool>,
    /// Transport label reported by the platform (`"wifi"`, `"cellular"`, …).
    pub kind: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl ConnectivityState {
    pub fn new(
        is_connected: bool,
        is_reachable: Option<bool>,
        kind: Option<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            is_connected,
            is_reachable,
            kind,
            observed_at,
        }
    }

    /// State assumed before the platform has reported anything.
    pub fn assumed_online(observed_at: DateTime<Utc>) -> Self {
        Self::new(true, Some(true), None, observed_at)
    }

    /// Offline when disconnected or positively known to be unreachable.
    /// Unknown reachability does not count as offline.
    pub fn is_offline(&self) -> bool {
        !self.is_connected || self.is_reachable == Some(false)
    }
}

/// A job listing as stored in the offline snapshot.
///
/// Only `id` and `title` are required; any other fields the remote document
/// carries are preserved verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPosting {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl JobPosting {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            employer_name: None,
            location: None,
            extra: serde_json::Map::new(),
        }
    }
}

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tether_core::{EntityId, Intent, PendingMutation};

/// On-disk shape of the queue.
///
/// ```json
/// { "savedJobIds": ["a"], "pendingSaves": ["a"], "pendingRemoves": ["b"],
///   "queuedAt": { "a": 1700000000000, "b": 1700000000500 } }
/// ```
///
/// `queuedAt` is absent in blobs written by older clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedQueue {
    #[serde(default)]
    pub saved_job_ids: Vec<EntityId>,
    #[serde(default)]
    pub pending_saves: Vec<EntityId>,
    #[serde(default)]
    pub pending_removes: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub queued_at: BTreeMap<EntityId, i64>,
}

impl PersistedQueue {
    pub fn from_state(
        saved_ids: &BTreeSet<EntityId>,
        pending: &BTreeMap<EntityId, PendingMutation>,
    ) -> Self {
        let mut out = PersistedQueue {
            saved_job_ids: saved_ids.iter().cloned().collect(),
            ..Default::default()
        };
        for (id, m) in pending {
            match m.intent {
                Intent::Add => out.pending_saves.push(id.clone()),
                Intent::Remove => out.pending_removes.push(id.clone()),
            }
            out.queued_at.insert(id.clone(), m.queued_at.timestamp_millis());
        }
        out
    }

    /// Rebuild the in-memory view. `now` stamps entries with no recorded
    /// queue time.
    ///
    /// An id listed under both pending lists (only possible in hand-edited
    /// or foreign data) resolves to whichever intent agrees with the saved
    /// set.
    pub fn into_state(
        self,
        now: DateTime<Utc>,
    ) -> (BTreeSet<EntityId>, BTreeMap<EntityId, PendingMutation>) {
        let saved: BTreeSet<EntityId> = self.saved_job_ids.into_iter().collect();
        let queued_at = self.queued_at;
        let stamp = |id: &str| {
            queued_at
                .get(id)
                .and_then(|ms| DateTime::from_timestamp_millis(*ms))
                .unwrap_or(now)
        };

        let mut pending = BTreeMap::new();
        for id in self.pending_saves {
            let m = PendingMutation::new(id.clone(), Intent::Add, stamp(&id));
            pending.insert(id, m);
        }
        for id in self.pending_removes {
            if pending.contains_key(&id) && saved.contains(&id) {
                continue;
            }
            let m = PendingMutation::new(id.clone(), Intent::Remove, stamp(&id));
            pending.insert(id, m);
        }
        (saved, pending)
    }
}

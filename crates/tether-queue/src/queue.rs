use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tether_core::types::QUEUE_KEY;
use tether_core::{EntityId, Intent, PendingMutation};
use tether_store::{DurableStore, Result};
use tracing::{debug, info, warn};

use crate::persist::PersistedQueue;

#[derive(Debug, Default)]
struct QueueState {
    saved_ids: BTreeSet<EntityId>,
    pending: BTreeMap<EntityId, PendingMutation>,
    /// Intents currently on the wire in a drain. Never persisted.
    in_flight: BTreeMap<EntityId, Intent>,
}

impl QueueState {
    fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(&PersistedQueue::from_state(&self.saved_ids, &self.pending))
    }
}

/// Optimistic saved-set plus at most one pending intent per entity.
///
/// Every mutation updates memory first and then writes the whole queue as
/// one durable value. Writes are serialised through an async gate, so the
/// durable value always matches some state the queue actually passed
/// through. If a write fails the in-memory state is kept (the UI already
/// shows it) and the error is returned; the next successful write persists
/// it.
pub struct MutationQueue {
    store: Arc<dyn DurableStore>,
    key: String,
    state: Mutex<QueueState>,
    write_gate: tokio::sync::Mutex<()>,
}

impl MutationQueue {
    pub fn new(store: Arc<dyn DurableStore>, key_prefix: &str) -> Self {
        Self {
            store,
            key: format!("{key_prefix}{QUEUE_KEY}"),
            state: Mutex::new(QueueState::default()),
            write_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Restore from durable storage. A missing, unreadable or corrupt value
    /// leaves the queue empty. Returns the number of pending entries.
    pub async fn load(&self) -> usize {
        let raw = match tether_store::get_one(self.store.as_ref(), &self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return 0,
            Err(e) => {
                warn!(key = %self.key, error = %e, "mutation queue unreadable, starting empty");
                return 0;
            }
        };
        let blob: PersistedQueue = match serde_json::from_str(&raw) {
            Ok(blob) => blob,
            Err(e) => {
                warn!(key = %self.key, error = %e, "mutation queue corrupt, starting empty");
                return 0;
            }
        };

        let (saved_ids, pending) = blob.into_state(Utc::now());
        let count = pending.len();
        *self.state.lock().unwrap() = QueueState {
            saved_ids,
            pending,
            in_flight: BTreeMap::new(),
        };
        info!(pending = count, "mutation queue restored");
        count
    }

    /// Record that the user wants `id` saved (`want_saved`) or not.
    ///
    /// The saved set always follows the latest call. Offline, the pending
    /// entry for `id` becomes the latest intent, except that removing an
    /// item whose add was never sent cancels the add outright. Online, any
    /// older pending entry for `id` is superseded and the caller talks to
    /// the remote directly.
    ///
    /// While a drain has a different intent for `id` on the wire, the new
    /// intent is always queued, online or not, so that it reaches the remote
    /// after the one in flight. Callers check [`pending_for`](Self::pending_for)
    /// before making a direct call.
    pub async fn toggle(&self, id: &str, want_saved: bool, online: bool) -> Result<()> {
        let intent = Intent::from_wanted(want_saved);
        self.mutate(|st| {
            if want_saved {
                st.saved_ids.insert(id.to_string());
            } else {
                st.saved_ids.remove(id);
            }

            let sending = st.in_flight.get(id).copied();
            if online && sending.map_or(true, |s| s == intent) {
                st.pending.remove(id);
                return;
            }
            match (st.pending.get(id).map(|m| m.intent), intent) {
                (Some(current), wanted) if current == wanted => {}
                (Some(Intent::Add), Intent::Remove) if sending != Some(Intent::Add) => {
                    st.pending.remove(id);
                    debug!(entity_id = %id, "pending add cancelled");
                }
                _ => {
                    st.pending
                        .insert(id.to_string(), PendingMutation::new(id, intent, Utc::now()));
                }
            }
        })
        .await
    }

    /// Put `intent` back into the queue after a direct remote call failed.
    ///
    /// Ignored if the user has changed their mind in the meantime (the saved
    /// set no longer agrees with `intent`). Returns whether it was queued.
    pub async fn enqueue(&self, id: &str, intent: Intent) -> Result<bool> {
        let mut queued = false;
        self.mutate(|st| {
            if st.saved_ids.contains(id) != (intent == Intent::Add) {
                return;
            }
            st.pending
                .entry(id.to_string())
                .or_insert_with(|| PendingMutation::new(id, intent, Utc::now()));
            queued = true;
        })
        .await?;
        Ok(queued)
    }

    /// Claim the pending entry for `id` before sending `intent`.
    ///
    /// Returns `false`, claiming nothing, if the entry no longer holds
    /// `intent`. A successful claim lasts until [`settle`](Self::settle) or
    /// [`release`](Self::release).
    pub fn begin_sync(&self, id: &str, intent: Intent) -> bool {
        let mut st = self.state.lock().unwrap();
        if st.pending.get(id).map(|m| m.intent) != Some(intent) {
            return false;
        }
        st.in_flight.insert(id.to_string(), intent);
        true
    }

    /// Drop the claim on `id` after a failed send. The entry stays queued.
    pub fn release(&self, id: &str) {
        self.state.lock().unwrap().in_flight.remove(id);
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        self.state.lock().unwrap().in_flight.contains_key(id)
    }

    /// Drop the pending entry for `id` once the remote acknowledged `intent`,
    /// and release the claim on it.
    ///
    /// Nothing is removed if the entry has since changed to another intent or
    /// been removed. Returns whether an entry was settled.
    pub async fn settle(&self, id: &str, intent: Intent) -> Result<bool> {
        let mut settled = false;
        self.mutate(|st| {
            st.in_flight.remove(id);
            if st.pending.get(id).map(|m| m.intent) == Some(intent) {
                st.pending.remove(id);
                settled = true;
            }
        })
        .await?;
        Ok(settled)
    }

    /// Forget everything, in memory and on disk.
    pub async fn clear(&self) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        *self.state.lock().unwrap() = QueueState::default();
        self.store.remove_many(&[self.key.as_str()]).await?;
        info!("mutation queue cleared");
        Ok(())
    }

    pub fn is_saved(&self, id: &str) -> bool {
        self.state.lock().unwrap().saved_ids.contains(id)
    }

    pub fn saved_ids(&self) -> Vec<EntityId> {
        self.state.lock().unwrap().saved_ids.iter().cloned().collect()
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.state.lock().unwrap().pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    pub fn pending_for(&self, id: &str) -> Option<PendingMutation> {
        self.state.lock().unwrap().pending.get(id).cloned()
    }

    /// Copy of the pending entries, ordered by entity id.
    pub fn pending(&self) -> Vec<PendingMutation> {
        self.state
            .lock()
            .unwrap()
            .pending
            .values()
            .cloned()
            .collect()
    }

    async fn mutate<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut QueueState),
    {
        let _gate = self.write_gate.lock().await;
        let encoded = {
            let mut st = self.state.lock().unwrap();
            apply(&mut *st);
            st.encode()?
        };
        self.store
            .set_many(&[(self.key.clone(), encoded)])
            .await
            .inspect_err(|e| warn!(key = %self.key, error = %e, "mutation queue not persisted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tether_store::{MemoryStore, StorageError};

    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl DurableStore for FlakyStore {
        async fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, Option<String>>> {
            self.inner.get_many(keys).await
        }
        async fn set_many(&self, entries: &[(String, String)]) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::Backend("quota exceeded".into()));
            }
            self.inner.set_many(entries).await
        }
        async fn remove_many(&self, keys: &[&str]) -> Result<()> {
            self.inner.remove_many(keys).await
        }
        async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
            self.inner.keys_with_prefix(prefix).await
        }
    }

    fn queue() -> (Arc<MemoryStore>, MutationQueue) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), MutationQueue::new(store, "@t:"))
    }

    #[tokio::test]
    async fn offline_save_then_unsave_cancels() {
        let (_, q) = queue();
        q.toggle("j1", true, false).await.unwrap();
        q.toggle("j1", false, false).await.unwrap();

        assert!(q.pending_for("j1").is_none());
        assert!(!q.is_saved("j1"));
        assert!(!q.has_pending_changes());
    }

    #[tokio::test]
    async fn repeated_intent_is_not_duplicated() {
        let (_, q) = queue();
        q.toggle("j1", true, false).await.unwrap();
        let first = q.pending_for("j1").unwrap().queued_at;
        q.toggle("j1", true, false).await.unwrap();

        assert_eq!(q.pending_len(), 1);
        let entry = q.pending_for("j1").unwrap();
        assert_eq!(entry.intent, Intent::Add);
        assert_eq!(entry.queued_at, first);
    }

    #[tokio::test]
    async fn offline_readd_over_remove_stores_add() {
        let (_, q) = queue();
        q.toggle("j1", true, true).await.unwrap();
        q.toggle("j1", false, false).await.unwrap();
        assert_eq!(q.pending_for("j1").unwrap().intent, Intent::Remove);

        q.toggle("j1", true, false).await.unwrap();
        assert_eq!(q.pending_for("j1").unwrap().intent, Intent::Add);
        assert!(q.is_saved("j1"));
    }

    #[tokio::test]
    async fn online_toggle_creates_no_pending_and_supersedes_old() {
        let (_, q) = queue();
        q.toggle("a", true, true).await.unwrap();
        assert!(q.is_saved("a"));
        assert!(!q.has_pending_changes());

        q.toggle("b", false, false).await.unwrap();
        q.toggle("b", true, true).await.unwrap();
        assert!(q.pending_for("b").is_none());
    }

    #[tokio::test]
    async fn every_toggle_is_persisted() {
        let (store, q) = queue();
        q.toggle("a", true, false).await.unwrap();
        q.toggle("b", true, true).await.unwrap();

        let raw = tether_store::get_one(store.as_ref(), "@t:offline_saved_jobs")
            .await
            .unwrap()
            .unwrap();
        let blob: PersistedQueue = serde_json::from_str(&raw).unwrap();
        assert_eq!(blob.saved_job_ids, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(blob.pending_saves, vec!["a".to_string()]);
        assert!(blob.pending_removes.is_empty());

        let reloaded = MutationQueue::new(store, "@t:");
        assert_eq!(reloaded.load().await, 1);
        assert!(reloaded.is_saved("b"));
        assert_eq!(reloaded.pending_for("a").unwrap().intent, Intent::Add);
    }

    #[tokio::test]
    async fn failed_write_keeps_optimistic_state() {
        let store = Arc::new(FlakyStore::default());
        let q = MutationQueue::new(store.clone(), "@t:");
        q.toggle("a", true, false).await.unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        assert!(q.toggle("b", true, false).await.is_err());
        assert!(q.is_saved("b"));
        assert_eq!(q.pending_len(), 2);

        // The durable copy still holds the last good state.
        let reloaded = MutationQueue::new(store, "@t:");
        assert_eq!(reloaded.load().await, 1);
        assert!(!reloaded.is_saved("b"));
    }

    #[tokio::test]
    async fn settle_only_matching_intent() {
        let (_, q) = queue();
        q.toggle("a", false, false).await.unwrap();

        assert!(!q.settle("a", Intent::Add).await.unwrap());
        assert!(q.has_pending_changes());
        assert!(q.settle("a", Intent::Remove).await.unwrap());
        assert!(!q.has_pending_changes());
        assert!(!q.settle("a", Intent::Remove).await.unwrap());
    }

    #[tokio::test]
    async fn enqueue_respects_later_change_of_mind() {
        let (_, q) = queue();
        q.toggle("a", true, true).await.unwrap();
        assert!(q.enqueue("a", Intent::Add).await.unwrap());
        assert_eq!(q.pending_for("a").unwrap().intent, Intent::Add);

        q.toggle("b", true, true).await.unwrap();
        q.toggle("b", false, true).await.unwrap();
        assert!(!q.enqueue("b", Intent::Add).await.unwrap());
        assert!(q.pending_for("b").is_none());
    }

    #[tokio::test]
    async fn corrupt_blob_loads_empty() {
        let (store, q) = queue();
        store
            .set_many(&[("@t:offline_saved_jobs".to_string(), "{{{".to_string())])
            .await
            .unwrap();
        assert_eq!(q.load().await, 0);
        assert!(q.saved_ids().is_empty());
    }

    #[tokio::test]
    async fn clear_wipes_memory_and_disk() {
        let (store, q) = queue();
        q.toggle("a", true, false).await.unwrap();
        q.clear().await.unwrap();
        assert!(store.is_empty());
        assert!(!q.is_saved("a"));
        assert!(!q.has_pending_changes());
    }

    #[tokio::test]
    async fn remove_during_in_flight_add_is_queued() {
        let (_, q) = queue();
        q.toggle("a", true, false).await.unwrap();
        assert!(q.begin_sync("a", Intent::Add));
        assert!(q.is_in_flight("a"));

        q.toggle("a", false, false).await.unwrap();
        assert!(!q.is_saved("a"));
        assert_eq!(q.pending_for("a").unwrap().intent, Intent::Remove);

        assert!(!q.settle("a", Intent::Add).await.unwrap());
        assert!(!q.is_in_flight("a"));
        assert_eq!(q.pending_for("a").unwrap().intent, Intent::Remove);
    }

    #[tokio::test]
    async fn online_toggle_against_in_flight_intent_is_queued() {
        let (_, q) = queue();
        q.toggle("b", true, true).await.unwrap();
        q.toggle("b", false, false).await.unwrap();
        assert!(q.begin_sync("b", Intent::Remove));

        q.toggle("b", true, true).await.unwrap();
        assert_eq!(q.pending_for("b").unwrap().intent, Intent::Add);

        // Agreeing with what is on the wire needs no queued entry.
        q.toggle("b", false, true).await.unwrap();
        assert!(q.pending_for("b").is_none());
    }

    #[tokio::test]
    async fn begin_sync_refuses_superseded_intent() {
        let (_, q) = queue();
        q.toggle("a", false, false).await.unwrap();
        assert!(!q.begin_sync("a", Intent::Add));
        assert!(!q.begin_sync("missing", Intent::Remove));
        assert!(!q.is_in_flight("a"));

        assert!(q.begin_sync("a", Intent::Remove));
        q.release("a");
        assert!(!q.is_in_flight("a"));
        assert_eq!(q.pending_for("a").unwrap().intent, Intent::Remove);
    }
}

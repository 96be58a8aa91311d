use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tether_cache::{CacheItem, LocalCache};
use tether_core::{EntityId, Intent, TetherConfig, TetherError};
use tether_net::{ConnectivityMonitor, Subscription};
use tether_queue::MutationQueue;
use tether_store::DurableStore;
use tether_sync::{ListQuery, RemoteService, SyncCoordinator, SyncOutcome};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type SyncTasks = Arc<Mutex<Vec<JoinHandle<SyncOutcome>>>>;

/// Offline-first view of remote list data and the user's saved set.
///
/// Construction subscribes to the monitor once; every reconnect edge spawns
/// a drain on the current tokio runtime. The subscription lives until
/// [`dispose`](Self::dispose) is called or the facade is dropped.
///
/// UI-facing methods never fail. Storage and network problems are logged
/// and the facade keeps serving the last good state.
pub struct OfflineDataFacade<T: CacheItem> {
    monitor: Arc<ConnectivityMonitor>,
    cache: Arc<LocalCache<T>>,
    queue: Arc<MutationQueue>,
    coordinator: Arc<SyncCoordinator<T>>,
    subscription: Mutex<Option<Subscription>>,
    sync_tasks: SyncTasks,
}

impl<T: CacheItem> OfflineDataFacade<T> {
    pub fn new(
        monitor: Arc<ConnectivityMonitor>,
        cache: Arc<LocalCache<T>>,
        queue: Arc<MutationQueue>,
        coordinator: Arc<SyncCoordinator<T>>,
    ) -> Arc<Self> {
        let sync_tasks: SyncTasks = Arc::new(Mutex::new(Vec::new()));

        let subscription = {
            let coordinator = Arc::clone(&coordinator);
            let tasks = Arc::clone(&sync_tasks);
            monitor.subscribe(move |event| {
                if !event.is_reconnect() {
                    return;
                }
                let Ok(handle) = Handle::try_current() else {
                    warn!("reconnect outside a tokio runtime, sync skipped");
                    return;
                };
                let coordinator = Arc::clone(&coordinator);
                let event = event.clone();
                let task = handle.spawn(async move { coordinator.run_if_due(&event).await });

                let mut tasks = tasks.lock().unwrap();
                tasks.retain(|t| !t.is_finished());
                tasks.push(task);
            })
        };

        Arc::new(Self {
            monitor,
            cache,
            queue,
            coordinator,
            subscription: Mutex::new(Some(subscription)),
            sync_tasks,
        })
    }

    /// Build every component from config and restore persisted state.
    pub async fn open(
        store: Arc<dyn DurableStore>,
        cfg: &TetherConfig,
        monitor: Arc<ConnectivityMonitor>,
        remote: Arc<dyn RemoteService<Item = T>>,
    ) -> Arc<Self> {
        let prefix = cfg.storage.key_prefix.as_str();
        let cache = Arc::new(LocalCache::new(Arc::clone(&store), prefix, &cfg.cache));
        let queue = Arc::new(MutationQueue::new(store, prefix));

        let items = cache.load().await;
        let pending = queue.load().await;
        info!(items, pending, "offline state restored");

        let coordinator = Arc::new(SyncCoordinator::new(Arc::clone(&queue), remote));
        Self::new(monitor, cache, queue, coordinator)
    }

    pub fn cached_items(&self) -> Vec<T> {
        self.cache.items()
    }

    /// `true` whenever the link is down; unknown reachability does not count.
    pub fn is_offline_mode(&self) -> bool {
        !self.monitor.current().is_connected
    }

    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.cache.cached_at()
    }

    pub fn is_stale(&self) -> bool {
        self.cache.is_stale(Utc::now())
    }

    pub fn is_saved(&self, id: &str) -> bool {
        self.queue.is_saved(id)
    }

    pub fn saved_ids(&self) -> Vec<EntityId> {
        self.queue.saved_ids()
    }

    pub fn has_pending_changes(&self) -> bool {
        self.queue.has_pending_changes()
    }

    /// Cached copy of `id`, whatever the connectivity.
    pub fn cached_item(&self, id: &str) -> Option<T> {
        self.cache.get(id)
    }

    /// Cached copy of `id`, but only in offline mode; online callers are
    /// expected to fetch live data instead.
    pub fn offline_item(&self, id: &str) -> Option<T> {
        if self.is_offline_mode() {
            self.cache.get(id)
        } else {
            None
        }
    }

    /// Save or unsave `id`.
    ///
    /// The saved set updates immediately. Offline, the intent is queued for
    /// the next reconnect. Online, the remote is called directly and the
    /// intent is queued only if that call fails, unless a running drain is
    /// sending a different intent for `id`; then it is queued behind that.
    pub async fn toggle_save(&self, id: &str, want_saved: bool) {
        let online = !self.monitor.is_offline();
        if let Err(e) = self.queue.toggle(id, want_saved, online).await {
            warn!(entity_id = %id, error = %e, "saved state not persisted");
        }
        if !online {
            debug!(entity_id = %id, want_saved, "offline toggle queued");
            return;
        }
        if self.queue.pending_for(id).is_some() {
            debug!(entity_id = %id, want_saved, "sync in flight for item, toggle queued behind it");
            return;
        }

        let intent = Intent::from_wanted(want_saved);
        let remote = self.coordinator.remote();
        let result = match intent {
            Intent::Add => remote.save(id).await,
            Intent::Remove => remote.remove(id).await,
        };
        if let Err(e) = result {
            warn!(entity_id = %id, %intent, error = %e, "remote toggle failed, queueing for retry");
            if let Err(e) = self.queue.enqueue(id, intent).await {
                warn!(entity_id = %id, error = %e, "retry intent not persisted");
            }
        }
    }

    /// Cache `items` as the new offline snapshot.
    pub async fn save_for_offline(&self, items: Vec<T>) {
        if let Err(e) = self.cache.replace(items, Utc::now()).await {
            warn!(error = %e, "offline snapshot not saved");
        }
    }

    /// Fetch the list from the remote and replace the snapshot with it.
    ///
    /// Returns the number of items cached. On any error the previous
    /// snapshot stays in place.
    pub async fn refresh(&self, query: &ListQuery) -> Result<usize, TetherError> {
        let items = self
            .coordinator
            .remote()
            .fetch_list(query)
            .await
            .inspect_err(|e| warn!(error = %e, "list fetch failed, keeping cached snapshot"))?;
        Ok(self.cache.replace(items, Utc::now()).await?)
    }

    pub async fn clear_offline_data(&self) {
        if let Err(e) = self.cache.clear().await {
            warn!(error = %e, "offline snapshot not cleared");
        }
    }

    /// Drain the queue immediately, e.g. at start-up when already online.
    /// Shares the re-entrancy guard with reconnect-triggered drains.
    pub async fn sync_now(&self) -> SyncOutcome {
        if self.monitor.is_offline() {
            return SyncOutcome::Skipped(tether_sync::SkipReason::Offline);
        }
        self.coordinator.drain().await
    }

    /// Wait for every drain started by a reconnect so far.
    pub async fn wait_for_sync(&self) -> Vec<SyncOutcome> {
        let tasks: Vec<_> = std::mem::take(&mut *self.sync_tasks.lock().unwrap());
        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(error = %e, "sync task did not complete"),
            }
        }
        outcomes
    }

    /// Stop reacting to connectivity changes. Idempotent.
    pub fn dispose(&self) {
        if self.subscription.lock().unwrap().take().is_some() {
            debug!("offline facade disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.subscription.lock().unwrap().is_none()
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn queue(&self) -> &Arc<MutationQueue> {
        &self.queue
    }

    pub fn cache(&self) -> &Arc<LocalCache<T>> {
        &self.cache
    }
}

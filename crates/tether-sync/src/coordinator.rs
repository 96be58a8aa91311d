use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tether_core::Intent;
use tether_net::ConnectivityEvent;
use tether_queue::MutationQueue;
use tracing::{debug, info, instrument, warn};

use crate::remote::RemoteService;

/// Why [`SyncCoordinator::run_if_due`] did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The event was not an offline→online edge.
    NotReconnect,
    Offline,
    NothingPending,
    /// Another drain is still in flight.
    AlreadySyncing,
}

/// Tally of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub synced: usize,
    pub failed: usize,
    /// Pending entries left once the pass finished.
    pub remaining: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    Drained(DrainReport),
}

/// Clears the syncing flag however the drain ends.
struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Pushes pending mutations to the remote service, one reconnect at a time.
///
/// A drain makes a single sequential pass. Each entry is claimed just before
/// its call, so an entry replaced in the meantime is skipped, and settled
/// (and persisted) before the next call goes out. If the user changed their
/// mind while a call was on the wire, the newer intent is sent at the end of
/// the same pass. Failed entries stay queued until the next reconnect; there
/// is no retry timer.
pub struct SyncCoordinator<T> {
    queue: Arc<MutationQueue>,
    remote: Arc<dyn RemoteService<Item = T>>,
    syncing: AtomicBool,
}

impl<T: Send + 'static> SyncCoordinator<T> {
    pub fn new(queue: Arc<MutationQueue>, remote: Arc<dyn RemoteService<Item = T>>) -> Self {
        Self {
            queue,
            remote,
            syncing: AtomicBool::new(false),
        }
    }

    pub fn remote(&self) -> &Arc<dyn RemoteService<Item = T>> {
        &self.remote
    }

    pub fn queue(&self) -> &Arc<MutationQueue> {
        &self.queue
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Drain if `event` is a reconnect and there is something to send.
    pub async fn run_if_due(&self, event: &ConnectivityEvent) -> SyncOutcome {
        if !event.is_reconnect() {
            return SyncOutcome::Skipped(SkipReason::NotReconnect);
        }
        if event.state.is_offline() {
            return SyncOutcome::Skipped(SkipReason::Offline);
        }
        self.drain().await
    }

    /// One pass over the pending entries, regardless of connectivity.
    #[instrument(skip(self))]
    pub async fn drain(&self) -> SyncOutcome {
        if !self.queue.has_pending_changes() {
            return SyncOutcome::Skipped(SkipReason::NothingPending);
        }
        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("drain already in progress, skipping");
            return SyncOutcome::Skipped(SkipReason::AlreadySyncing);
        }
        let _guard = SyncingGuard(&self.syncing);

        let mut work: VecDeque<_> = self.queue.pending().into();
        info!(count = work.len(), "draining pending mutations");

        let mut report = DrainReport::default();
        while let Some(m) = work.pop_front() {
            if !self.queue.begin_sync(&m.entity_id, m.intent) {
                debug!(entity_id = %m.entity_id, intent = %m.intent, "mutation superseded, skipping");
                continue;
            }
            let result = match m.intent {
                Intent::Add => self.remote.save(&m.entity_id).await,
                Intent::Remove => self.remote.remove(&m.entity_id).await,
            };

            match result {
                Ok(()) => {
                    report.synced += 1;
                    match self.queue.settle(&m.entity_id, m.intent).await {
                        Ok(true) => debug!(entity_id = %m.entity_id, intent = %m.intent, "mutation synced"),
                        Ok(false) => {
                            if let Some(next) = self.queue.pending_for(&m.entity_id) {
                                debug!(
                                    entity_id = %m.entity_id,
                                    sent = %m.intent,
                                    next = %next.intent,
                                    "intent changed during send, sending newer one"
                                );
                                work.push_back(next);
                            }
                        }
                        Err(e) => warn!(
                            entity_id = %m.entity_id,
                            error = %e,
                            "synced mutation not persisted, will be resent"
                        ),
                    }
                }
                Err(e) => {
                    self.queue.release(&m.entity_id);
                    report.failed += 1;
                    warn!(entity_id = %m.entity_id, intent = %m.intent, error = %e, "sync failed, keeping for next reconnect");
                }
            }
        }

        report.remaining = self.queue.pending_len();
        info!(
            synced = report.synced,
            failed = report.failed,
            remaining = report.remaining,
            "drain finished"
        );
        SyncOutcome::Drained(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use crate::remote::ListQuery;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tether_core::ConnectivityState;
    use tether_net::Transition;
    use tether_store::MemoryStore;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct RecordingRemote {
        calls: Mutex<Vec<(String, Intent)>>,
        failing: Mutex<HashSet<String>>,
        /// Zero-based index of the call that waits for `release`.
        hold_at: Option<usize>,
        release: Arc<Notify>,
    }

    impl RecordingRemote {
        fn holding(index: usize) -> Self {
            Self {
                hold_at: Some(index),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<(String, Intent)> {
            self.calls.lock().unwrap().clone()
        }

        async fn wait_for_calls(&self, n: usize) {
            while self.calls.lock().unwrap().len() < n {
                tokio::task::yield_now().await;
            }
        }

        async fn record(&self, id: &str, intent: Intent) -> Result<(), NetworkError> {
            let index = {
                let mut calls = self.calls.lock().unwrap();
                calls.push((id.to_string(), intent));
                calls.len() - 1
            };
            if self.hold_at == Some(index) {
                self.release.notified().await;
            }
            if self.failing.lock().unwrap().contains(id) {
                return Err(NetworkError::Unreachable("down".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteService for RecordingRemote {
        type Item = ();

        async fn fetch_list(&self, _query: &ListQuery) -> Result<Vec<()>, NetworkError> {
            Ok(Vec::new())
        }
        async fn save(&self, id: &str) -> Result<(), NetworkError> {
            self.record(id, Intent::Add).await
        }
        async fn remove(&self, id: &str) -> Result<(), NetworkError> {
            self.record(id, Intent::Remove).await
        }
    }

    fn event(transition: Transition) -> ConnectivityEvent {
        let now = Utc::now();
        let online = ConnectivityState::new(true, Some(true), Some("wifi".into()), now);
        let offline = ConnectivityState::new(false, Some(false), None, now);
        match transition {
            Transition::Reconnected => ConnectivityEvent {
                state: online,
                previous: offline,
                transition,
            },
            _ => ConnectivityEvent {
                state: online.clone(),
                previous: online,
                transition,
            },
        }
    }

    async fn setup(remote: RecordingRemote) -> (Arc<MutationQueue>, Arc<RecordingRemote>, SyncCoordinator<()>) {
        let queue = Arc::new(MutationQueue::new(Arc::new(MemoryStore::new()), "@t:"));
        queue.toggle("b", true, true).await.unwrap();
        queue.toggle("a", true, false).await.unwrap();
        queue.toggle("b", false, false).await.unwrap();
        let remote = Arc::new(remote);
        let coordinator = SyncCoordinator::<()>::new(queue.clone(), remote.clone());
        (queue, remote, coordinator)
    }

    #[tokio::test]
    async fn drains_everything_on_reconnect() {
        let (queue, remote, coordinator) = setup(RecordingRemote::default()).await;

        let outcome = coordinator.run_if_due(&event(Transition::Reconnected)).await;
        assert_eq!(
            outcome,
            SyncOutcome::Drained(DrainReport {
                synced: 2,
                failed: 0,
                remaining: 0
            })
        );
        assert_eq!(
            *remote.calls.lock().unwrap(),
            vec![("a".to_string(), Intent::Add), ("b".to_string(), Intent::Remove)]
        );
        assert!(!queue.has_pending_changes());
        assert!(!coordinator.is_syncing());
    }

    #[tokio::test]
    async fn one_failure_does_not_block_the_rest() {
        let remote = RecordingRemote::default();
        remote.failing.lock().unwrap().insert("b".to_string());
        let (queue, remote, coordinator) = setup(remote).await;

        coordinator.run_if_due(&event(Transition::Reconnected)).await;
        assert_eq!(remote.calls.lock().unwrap().len(), 2);
        let left = queue.pending();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].entity_id, "b");
        assert_eq!(left[0].intent, Intent::Remove);
    }

    #[tokio::test]
    async fn ignores_non_reconnect_events() {
        let (queue, remote, coordinator) = setup(RecordingRemote::default()).await;

        for t in [Transition::StillOnline, Transition::WentOffline, Transition::StillOffline] {
            assert_eq!(
                coordinator.run_if_due(&event(t)).await,
                SyncOutcome::Skipped(SkipReason::NotReconnect)
            );
        }
        assert!(remote.calls.lock().unwrap().is_empty());
        assert_eq!(queue.pending_len(), 2);
    }

    #[tokio::test]
    async fn nothing_pending_is_a_no_op() {
        let queue = Arc::new(MutationQueue::new(Arc::new(MemoryStore::new()), "@t:"));
        let remote = Arc::new(RecordingRemote::default());
        let coordinator = SyncCoordinator::<()>::new(queue, remote.clone());

        assert_eq!(
            coordinator.run_if_due(&event(Transition::Reconnected)).await,
            SyncOutcome::Skipped(SkipReason::NothingPending)
        );
        assert!(remote.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn overlapping_reconnect_is_dropped() {
        let remote = Arc::new(RecordingRemote::holding(0));
        let queue = Arc::new(MutationQueue::new(Arc::new(MemoryStore::new()), "@t:"));
        queue.toggle("a", true, false).await.unwrap();
        let coordinator = Arc::new(SyncCoordinator::<()>::new(queue.clone(), remote.clone()));

        let first = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.run_if_due(&event(Transition::Reconnected)).await })
        };
        remote.wait_for_calls(1).await;

        assert_eq!(
            coordinator.run_if_due(&event(Transition::Reconnected)).await,
            SyncOutcome::Skipped(SkipReason::AlreadySyncing)
        );

        remote.release.notify_one();
        first.await.unwrap();
        assert!(!queue.has_pending_changes());
        assert!(!coordinator.is_syncing());
    }

    #[tokio::test]
    async fn unsave_during_in_flight_save_is_sent_after_it() {
        let remote = Arc::new(RecordingRemote::holding(0));
        let queue = Arc::new(MutationQueue::new(Arc::new(MemoryStore::new()), "@t:"));
        queue.toggle("a", true, false).await.unwrap();
        let coordinator = Arc::new(SyncCoordinator::<()>::new(queue.clone(), remote.clone()));

        let drain = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.drain().await })
        };
        remote.wait_for_calls(1).await;

        // The save is already on the wire, so unsaving must not just cancel it.
        queue.toggle("a", false, false).await.unwrap();
        assert_eq!(queue.pending_for("a").unwrap().intent, Intent::Remove);

        remote.release.notify_one();
        assert_eq!(
            drain.await.unwrap(),
            SyncOutcome::Drained(DrainReport {
                synced: 2,
                failed: 0,
                remaining: 0
            })
        );
        assert_eq!(
            remote.calls(),
            vec![("a".to_string(), Intent::Add), ("a".to_string(), Intent::Remove)]
        );
        assert!(!queue.is_saved("a"));
        assert!(!queue.has_pending_changes());
    }

    #[tokio::test]
    async fn entry_replaced_by_online_toggle_is_not_sent() {
        let (queue, remote, coordinator) = setup(RecordingRemote::holding(0)).await;
        let coordinator = Arc::new(coordinator);

        let drain = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.drain().await })
        };
        remote.wait_for_calls(1).await;

        // "b" is re-saved online while "a" is on the wire; the caller sends
        // that save itself, so the queued Remove must not follow.
        queue.toggle("b", true, true).await.unwrap();
        assert!(queue.pending_for("b").is_none());

        remote.release.notify_one();
        assert_eq!(
            drain.await.unwrap(),
            SyncOutcome::Drained(DrainReport {
                synced: 1,
                failed: 0,
                remaining: 0
            })
        );
        assert_eq!(remote.calls(), vec![("a".to_string(), Intent::Add)]);
        assert!(queue.is_saved("b"));
    }

    #[tokio::test]
    async fn confirmed_entries_are_durable_before_the_next_call() {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MutationQueue::new(store.clone(), "@t:"));
        for id in ["a", "b", "c"] {
            queue.toggle(id, true, false).await.unwrap();
        }
        let remote = Arc::new(RecordingRemote::holding(1));
        let coordinator = Arc::new(SyncCoordinator::<()>::new(queue.clone(), remote.clone()));

        let drain = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.drain().await })
        };
        remote.wait_for_calls(2).await;

        // Reading the store now is what a restart mid-drain would see.
        let restarted = MutationQueue::new(store, "@t:");
        assert_eq!(restarted.load().await, 2);
        assert!(restarted.pending_for("a").is_none());
        assert_eq!(restarted.pending_for("b").unwrap().intent, Intent::Add);
        assert_eq!(restarted.pending_for("c").unwrap().intent, Intent::Add);

        remote.release.notify_one();
        drain.await.unwrap();
        assert!(!queue.has_pending_changes());
    }
}

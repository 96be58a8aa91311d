use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use chrono::Utc;
use dashmap::DashMap;
use tether_core::ConnectivityState;
use tracing::{debug, info, warn};

use crate::probe::ReachabilityProbe;
use crate::types::{ConnectivityEvent, ReachabilityReport, Transition};

type Listener = Arc<dyn Fn(&ConnectivityEvent) + Send + Sync>;

struct MonitorState {
    current: ConnectivityState,
    previous: Option<ConnectivityState>,
    /// Set on entering an offline interval, cleared by the reconnect that ends it.
    was_offline: bool,
}

/// Observes reachability transitions and fans them out to subscribers.
///
/// Shared as `Arc<ConnectivityMonitor>`. Updates are applied synchronously
/// and listeners are invoked on the caller's thread after the internal lock
/// is released, so a listener may subscribe or unsubscribe freely. Listeners
/// must not block; anything slow belongs on a spawned task.
pub struct ConnectivityMonitor {
    state: RwLock<MonitorState>,
    listeners: DashMap<u64, Listener>,
    next_id: AtomicU64,
    probe: Option<Arc<dyn ReachabilityProbe>>,
}

impl ConnectivityMonitor {
    /// Monitor without a one-shot probe; [`Self::snapshot_now`] returns the
    /// last observed state.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(None))
    }

    pub fn with_probe(probe: Arc<dyn ReachabilityProbe>) -> Arc<Self> {
        Arc::new(Self::build(Some(probe)))
    }

    fn build(probe: Option<Arc<dyn ReachabilityProbe>>) -> Self {
        Self {
            state: RwLock::new(MonitorState {
                current: ConnectivityState::assumed_online(Utc::now()),
                previous: None,
                was_offline: false,
            }),
            listeners: DashMap::new(),
            next_id: AtomicU64::new(1),
            probe,
        }
    }

    pub fn current(&self) -> ConnectivityState {
        self.state.read().unwrap().current.clone()
    }

    /// The state replaced by the most recent update, if any update happened.
    pub fn previous(&self) -> Option<ConnectivityState> {
        self.state.read().unwrap().previous.clone()
    }

    pub fn is_offline(&self) -> bool {
        self.state.read().unwrap().current.is_offline()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Register `listener` for every subsequent update.
    ///
    /// The listener stays registered until the returned [`Subscription`] is
    /// unsubscribed or dropped.
    pub fn subscribe<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(&ConnectivityEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, Arc::new(listener));
        debug!(subscription = id, "connectivity listener registered");
        Subscription {
            id,
            monitor: Arc::downgrade(self),
        }
    }

    /// Entry point for the platform's change callback.
    pub fn observe(&self, report: ReachabilityReport) -> ConnectivityEvent {
        self.observe_state(report.into_event_state(Utc::now()))
    }

    /// Apply an already-normalised state and notify subscribers.
    pub fn observe_state(&self, state: ConnectivityState) -> ConnectivityEvent {
        let event = {
            let mut guard = self.state.write().unwrap();
            let offline = state.is_offline();
            let transition = match (offline, guard.was_offline) {
                (true, true) => Transition::StillOffline,
                (true, false) => Transition::WentOffline,
                (false, true) => Transition::Reconnected,
                (false, false) => Transition::StillOnline,
            };
            guard.was_offline = offline;

            let previous = std::mem::replace(&mut guard.current, state.clone());
            guard.previous = Some(previous.clone());
            ConnectivityEvent {
                state,
                previous,
                transition,
            }
        };

        match event.transition {
            Transition::WentOffline => warn!(kind = ?event.state.kind, "network offline"),
            Transition::Reconnected => info!(kind = ?event.state.kind, "network back online"),
            _ => debug!(transition = ?event.transition, "connectivity update"),
        }

        let listeners: Vec<Listener> = self
            .listeners
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for listener in listeners {
            listener(&event);
        }
        event
    }

    /// One-shot query, independent of the subscription path.
    ///
    /// Does not update the monitor or notify anyone. A failing probe is
    /// reported as offline.
    pub async fn snapshot_now(&self) -> ConnectivityState {
        let Some(probe) = &self.probe else {
            return self.current();
        };
        match probe.fetch().await {
            Ok(report) => report.into_query_state(Utc::now()),
            Err(e) => {
                warn!(error = %e, "reachability query failed, assuming offline");
                ConnectivityState::new(false, Some(false), None, Utc::now())
            }
        }
    }

    fn unsubscribe(&self, id: u64) {
        if self.listeners.remove(&id).is_some() {
            debug!(subscription = id, "connectivity listener removed");
        }
    }
}

/// Handle returned by [`ConnectivityMonitor::subscribe`].
///
/// Dropping the handle unsubscribes. It holds only a weak reference, so an
/// outstanding subscription never keeps the monitor alive.
pub struct Subscription {
    id: u64,
    monitor: Weak<ConnectivityMonitor>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.upgrade() {
            monitor.unsubscribe(self.id);
        }
    }
}

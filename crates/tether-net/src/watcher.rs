use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::monitor::ConnectivityMonitor;
use crate::probe::ReachabilityProbe;
use crate::types::ReachabilityReport;

/// Polling floor; a zero period would make `tokio::time::interval` panic.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Polls a [`ReachabilityProbe`] and feeds changes into a
/// [`ConnectivityMonitor`].
///
/// Only changes of the offline/online verdict are forwarded, mirroring a
/// platform callback that fires on change rather than on every poll.
pub struct ReachabilityWatcher {
    monitor: Arc<ConnectivityMonitor>,
    probe: Arc<dyn ReachabilityProbe>,
    interval: Duration,
    last_offline: Option<bool>,
}

impl ReachabilityWatcher {
    pub fn new(
        monitor: Arc<ConnectivityMonitor>,
        probe: Arc<dyn ReachabilityProbe>,
        interval: Duration,
    ) -> Self {
        let interval = if interval.is_zero() {
            warn!(min_ms = MIN_INTERVAL.as_millis() as u64, "zero probe interval, using minimum");
            MIN_INTERVAL
        } else {
            interval
        };
        Self {
            monitor,
            probe,
            interval,
            last_offline: None,
        }
    }

    /// Run until `shutdown` flips to `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "reachability watcher started");

        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => self.poll().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("reachability watcher shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn poll(&mut self) {
        let report = match self.probe.fetch().await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "reachability probe failed");
                ReachabilityReport::offline()
            }
        };

        let offline = report.clone().into_event_state(chrono::Utc::now()).is_offline();
        if self.last_offline == Some(offline) {
            return;
        }
        self.last_offline = Some(offline);
        self.monitor.observe(report);
    }
}

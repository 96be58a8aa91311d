use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tether_core::ConnectivityState;

/// Raw reachability data as delivered by the platform.
///
/// `is_connected` may be missing while the platform is still determining the
/// link state; how that gap is filled depends on where the report came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReachabilityReport {
    pub is_connected: Option<bool>,
    pub is_internet_reachable: Option<bool>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl ReachabilityReport {
    pub fn online(kind: &str) -> Self {
        Self {
            is_connected: Some(true),
            is_internet_reachable: Some(true),
            kind: Some(kind.to_string()),
        }
    }

    pub fn offline() -> Self {
        Self {
            is_connected: Some(false),
            is_internet_reachable: Some(false),
            kind: Some("none".to_string()),
        }
    }

    /// Normalise a pushed change notification: unknown link state is
    /// treated as disconnected.
    pub fn into_event_state(self, at: DateTime<Utc>) -> ConnectivityState {
        ConnectivityState::new(
            self.is_connected.unwrap_or(false),
            self.is_internet_reachable,
            self.kind,
            at,
        )
    }

    /// Normalise a one-shot query result: unknown link state is treated as
    /// connected so start-up does not flash an offline banner.
    pub fn into_query_state(self, at: DateTime<Utc>) -> ConnectivityState {
        ConnectivityState::new(
            self.is_connected.unwrap_or(true),
            self.is_internet_reachable,
            self.kind,
            at,
        )
    }
}

/// How an update relates to the state that preceded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// First online notification after an offline interval.
    Reconnected,
    /// Moved from online (or the initial state) to offline.
    WentOffline,
    /// Online before and after; e.g. wifi → cellular.
    StillOnline,
    /// Offline before and after.
    StillOffline,
}

/// What subscribers receive for every reachability update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityEvent {
    pub state: ConnectivityState,
    pub previous: ConnectivityState,
    pub transition: Transition,
}

impl ConnectivityEvent {
    pub fn is_reconnect(&self) -> bool {
        self.transition == Transition::Reconnected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_link_state_depends_on_source() {
        let now = Utc::now();
        let report = ReachabilityReport {
            is_connected: None,
            is_internet_reachable: None,
            kind: Some("unknown".to_string()),
        };
        assert!(!report.clone().into_event_state(now).is_connected);
        assert!(report.into_query_state(now).is_connected);
    }

    #[test]
    fn report_uses_platform_field_names() {
        let json = r#"{"isConnected":true,"isInternetReachable":null,"type":"wifi"}"#;
        let report: ReachabilityReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.is_connected, Some(true));
        assert_eq!(report.is_internet_reachable, None);
        assert_eq!(report.kind.as_deref(), Some("wifi"));
    }
}

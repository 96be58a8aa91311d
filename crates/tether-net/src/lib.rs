//! `tether-net`: network reachability monitoring.
//!
//! The platform pushes raw [`ReachabilityReport`]s into a
//! [`ConnectivityMonitor`], which normalises them, remembers the previous
//! state, classifies each update as a [`Transition`] and fans the resulting
//! [`ConnectivityEvent`] out to subscribers. Exactly one
//! [`Transition::Reconnected`] is emitted per contiguous offline interval.
//!
//! Hosts without a reachability callback can drive the monitor from a
//! [`ReachabilityWatcher`] polling a [`ReachabilityProbe`] such as
//! [`TcpProbe`].

pub mod error;
pub mod monitor;
pub mod probe;
pub mod types;
pub mod watcher;

pub use error::ProbeError;
pub use monitor::{ConnectivityMonitor, Subscription};
pub use probe::{ReachabilityProbe, TcpProbe};
pub use types::{ConnectivityEvent, ReachabilityReport, Transition};
pub use watcher::ReachabilityWatcher;

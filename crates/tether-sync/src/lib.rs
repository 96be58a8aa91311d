//! `tether-sync`: reconciling queued mutations with the remote service.
//!
//! [`RemoteService`] is the seam to the server; [`HttpRemote`] is the
//! reqwest-backed implementation. [`SyncCoordinator`] drains the
//! [`MutationQueue`](tether_queue::MutationQueue) through it once per
//! reconnect.

pub mod coordinator;
pub mod error;
pub mod http;
pub mod remote;

pub use coordinator::{DrainReport, SkipReason, SyncCoordinator, SyncOutcome};
pub use error::NetworkError;
pub use http::HttpRemote;
pub use remote::{ListQuery, RemoteService};

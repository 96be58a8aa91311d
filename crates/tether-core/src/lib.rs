//! `tether-core`: shared types, constants and configuration for the offline
//! synchronisation layer.
//!
//! Every other `tether-*` crate depends on this one; it depends on none of
//! them.

pub mod config;
pub mod error;
pub mod types;

pub use config::TetherConfig;
pub use error::{Result, TetherError};
pub use types::{ConnectivityState, EntityId, Intent, JobPosting, PendingMutation};

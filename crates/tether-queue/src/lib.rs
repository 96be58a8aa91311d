//! `tether-queue`: the pending-mutation queue.
//!
//! [`MutationQueue`] keeps the optimistic set of saved ids the UI renders
//! and at most one unacknowledged [`Intent`](tether_core::Intent) per entity.
//! Both are persisted together under a single durable key after every
//! change.

pub mod persist;
pub mod queue;

pub use persist::PersistedQueue;
pub use queue::MutationQueue;

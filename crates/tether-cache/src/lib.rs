//! `tether-cache`: offline snapshots of remote list data.
//!
//! [`LocalCache`] holds one bounded, timestamped snapshot of a remote list,
//! replaced wholesale on every successful fetch. [`TtlCache`] is a generic
//! per-key cache with individual lifetimes, used for smaller lookups that
//! do not warrant a snapshot of their own.

pub mod snapshot;
pub mod ttl;

pub use snapshot::{CacheItem, CacheSnapshot, LocalCache};
pub use ttl::{Fetched, TtlCache, TTL_LONG, TTL_MEDIUM, TTL_SHORT, TTL_VERY_LONG};
